//! The liveness state machine.
//!
//! A monitor holds everything one peer knows about the exchange: what it last
//! sent, what it last received and when, and a short history of which side
//! spoke recently. [`Monitor::on_tick`] decides whether to speak this tick and
//! whether the counterpart is still alive; [`Monitor::on_receive`] folds an
//! inbound payload into the state. The two entry points are only ever called
//! from the scheduler task, so no partial state update is observable.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};

use crate::codec::{self, Heartbeat, Role};
use crate::error::{DecodeError, FailureKind};

/// Bound on the sender history used for duplicate-slot detection.
const HISTORY_CAP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// VM before the first inbound beat: never sends, never times out.
    WaitingForFirstContact,
    Armed,
    Failed(FailureKind),
}

/// What a single tick decided.
#[derive(Debug, Default)]
pub struct Tick {
    /// Wire payload to publish this tick, if this peer owns the minute.
    pub send: Option<String>,
    /// Terminal failure entered on this tick. Set at most once over the life
    /// of a monitor; later ticks on a failed monitor return an empty `Tick`.
    pub failure: Option<FailureKind>,
}

/// Outcome of feeding one inbound payload to the monitor.
#[derive(Debug)]
pub enum Received {
    Accepted(Heartbeat),
    /// Our own publication observed on the shared channel; dropped.
    SelfEcho,
    /// Malformed payload; dropped without touching state.
    Undecodable(DecodeError),
    /// Monitor already failed; inbound traffic is ignored.
    Ignored,
}

pub struct Monitor {
    role: Role,
    timeout: Duration,
    grace: Duration,
    error_budget: u32,
    phase: Phase,
    last_sent_minute: Option<u32>,
    last_received_at: Option<Instant>,
    last_received: Option<Heartbeat>,
    recent_senders: VecDeque<Role>,
    consecutive_errors: u32,
}

impl Monitor {
    pub fn new(role: Role, timeout: Duration, grace: Duration, error_budget: u32) -> Monitor {
        let phase = match role {
            Role::Iot => Phase::Armed,
            Role::Vm => Phase::WaitingForFirstContact,
        };
        Monitor {
            role,
            timeout,
            grace,
            error_budget,
            phase,
            last_sent_minute: None,
            last_received_at: None,
            last_received: None,
            recent_senders: VecDeque::with_capacity(HISTORY_CAP),
            consecutive_errors: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self.phase {
            Phase::Failed(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn last_sent_minute(&self) -> Option<u32> {
        self.last_sent_minute
    }

    pub fn last_received(&self) -> Option<&Heartbeat> {
        self.last_received.as_ref()
    }

    /// Evaluate one scheduler tick. `now` is the wall clock driving the
    /// minute-parity slots, `at` the monotonic instant backing the timeout.
    pub fn on_tick(&mut self, now: DateTime<Utc>, at: Instant) -> Tick {
        if matches!(self.phase, Phase::Failed(_)) {
            return Tick::default();
        }

        let mut tick = Tick::default();
        let minute = now.minute();

        // One beat per wall-clock minute, and nothing before first contact.
        let already_sent = self.last_sent_minute == Some(minute);
        if !already_sent
            && self.phase == Phase::Armed
            && self.role.sends_on(minute)
            && self.grace_elapsed(at)
        {
            let beat = match self.last_received {
                None => Heartbeat::plain(self.role, now),
                Some(_) => Heartbeat::acknowledging(self.role, now),
            };
            tick.send = Some(codec::encode(&beat));
            self.last_sent_minute = Some(minute);
            self.push_history(self.role);
        }

        let failure = self
            .check_sender_mismatch()
            .or_else(|| self.check_elapsed_timeout(at))
            .or_else(|| self.check_duplicate_slot());
        if let Some(kind) = failure {
            self.phase = Phase::Failed(kind);
            tick.failure = Some(kind);
        }
        tick
    }

    /// Fold one inbound payload into the state. `at` is the arrival instant
    /// captured by the transport; payloads are applied in arrival order.
    pub fn on_receive(&mut self, raw: &str, at: Instant) -> Received {
        if matches!(self.phase, Phase::Failed(_)) {
            return Received::Ignored;
        }
        let beat = match codec::decode(raw) {
            Ok(beat) => beat,
            Err(e) => return Received::Undecodable(e),
        };
        if beat.sender == self.role {
            return Received::SelfEcho;
        }

        self.last_received_at = Some(at);
        self.last_received = Some(beat.clone());
        self.push_history(beat.sender);
        if self.phase == Phase::WaitingForFirstContact {
            self.phase = Phase::Armed;
        }
        Received::Accepted(beat)
    }

    /// Count one transport failure against the budget. Past the cap the
    /// monitor turns terminal.
    pub fn record_transport_error(&mut self) -> Option<FailureKind> {
        self.consecutive_errors += 1;
        if self.consecutive_errors > self.error_budget && !matches!(self.phase, Phase::Failed(_)) {
            self.phase = Phase::Failed(FailureKind::TooManyTransportErrors);
            return Some(FailureKind::TooManyTransportErrors);
        }
        None
    }

    pub fn reset_transport_errors(&mut self) {
        self.consecutive_errors = 0;
    }

    fn grace_elapsed(&self, at: Instant) -> bool {
        match self.last_received_at {
            None => true,
            Some(received) => at.duration_since(received) >= self.grace,
        }
    }

    fn check_sender_mismatch(&self) -> Option<FailureKind> {
        let last = self.last_received.as_ref()?;
        (last.sender != self.role.counterpart()).then_some(FailureKind::SenderMismatch)
    }

    fn check_elapsed_timeout(&self, at: Instant) -> Option<FailureKind> {
        // Never fires before the first message: a silent channel at startup
        // is WaitingForFirstContact, not a dead peer.
        let received = self.last_received_at?;
        (at.duration_since(received) > self.timeout).then_some(FailureKind::ElapsedTimeout)
    }

    fn check_duplicate_slot(&self) -> Option<FailureKind> {
        if self.recent_senders.len() <= 2 {
            return None;
        }
        let mut tail = self.recent_senders.iter().rev();
        match (tail.next(), tail.next()) {
            (Some(a), Some(b)) if a == b => Some(FailureKind::DuplicateSlotTimeout),
            _ => None,
        }
    }

    fn push_history(&mut self, role: Role) {
        if self.recent_senders.len() == HISTORY_CAP {
            self.recent_senders.pop_front();
        }
        self.recent_senders.push_back(role);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn monitor(role: Role) -> Monitor {
        Monitor::new(role, Duration::from_secs(90), Duration::from_secs(30), 10)
    }

    fn at_minute(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 8, minute, 0).unwrap()
    }

    #[test]
    fn sender_mismatch_wins_over_other_checks() {
        let mut m = monitor(Role::Vm);
        let t0 = Instant::now();
        // Force the impossible-through-the-api shape: a stored message from
        // the wrong side, alongside a stale receive time.
        m.phase = Phase::Armed;
        m.last_received = Some(Heartbeat::plain(Role::Vm, at_minute(13)));
        m.last_received_at = Some(t0);

        let tick = m.on_tick(at_minute(15), t0 + Duration::from_secs(120));
        assert_eq!(tick.failure, Some(FailureKind::SenderMismatch));
    }

    #[test]
    fn history_is_bounded_oldest_first() {
        let mut m = monitor(Role::Iot);
        for _ in 0..8 {
            m.push_history(Role::Iot);
        }
        assert_eq!(m.recent_senders.len(), HISTORY_CAP);
    }

    #[test]
    fn error_budget_cap_is_terminal() {
        let mut m = monitor(Role::Iot);
        for _ in 0..10 {
            assert_eq!(m.record_transport_error(), None);
        }
        assert_eq!(
            m.record_transport_error(),
            Some(FailureKind::TooManyTransportErrors)
        );
        assert_eq!(m.failure(), Some(FailureKind::TooManyTransportErrors));
        // Terminal: no beat leaves a failed monitor.
        let tick = m.on_tick(at_minute(13), Instant::now());
        assert!(tick.send.is_none());
        assert!(tick.failure.is_none());
    }

    #[test]
    fn success_resets_the_error_budget() {
        let mut m = monitor(Role::Iot);
        for _ in 0..9 {
            m.record_transport_error();
        }
        m.reset_transport_errors();
        for _ in 0..10 {
            assert_eq!(m.record_transport_error(), None);
        }
    }
}
