//! Drives the monitor: one task, one `select!` loop, two arms.
//!
//! The tick arm evaluates [`Monitor::on_tick`] at a fixed period; the event
//! arm folds inbound transport traffic into the same monitor. Because the
//! loop owns the monitor, tick and receive handling can never interleave
//! mid-update.

use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::mpsc;

use crate::alert::AlertSink;
use crate::codec::Role;
use crate::error::{Error, FailureKind};
use crate::monitor::{Monitor, Received};
use crate::transport::{Transport, TransportEvent};

/// Run until the monitor turns terminal. Always returns an error describing
/// the failure; a healthy exchange never ends on its own.
pub async fn run(
    monitor: &mut Monitor,
    transport: Transport,
    mut events: mpsc::Receiver<TransportEvent>,
    alerts: &AlertSink,
    tick: Duration,
) -> Result<(), Error> {
    let mut ticker = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = monitor.on_tick(Utc::now(), Instant::now());
                if let Some(payload) = outcome.send {
                    match transport.send(&payload).await {
                        Ok(()) => {
                            monitor.reset_transport_errors();
                            tracing::info!("📤 sent: {payload}");
                        }
                        Err(e) => {
                            tracing::warn!("⚠️ send failed: {e}");
                            if let Some(kind) = monitor.record_transport_error() {
                                return fail(monitor.role(), kind, alerts).await;
                            }
                        }
                    }
                }
                if let Some(kind) = outcome.failure {
                    return fail(monitor.role(), kind, alerts).await;
                }
            }
            event = events.recv() => match event {
                Some(TransportEvent::Inbound { payload, received_at }) => {
                    monitor.reset_transport_errors();
                    match monitor.on_receive(&payload, received_at) {
                        Received::Accepted(_) => tracing::info!("📩 received: {payload}"),
                        Received::SelfEcho => tracing::debug!("self-echo ignored: {payload}"),
                        Received::Undecodable(e) => {
                            tracing::warn!("⚠️ dropped undecodable payload ({e}): {payload}");
                        }
                        Received::Ignored => {}
                    }
                }
                Some(TransportEvent::Error(message)) => {
                    tracing::warn!("⚠️ transport receive error: {message}");
                    if let Some(kind) = monitor.record_transport_error() {
                        return fail(monitor.role(), kind, alerts).await;
                    }
                }
                // Receive task gone; nothing can arrive any more.
                None => return fail(monitor.role(), FailureKind::TooManyTransportErrors, alerts).await,
            }
        }
    }
}

async fn fail(role: Role, kind: FailureKind, alerts: &AlertSink) -> Result<(), Error> {
    let now = Utc::now();
    tracing::error!("🚨 [{}] {kind}; stopping", role.as_str().to_uppercase());
    let message = format!(
        "🚨 **[{}] Liveness check failed!**\n📅 {} UTC\n❌ {kind}",
        role.as_str().to_uppercase(),
        now.format("%d/%m/%Y %H:%M:%S"),
    );
    alerts.notify(&message).await;
    Err(Error::Liveness(kind))
}

/// Hold the IoT peer back until the start of the next odd minute, so both
/// peers agree on who opens the exchange. Mid-odd-minute starts skip to the
/// following odd minute rather than risk a double send in the current one.
pub async fn align_startup(role: Role) {
    if role != Role::Iot {
        return;
    }
    let delay = startup_delay(Utc::now());
    if delay.is_zero() {
        return;
    }
    tracing::info!(
        "⏳ [IOT] waiting {}s for the next odd minute",
        delay.as_secs()
    );
    // Sleep in bounded chunks so the wait is observable and never unbounded.
    let mut remaining = delay;
    while !remaining.is_zero() {
        let chunk = remaining.min(Duration::from_secs(60));
        tokio::time::sleep(chunk).await;
        remaining -= chunk;
    }
}

/// Time until the start of the next odd minute. At most 120 s (when an odd
/// minute has only just begun).
fn startup_delay(now: DateTime<Utc>) -> Duration {
    let to_next_minute = 60 - u64::from(now.second());
    if now.minute() % 2 == 1 {
        Duration::from_secs(to_next_minute + 60)
    } else {
        Duration::from_secs(to_next_minute)
    }
}
