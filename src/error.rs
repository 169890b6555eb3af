//! Error taxonomy for the liveness monitor.

use thiserror::Error;

/// A payload that could not be turned into a [`Heartbeat`](crate::codec::Heartbeat).
///
/// Decode failures are never fatal: the caller drops the payload and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload carries no [from: iot|vm] sender tag")]
    MissingSenderTag,
    #[error("payload carries no parseable timestamp")]
    MissingTimestamp,
}

/// A send or receive call against the underlying channel failed.
///
/// Recovered up to the configured error budget; past it the run is aborted.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mqtt client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("resource returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal outcomes of the liveness protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailureKind {
    #[error("last received message was not sent by the expected peer")]
    SenderMismatch,
    #[error("no heartbeat received within the timeout window")]
    ElapsedTimeout,
    #[error("two consecutive beats from the same side without a reply in between")]
    DuplicateSlotTimeout,
    #[error("too many consecutive transport errors")]
    TooManyTransportErrors,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("liveness check failed: {0}")]
    Liveness(FailureKind),
}
