//! Pulsecheck
//!
//! Bidirectional liveness monitor between two named peers, "iot" and "vm",
//! exchanging timestamped heartbeats over a shared MQTT topic or HTTP
//! resource. IoT speaks on odd wall-clock minutes, VM on even ones; a peer
//! that stops answering within the timeout window triggers an alert and a
//! terminal stop.

pub mod alert;
pub mod codec;
pub mod config;
pub mod error;
pub mod monitor;
pub mod scheduler;
pub mod transport;
