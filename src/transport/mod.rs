//! Transport adapter: one send contract, one inbound event channel, two
//! interchangeable backends.
//!
//! The push backend subscribes to an MQTT topic; the pull backend polls a
//! shared HTTP resource. Either way the receive side runs as its own task and
//! forwards [`TransportEvent`]s over an mpsc channel, so the scheduler sees a
//! single ordered stream regardless of backend.

pub mod http;
pub mod mqtt;

use std::time::Instant;

use tokio::sync::mpsc;

use crate::codec::Role;
use crate::config::Config;
use crate::error::{Error, TransportError};

/// What the receive task reports back to the scheduler.
#[derive(Debug)]
pub enum TransportEvent {
    /// A payload observed on the shared channel, stamped on arrival.
    Inbound { payload: String, received_at: Instant },
    /// A receive-side failure; counts against the error budget.
    Error(String),
}

pub enum Transport {
    Mqtt(mqtt::MqttTransport),
    Http(http::HttpTransport),
}

impl Transport {
    pub async fn send(&self, payload: &str) -> Result<(), TransportError> {
        match self {
            Transport::Mqtt(t) => t.send(payload).await,
            Transport::Http(t) => t.send(payload).await,
        }
    }
}

/// Build the backend named by the configuration and start its receive task.
pub async fn connect(
    cfg: &Config,
    role: Role,
) -> Result<(Transport, mpsc::Receiver<TransportEvent>), Error> {
    match cfg.transport.trim().to_lowercase().as_str() {
        "mqtt" => {
            let (transport, events) = mqtt::connect(cfg, role).await?;
            Ok((Transport::Mqtt(transport), events))
        }
        "http" => {
            let (transport, events) = http::connect(cfg, role).await?;
            Ok((Transport::Http(transport), events))
        }
        other => Err(Error::InvalidConfiguration(format!(
            "unknown transport {other:?}, use 'mqtt' or 'http'"
        ))),
    }
}
