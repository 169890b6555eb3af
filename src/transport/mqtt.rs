//! Push backend: a shared MQTT topic, at-most-once delivery.

use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, TlsConfiguration};
use tokio::sync::mpsc;

use super::TransportEvent;
use crate::codec::Role;
use crate::config::Config;
use crate::error::{Error, TransportError};

const CHANNEL_CAPACITY: usize = 64;

pub struct MqttTransport {
    client: AsyncClient,
    topic: String,
}

impl MqttTransport {
    pub async fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.client
            .publish(self.topic.clone(), QoS::AtMostOnce, false, payload.to_owned())
            .await?;
        Ok(())
    }
}

pub async fn connect(
    cfg: &Config,
    role: Role,
) -> Result<(MqttTransport, mpsc::Receiver<TransportEvent>), Error> {
    let client_id = format!("pulsecheck-{role}");
    let mut options = MqttOptions::new(client_id, cfg.broker.clone(), cfg.broker_port);
    options.set_keep_alive(Duration::from_secs(60));

    if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
        options.set_credentials(username.clone(), password.clone());
    }
    if let Some(cert_path) = &cfg.cert_path {
        let ca = std::fs::read(cert_path).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot read CA certificate {cert_path}: {e}"))
        })?;
        options.set_transport(rumqttc::Transport::Tls(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));
    }

    let (client, mut eventloop) = AsyncClient::new(options, 16);
    client
        .subscribe(cfg.topic.clone(), QoS::AtMostOnce)
        .await
        .map_err(TransportError::from)?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let topic = cfg.topic.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("✅ connected to MQTT broker");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                    let event = TransportEvent::Inbound {
                        payload,
                        received_at: Instant::now(),
                    };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if tx.send(TransportEvent::Error(e.to_string())).await.is_err() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        tracing::debug!("mqtt event loop for topic {topic} stopped");
    });

    Ok((MqttTransport { client, topic: cfg.topic.clone() }, rx))
}
