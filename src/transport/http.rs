//! Pull backend: a single shared HTTP resource, last-write-wins.
//!
//! `GET` returns the last stored payload, `POST` replaces it. The VM peer
//! serves the resource itself (the counterpart posts into it from outside);
//! both peers poll the same URL. A fetched payload identical to the previous
//! fetch is suppressed rather than re-delivered: writes always differ because
//! every beat embeds its minute.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tokio::sync::{mpsc, RwLock};

use super::TransportEvent;
use crate::codec::Role;
use crate::config::Config;
use crate::error::{Error, TransportError};

const CHANNEL_CAPACITY: usize = 64;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type Store = Arc<RwLock<Option<String>>>;

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub async fn send(&self, payload: &str) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(&self.url)
            .body(payload.to_string())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status()));
        }
        Ok(())
    }
}

pub async fn connect(
    cfg: &Config,
    role: Role,
) -> Result<(HttpTransport, mpsc::Receiver<TransportEvent>), Error> {
    // The VM side hosts the shared resource; the counterpart reaches it
    // over the network.
    if role == Role::Vm {
        serve_resource(cfg.listen_port, &cfg.resource).await?;
    }

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(TransportError::from)?;
    let url = cfg.resource_url();

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let poll_client = client.clone();
    let poll_url = url.clone();
    let poll_interval = cfg.tick();
    tokio::spawn(async move {
        let mut last_seen: Option<String> = None;
        loop {
            tokio::time::sleep(poll_interval).await;
            let fetched = fetch_payload(&poll_client, &poll_url).await;
            let event = match fetched {
                Ok(payload) => {
                    if payload.is_empty() || last_seen.as_deref() == Some(payload.as_str()) {
                        continue;
                    }
                    last_seen = Some(payload.clone());
                    TransportEvent::Inbound {
                        payload,
                        received_at: Instant::now(),
                    }
                }
                Err(e) => TransportEvent::Error(e.to_string()),
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    Ok((HttpTransport { client, url }, rx))
}

async fn fetch_payload(client: &reqwest::Client, url: &str) -> Result<String, TransportError> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(TransportError::Status(resp.status()));
    }
    Ok(resp.text().await?)
}

async fn serve_resource(port: u16, resource: &str) -> Result<(), Error> {
    let store: Store = Arc::new(RwLock::new(None));
    let app = Router::new()
        .route(&format!("/{resource}"), get(fetch).post(store_payload))
        .with_state(store);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(TransportError::from)?;
    tracing::info!("🟢 resource server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("❌ resource server error: {e}");
        }
    });
    Ok(())
}

async fn fetch(State(store): State<Store>) -> String {
    store.read().await.clone().unwrap_or_default()
}

async fn store_payload(State(store): State<Store>, body: String) -> &'static str {
    *store.write().await = Some(body);
    "stored"
}
