use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::codec::Role;
use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Peer role, `iot` or `vm`. No usable default: validated via [`Config::role`].
    #[serde(default)]
    pub role: String,

    /// `mqtt` (push/subscribe topic) or `http` (pull/poll resource).
    #[serde(default = "default_transport")]
    pub transport: String,

    #[serde(default = "default_broker")]
    pub broker: String,

    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    #[serde(default = "default_topic")]
    pub topic: String,

    /// Base URL of the shared pull resource (served by the VM peer).
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_resource")]
    pub resource: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Consecutive transport errors tolerated before giving up.
    #[serde(default = "default_error_budget")]
    pub error_budget: u32,

    /// Discord webhook for terminal alerts. Absent means log-only.
    #[serde(default)]
    pub webhook: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// CA certificate enabling TLS towards the MQTT broker.
    #[serde(default)]
    pub cert_path: Option<String>,
}

fn default_transport() -> String {
    "mqtt".to_string()
}

fn default_broker() -> String {
    "127.0.0.1".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "iot/healthcheck".to_string()
}

fn default_server_url() -> String {
    "http://127.0.0.1:8683".to_string()
}

fn default_resource() -> String {
    "healthcheck".to_string()
}

fn default_listen_port() -> u16 {
    8683
}

fn default_timeout_secs() -> u64 {
    90
}

fn default_grace_secs() -> u64 {
    30
}

fn default_tick_secs() -> u64 {
    1
}

fn default_error_budget() -> u32 {
    10
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let settings: Config = config
            .try_deserialize()
            .unwrap_or_else(|_| Config::default());

        Ok(settings)
    }

    pub fn role(&self) -> Result<Role, Error> {
        Role::parse(&self.role)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn resource_url(&self) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), self.resource)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: String::new(),
            transport: default_transport(),
            broker: default_broker(),
            broker_port: default_broker_port(),
            topic: default_topic(),
            server_url: default_server_url(),
            resource: default_resource(),
            listen_port: default_listen_port(),
            timeout_secs: default_timeout_secs(),
            grace_secs: default_grace_secs(),
            tick_secs: default_tick_secs(),
            error_budget: default_error_budget(),
            webhook: None,
            username: None,
            password: None,
            cert_path: None,
        }
    }
}
