use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulsecheck::{
    alert::AlertSink,
    codec::Role,
    config::Config,
    monitor::Monitor,
    scheduler, transport,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let role = config.role()?;

    tracing::info!("🚀 [{}] starting pulsecheck", role.as_str().to_uppercase());
    match role {
        Role::Iot => tracing::info!("🔵 IoT sends on odd minutes."),
        Role::Vm => tracing::info!("🔴 VM sends on even minutes."),
    }

    let alerts = AlertSink::new(config.webhook.clone());
    let (transport, events) = transport::connect(&config, role).await?;
    let mut monitor = Monitor::new(role, config.timeout(), config.grace(), config.error_budget);

    scheduler::align_startup(role).await;
    scheduler::run(&mut monitor, transport, events, &alerts, config.tick()).await?;

    Ok(())
}
