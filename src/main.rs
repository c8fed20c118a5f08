use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use voltaic::actuator::TokioClock;
use voltaic::config::Config;
use voltaic::lifecycle::{Lifecycle, shutdown_signal};
use voltaic::mqtt::MqttActuator;
use voltaic::regulator::Regulator;
use voltaic::selector::{HomeAssistantSelector, ModeSelector, StaticSelector};
use voltaic::telemetry::TelemetryStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path),
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    voltaic::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Voltaic {} starting up", env!("APP_VERSION"));

    let telemetry = Arc::new(TelemetryStore::with_topics(
        config.regulation.window_capacity,
        &config.topics,
    ));
    let transport = Arc::new(MqttActuator::start(
        &config.mqtt,
        &config.topics,
        telemetry.clone(),
    ));
    let lifecycle = Lifecycle::new(transport.clone());

    let selector: Arc<dyn ModeSelector> = if config.home_assistant.base_url.is_empty() {
        info!(
            "No Home Assistant configured, using static mode '{}'",
            config.home_assistant.fallback_label
        );
        Arc::new(StaticSelector::new(
            config.home_assistant.fallback_label.clone(),
        ))
    } else {
        match HomeAssistantSelector::new(&config.home_assistant) {
            Ok(selector) => Arc::new(selector),
            Err(e) => {
                lifecycle.release().await;
                return Err(anyhow::anyhow!("Failed to create mode selector: {}", e));
            }
        }
    };

    let mut regulator = Regulator::new(
        &config,
        selector,
        telemetry,
        transport.clone(),
        Arc::new(TokioClock::new()),
    )
    .with_link_status(transport.connected_flag());

    #[cfg(feature = "web")]
    let web_task = spawn_status_api(&config, &regulator);
    #[cfg(not(feature = "web"))]
    let web_task: Option<tokio::task::JoinHandle<()>> = None;

    // A panic inside the regulator surfaces as a join error; release runs regardless
    let outcome = tokio::spawn(async move { regulator.run(shutdown_signal()).await }).await;

    lifecycle.release().await;
    if let Some(task) = web_task {
        task.abort();
    }

    match outcome {
        Ok(Ok(())) => {
            info!("Regulator shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Regulator failed with error: {}", e);
            Err(anyhow::anyhow!("Regulator error: {}", e))
        }
        Err(e) => {
            error!("Regulator task aborted: {}", e);
            Err(anyhow::anyhow!("Regulator task aborted: {}", e))
        }
    }
}

#[cfg(feature = "web")]
fn spawn_status_api(config: &Config, regulator: &Regulator) -> Option<tokio::task::JoinHandle<()>> {
    if !config.web.enabled {
        return None;
    }
    let status_rx = regulator.subscribe_status();
    let host = config.web.host.clone();
    let port = config.web.port;
    Some(tokio::spawn(async move {
        if let Err(e) = voltaic::web::serve(status_rx, &host, port).await {
            error!("Web server error: {}", e);
        }
    }))
}
