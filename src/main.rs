mod adapters;
mod application;
mod config;
mod domain;
mod interface;
mod ports;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adapters::{ClabRegistry, GatewayConfig, GatewaySource, MqttBus, TopologyFile};
use application::{AcquisitionEngine, CollectionMode, SinkDispatcher, TickSettings, TimeMachine};
use config::Config;
use interface::http::{create_router, AppState};
use ports::{BusPublisher, DeviceRegistry, TelemetrySource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gnmon={},tower_http=info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting gnmon v{}", env!("CARGO_PKG_VERSION"));
    info!(
        mode = ?config.mode,
        topology = %config.topology_file.display(),
        history_size = config.history_size,
        "Configuration loaded"
    );

    // Resolve the device fleet from the lab
    let topology = TopologyFile::load(&config.topology_file)?;
    let registry = Arc::new(ClabRegistry::new(topology.clone()));
    let graph = Arc::new(topology.graph());

    let devices = Arc::new(registry.devices().await?);
    if devices.is_empty() {
        warn!("⚠ No router containers found; cycles will be empty");
    }
    for device in devices.iter() {
        info!(
            hostname = %device.hostname,
            address = %device.address,
            interfaces = device.interfaces.len(),
            "✓ Registered device"
        );
    }

    // Telemetry source
    let source: Arc<dyn TelemetrySource> = Arc::new(GatewaySource::new(GatewayConfig {
        base_url: config.gateway_url.clone(),
        username: config.username.clone(),
        password: config.password.clone(),
        device_port: config.device_port,
    }));
    info!("✓ Telemetry gateway at {}", config.gateway_url);

    // Durable bus, when enabled or implied by the collection mode
    let bus: Option<Arc<dyn BusPublisher>> =
        if config.bus_enabled || config.mode == CollectionMode::SubscribeOnChange {
            let bus = Arc::new(MqttBus::connect(&config.bus_broker)?);
            bus.ensure_channel(&config.bus_channel).await?;
            info!(
                "✓ Bus publisher ready ({} on {})",
                config.bus_channel, config.bus_broker
            );
            Some(bus as Arc<dyn BusPublisher>)
        } else {
            None
        };

    // Wire the acquisition engine, sink and tick loop
    let engine = AcquisitionEngine::new(
        Arc::clone(&devices),
        source,
        config.parallel_limit,
        config.resubscribe_delay,
    );

    let (events, _) = broadcast::channel(64);
    let sink = SinkDispatcher::new(events.clone(), bus, config.bus_channel.clone(), &devices);

    let settings = TickSettings {
        mode: config.mode,
        history_size: config.history_size,
        live_interval: config.live_interval,
        replay_interval: config.replay_interval,
        error_pause: config.error_pause,
    };
    let timemachine = Arc::new(TimeMachine::new(engine, sink, settings));
    info!("✓ Time machine initialized ({} cycle buffer)", config.history_size);

    // Create HTTP server
    let app = create_router(AppState {
        timemachine: Arc::clone(&timemachine),
        registry,
        topology: graph,
        events,
    });
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("✓ gnmon listening on {}", addr);
    info!("  → Event stream: ws://localhost:{}/ws", config.port);
    info!("  → Topology: http://localhost:{}/topology", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(timemachine))
        .await?;

    Ok(())
}

/// Completes on Ctrl-C, stopping the tick and subscription workers first
async fn shutdown_signal(machine: Arc<TimeMachine>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping workers");
            machine.shutdown();
        }
        Err(e) => {
            warn!(error = %e, "Shutdown signal unavailable");
            std::future::pending::<()>().await;
        }
    }
}
