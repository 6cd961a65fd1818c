use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use antrian_core::{
    create_announcer, create_notification_system, load_config, validate_config, AutoCaller,
    ChannelStore, HttpPatientDirectory, LogFormat, PatientDirectory, QueueEngine,
    SqliteChannelStore, SqliteTicketStore, TicketStore,
};

use antrian_server::api::create_router;
use antrian_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("ANTRIAN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration before logging so the format can be honoured
    let config = match load_config(&config_path) {
        Ok(config) => {
            init_logging(config.logging.format);
            config
        }
        Err(e) => {
            init_logging(LogFormat::default());
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to load config from {:?}", config_path)));
        }
    };

    info!("Antrian v{} starting", VERSION);
    info!("Loaded configuration from {:?}", config_path);

    validate_config(&config).context("Configuration validation failed")?;
    info!("Database path: {:?}", config.database.path);

    // Stores
    let ticket_store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    let channel_store: Arc<dyn ChannelStore> = Arc::new(
        SqliteChannelStore::new(&config.database.path)
            .context("Failed to create channel store")?,
    );
    info!("Stores initialized");

    // Notification system
    let announcer =
        create_announcer(&config.notifier).context("Failed to create announcer")?;
    info!("Using announcer: {}", announcer.name());

    let directory: Option<Arc<dyn PatientDirectory>> =
        match HttpPatientDirectory::from_config(&config.patients)
            .context("Failed to create patient directory client")?
        {
            Some(client) => {
                info!("Patient directory lookups enabled");
                Some(Arc::new(client))
            }
            None => {
                info!("No patient directory configured, announcements carry no names");
                None
            }
        };

    let (notifier, dispatch_worker) = create_notification_system(
        announcer,
        directory,
        config.notifier.buffer_size,
        Duration::from_millis(config.notifier.announce_timeout_ms),
    );
    let dispatch_handle = tokio::spawn(dispatch_worker.run());

    // Engine
    let engine = Arc::new(QueueEngine::new(
        config.engine.clone(),
        ticket_store,
        channel_store,
        Some(notifier),
    ));

    let seeded = engine
        .seed_channels(&config.channels)
        .await
        .context("Failed to seed channels")?;
    if seeded > 0 {
        info!("Registered {} channel(s) from config", seeded);
    }

    // Auto-caller
    let auto_caller = if config.auto_call.enabled {
        let caller = Arc::new(AutoCaller::new(Arc::clone(&engine)));
        caller.start().await;
        info!("Auto-caller started");
        Some(caller)
    } else {
        info!("Auto-call disabled in config");
        None
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&engine),
        auto_caller.clone(),
    ));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Some(ref caller) = auto_caller {
        caller.stop().await;
        info!("Auto-caller stopped");
    }

    // The engine owns the last notification handle; dropping it lets the
    // worker drain pending announcements and exit.
    drop(auto_caller);
    drop(engine);
    if tokio::time::timeout(Duration::from_secs(5), dispatch_handle)
        .await
        .is_err()
    {
        warn!("Notification worker did not finish in time");
    }

    Ok(())
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
