use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gradeflow_core::{
    create_inference_client, load_config, validate_config, Aggregator, Dispatcher,
    GradingWorker, InMemoryTaskQueue, LogFormat, ProblemCatalog, RubricAdvisor,
    SqliteTicketStore, StaticProblemCatalog, SubtaskHandler, TaskQueue, TicketStore,
    TicketUpdateCallback,
};
use gradeflow_server::api::{create_router, WsBroadcaster};
use gradeflow_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let (json, pretty) = match format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("GRADEFLOW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(config.logging.format);
    info!(version = VERSION, "Loaded configuration from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Configuration validated");
    info!("Database path: {:?}", config.database.path);

    // Create SQLite ticket store
    let ticket_store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    info!("Ticket store initialized");

    // Load problem catalog
    let catalog: Arc<dyn ProblemCatalog> = match &config.catalog.path {
        Some(path) => {
            let catalog = StaticProblemCatalog::from_file(path)
                .with_context(|| format!("Failed to load problem catalog from {:?}", path))?;
            info!(problems = catalog.list().len(), "Problem catalog loaded");
            Arc::new(catalog)
        }
        None => {
            warn!("No problem catalog configured; every problem grades against the placeholder");
            Arc::new(StaticProblemCatalog::empty())
        }
    };

    // Create inference client
    let inference = create_inference_client(&config.inference)
        .context("Failed to create inference client")?;
    info!(
        provider = ?config.inference.provider,
        model = %config.inference.model,
        "Inference client initialized"
    );

    // Ticket updates fan out to WebSocket subscribers
    let ws_broadcaster = WsBroadcaster::default();
    let broadcaster_for_callback = ws_broadcaster.clone();
    let update_callback: TicketUpdateCallback = Arc::new(move |ticket_id: &str, event: &str| {
        broadcaster_for_callback.ticket_updated(ticket_id, event);
    });

    let aggregator = Arc::new(
        Aggregator::new(Arc::clone(&ticket_store), Arc::clone(&inference), &config.grading)
            .with_update_callback(Arc::clone(&update_callback)),
    );

    let worker = GradingWorker::new(
        Arc::clone(&ticket_store),
        Arc::clone(&catalog),
        Arc::clone(&inference),
        aggregator,
        config.grading.clone(),
    )
    .with_update_callback(Arc::clone(&update_callback));

    // Start the task queue with the grading worker as its handler
    let queue = Arc::new(InMemoryTaskQueue::new(config.queue.clone()));
    let handler: Arc<dyn SubtaskHandler> = Arc::new(worker);
    queue.start(handler);
    info!(
        max_concurrent_dispatches = config.queue.max_concurrent_dispatches,
        "Task queue started"
    );

    let task_queue: Arc<dyn TaskQueue> = queue.clone();
    let dispatcher = Arc::new(
        Dispatcher::new(Arc::clone(&ticket_store), task_queue, &config.queue)
            .with_update_callback(update_callback),
    );

    let rubric_advisor = Arc::new(RubricAdvisor::new(inference, config.grading.clone()));

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        ticket_store,
        catalog,
        dispatcher,
        Arc::clone(&queue),
        rubric_advisor,
        ws_broadcaster,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    queue.stop().await;
    info!("Task queue stopped");

    Ok(())
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
