use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use terranode_api::config::NodeConfig;
use terranode_api::router::build_app_router;
use terranode_api::state::AppState;
use terranode_cloud::{ObjectStorage, S3Storage};
use terranode_engine::Supervisor;
use terranode_events::NotificationDispatcher;
use terranode_task::{TaskContext, TaskRegistry, TaskStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "terranode_api=debug,terranode_task=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = NodeConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        mode = config.engine_mode.as_str(),
        "Loaded node configuration"
    );

    tokio::fs::create_dir_all(&config.data_root)
        .await
        .expect("Failed to create data root directory");

    // --- Object storage ---
    let storage: Option<Arc<dyn ObjectStorage>> = match &config.s3_bucket {
        Some(bucket) => {
            let s3 = S3Storage::connect(
                bucket.clone(),
                config.s3_region.clone(),
                config.s3_endpoint.clone(),
            )
            .await;
            tracing::info!(bucket, "S3 storage configured");
            Some(Arc::new(s3))
        }
        None => {
            tracing::info!("No storage configured, uploads disabled");
            None
        }
    };

    // --- Task context ---
    let ctx = Arc::new(TaskContext {
        data_root: config.data_root.clone(),
        supervisor: Supervisor::new(config.engine_mode),
        storage,
        storage_bucket: config.s3_bucket.clone().unwrap_or_default(),
        storage_prefix: config.storage_prefix.clone(),
        dispatcher: NotificationDispatcher::new(),
        hooks: config.hooks,
        engine_dir: config.engine_dir.clone(),
        tool_lib_dir: config.tool_lib_dir.clone(),
        http: reqwest::Client::new(),
        store: TaskStore::new(&config.data_root),
    });

    // --- Task registry (crash recovery) ---
    let registry = TaskRegistry::restore(&ctx)
        .await
        .expect("Failed to restore task snapshots");
    let registry = Arc::new(registry);
    let restored = registry.len().await;
    tracing::info!(count = restored, "Task registry ready");

    // --- App state & router ---
    let state = AppState {
        registry,
        ctx,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
