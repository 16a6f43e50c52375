use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use payment_cell::services::SyncScheduler;
use shared_config::AppConfig;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting payment reconciliation API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let state = Arc::new(config);

    // Durable server-side sync scheduling; survives without any admin session
    let scheduler = if state.scheduler_enabled() {
        match SyncScheduler::new(&state) {
            Ok(scheduler) => {
                let scheduler = Arc::new(scheduler);
                let runner = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    runner.run().await;
                });
                Some(scheduler)
            }
            Err(e) => {
                error!("Sync scheduler not started: {}", e);
                None
            }
        }
    } else {
        info!("Sync scheduler disabled by configuration");
        None
    };

    // Build the application router
    let app = router::create_router(state.clone())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], state.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!("Shutdown signal received");
            if let Some(scheduler) = scheduler {
                scheduler.shutdown().await;
            }
        })
        .await
        .unwrap();
}
