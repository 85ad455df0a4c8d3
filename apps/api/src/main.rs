use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::AppState;
use notification_cell::{HttpMailer, LogMailer, Mailer};
use shared_config::AppConfig;
use shared_database::Database;

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

    info!("Starting Yourcare appointments API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    let db = match Database::connect(&config).await {
        Ok(db) => db,
        Err(err) => {
            warn!("Failed to connect to the database: {}", err);
            std::process::exit(1);
        }
    };

    let mailer: Arc<dyn Mailer> = match HttpMailer::new(&config) {
        Ok(mailer) => Arc::new(mailer),
        Err(_) => {
            warn!("Mail relay not configured, notifications will be logged and dropped");
            Arc::new(LogMailer)
        }
    };

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let state = AppState::new(config.clone(), db, mailer);

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .await
        .unwrap();
}
