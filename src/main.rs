use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use deadpool_redis::{Config, Runtime};
use tracing::{info, warn};

use modwarden::api::{self, AppState, Metrics};
use modwarden::config::WardenConfig;
use modwarden::hub::BroadcastHub;
use modwarden::shutdown::ShutdownSignal;
use modwarden::store::RedisStore;

#[tokio::main]
async fn main() {
    // 1. Initialize Logging
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    // 2. Setup Configuration (file + env overrides)
    let config = WardenConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        WardenConfig::default()
    });

    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| config.redis.url.clone());
    let api_key = env::var("WARDEN_API_KEY")
        .ok()
        .or_else(|| config.server.api_key.clone())
        .unwrap_or_else(|| {
            warn!("WARDEN_API_KEY not set, defaulting to 'dev-key'. DO NOT USE IN PRODUCTION.");
            "dev-key".to_string()
        });

    // 3. Setup Redis Pool
    let cfg = Config::from_url(redis_url);
    let pool = cfg
        .create_pool(Some(Runtime::Tokio1))
        .expect("Failed to create Redis pool");
    let store = Arc::new(RedisStore::new(pool.clone()));

    // 4. Build Application State
    let state = AppState {
        config_store: store.clone(),
        stats_store: store.clone(),
        transcripts: store,
        hub: BroadcastHub::new(),
        api_key,
        metrics: Arc::new(Metrics::new()),
        redis: Some(pool),
    };

    let app = api::router(state);

    // 5. Start Server
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.server.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Modwarden API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    let shutdown = ShutdownSignal::new();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .expect("Server error");

    info!("Modwarden API stopped");
}
