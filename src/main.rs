use std::sync::Arc;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod coordinator;
mod error;
mod http;
mod lru;
mod registry;
mod safe_cache;
mod storage;
mod templater;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::registry::cached::CachedRegistry;
use crate::registry::direct::DirectRegistry;
use crate::storage::ArtifactStorage;
use crate::templater::HttpTemplater;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::from_env();
    info!("certify starting up, binding {}", config.bind_addr);

    let args: Vec<String> = std::env::args().collect();
    let is_warmup = args.contains(&"--warmup".to_string());

    let direct = DirectRegistry::connect(&config.database_url)
        .await
        .expect("failed to connect to registry database");
    let registry = CachedRegistry::new(direct);

    let storage = ArtifactStorage::new(&config.storage_backend, &config.storage_base_path)
        .expect("failed to initialize artifact storage");
    storage.load().await.expect("failed to load existing artifacts");
    let storage = Arc::new(storage);

    if is_warmup {
        info!("warmup complete: registry reachable, artifact index loaded. Exiting.");
        return;
    }

    let templater = Arc::new(HttpTemplater::new(config.render_service_url.clone()));

    let coordinator = Arc::new(Coordinator::new(registry, storage, templater, config.public_host.clone()));
    let state = http::AppState { coordinator };

    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind listener");
    info!("certify listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await.expect("server error");
}
