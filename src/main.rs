mod acquisition;
mod catalog_manager;
mod catalog_store;
mod classifier;
mod config;
mod image_scraper;
mod model_client;
mod normalizer;
mod plant;
mod protocol;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use acquisition::AcquisitionPipeline;
use catalog_manager::CatalogManager;
use catalog_store::CatalogStore;
use image_scraper::HeadlessImageScraper;
use log::{info, warn};
use model_client::ModelQueryClient;
use server::AppState;

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.parse_default_env();
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_file = config::config_file_path();
    let credentials = std::env::args().nth(1);
    let config = config::sanitize_config(config::apply_overrides(
        config::load_or_create(&config_file)?,
        credentials.as_deref(),
        |key| std::env::var(key).ok(),
    ));
    if config.model.api_key.is_empty() {
        warn!("No model api key configured; find requests will fail upstream");
    }
    info!(
        "Using model {} at {}",
        config.model.model, config.model.endpoint
    );

    let catalog = CatalogManager::spawn(CatalogStore::load(&config.server.data_file))?;
    let pipeline = AcquisitionPipeline::new(
        ModelQueryClient::new(&config.model)?,
        HeadlessImageScraper::new(&config.scraper),
        config.scraper.provider,
        config.server.max_concurrent_acquisitions,
    );
    let app = server::router(AppState {
        catalog: catalog.clone(),
        lookup: Arc::new(pipeline),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    catalog.shutdown();
    Ok(())
}
