mod config;

use crate::config::{Config, StoreBackend};
use anyhow::{Context, Result};
use courtline_rust_core::render::{BrowserlessConfig, BrowserlessRenderer, ScraperApiRenderer};
use courtline_rust_core::store::{DbPoolConfig, PostgresStore, PostgrestStore, TableStore};
use courtline_rust_core::{Pipeline, Renderer, RunExit};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn connect_store(backend: &StoreBackend) -> Result<Arc<dyn TableStore>> {
    let store: Arc<dyn TableStore> = match backend {
        StoreBackend::Postgrest { url, api_key } => {
            Arc::new(PostgrestStore::new(url, api_key).context("Failed to initialize PostgREST client")?)
        }
        StoreBackend::Postgres { database_url } => {
            let pool_config = DbPoolConfig::from_env().context("Invalid database pool settings")?;
            Arc::new(
                PostgresStore::connect(database_url, &pool_config)
                    .await
                    .context("Failed to connect to database")?,
            )
        }
    };
    info!("Using {} table store", store.name());
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting match scraper...");

    let config = Config::from_env().context("Failed to load configuration")?;

    // Renderers
    let primary: Arc<dyn Renderer> = Arc::new(ScraperApiRenderer::with_endpoint(
        &config.scraperapi_endpoint,
        &config.scraperapi_key,
    ));
    let fallback: Option<Arc<dyn Renderer>> = config.browser.as_ref().map(|browser| {
        let browser_config = BrowserlessConfig {
            target_markers: config.pipeline.fetch.fallback_target_markers,
            ..BrowserlessConfig::default()
        };
        Arc::new(BrowserlessRenderer::with_circuit_breaker(
            &browser.url,
            browser.token.as_deref(),
            browser_config,
            browser.breaker.clone(),
        )) as Arc<dyn Renderer>
    });
    if fallback.is_none() {
        info!("BROWSERLESS_URL not set, browser fallback disabled");
    }

    // Reference profiles and snapshots share one backend
    let store = connect_store(&config.store).await?;

    let pipeline = Pipeline::new(config.pipeline, primary, fallback, store.clone(), store)
        .context("Failed to build pipeline")?;

    let report = pipeline.run().await;
    match serde_json::to_string(&report) {
        Ok(json) => info!(report = %json, "Run report"),
        Err(e) => warn!("Could not serialize run report: {}", e),
    }

    match &report.exit {
        RunExit::Published => {
            let inserted = report.publish.as_ref().map_or(0, |p| p.inserted_count);
            info!("Snapshot replaced with {} matches", inserted);
        }
        RunExit::PublishFailed(reason) => error!("Publish failed: {}", reason),
        other => warn!("Run ended without publishing: {:?}", other),
    }

    Ok(())
}
