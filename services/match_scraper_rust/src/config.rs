use anyhow::{anyhow, Result};
use courtline_rust_core::circuit_breaker::CircuitBreakerConfig;
use courtline_rust_core::config::{env_opt, env_parse, PipelineConfig};
use courtline_rust_core::render::scraper_api::DEFAULT_SCRAPERAPI_ENDPOINT;
use std::time::Duration;

/// Where snapshots and reference profiles live.
#[derive(Clone, Debug)]
pub enum StoreBackend {
    Postgrest { url: String, api_key: String },
    Postgres { database_url: String },
}

#[derive(Clone, Debug)]
pub struct BrowserConfig {
    pub url: String,
    pub token: Option<String>,
    pub breaker: CircuitBreakerConfig,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub scraperapi_key: String,
    pub scraperapi_endpoint: String,
    /// Headless browser fallback, disabled when BROWSERLESS_URL is unset
    pub browser: Option<BrowserConfig>,
    pub store: StoreBackend,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let scraperapi_key = env_opt("SCRAPERAPI_KEY").ok_or_else(|| anyhow!("SCRAPERAPI_KEY must be set"))?;

        let browser = match env_opt("BROWSERLESS_URL") {
            Some(url) => {
                let defaults = CircuitBreakerConfig::default();
                Some(BrowserConfig {
                    url,
                    token: env_opt("BROWSERLESS_TOKEN"),
                    breaker: CircuitBreakerConfig {
                        failure_threshold: env_parse("BROWSER_CB_FAILURE_THRESHOLD", defaults.failure_threshold)?,
                        recovery_timeout: Duration::from_secs(env_parse(
                            "BROWSER_CB_RECOVERY_TIMEOUT_SECS",
                            defaults.recovery_timeout.as_secs(),
                        )?),
                        success_threshold: defaults.success_threshold,
                    },
                })
            }
            None => None,
        };

        // PostgREST wins when both are configured
        let store = match (env_opt("SUPABASE_URL"), env_opt("SUPABASE_KEY"), env_opt("DATABASE_URL")) {
            (Some(url), Some(api_key), _) => StoreBackend::Postgrest { url, api_key },
            (_, _, Some(database_url)) => StoreBackend::Postgres { database_url },
            _ => return Err(anyhow!("Either SUPABASE_URL and SUPABASE_KEY or DATABASE_URL must be set")),
        };

        Ok(Self {
            scraperapi_key,
            scraperapi_endpoint: env_opt("SCRAPERAPI_ENDPOINT").unwrap_or_else(|| DEFAULT_SCRAPERAPI_ENDPOINT.to_string()),
            browser,
            store,
            pipeline: PipelineConfig::from_env()?,
        })
    }
}
