//! Pipeline configuration loaded from the environment.

use crate::extract::ExtractConfig;
use crate::fetch::{AggressivenessProfile, FallbackPolicy, FetchConfig};
use crate::matching::ResolverConfig;
use crate::publish::PublishConfig;
use anyhow::{anyhow, Context, Result};
use chrono::FixedOffset;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TARGET_URL: &str = "https://www.betclic.fr/tennis-stennis";

/// Parse `key` when set; a set but malformed value is an error, not a
/// silent fallback.
pub fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}

/// Non-empty value of `key`, if any.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("Invalid value for {key}: {raw:?}")),
        },
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub target_url: String,
    pub aggressiveness: AggressivenessProfile,
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub resolver: ResolverConfig,
    pub publish: PublishConfig,
    pub reference_table: String,
    pub reference_name_column: String,
    /// Reject repeat participant pairs across dates during reconciliation
    pub pair_guard: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            aggressiveness: AggressivenessProfile::default(),
            fetch: FetchConfig::default(),
            extract: ExtractConfig::default(),
            resolver: ResolverConfig::default(),
            publish: PublishConfig::default(),
            reference_table: "atp_elo_ratings".to_string(),
            reference_name_column: "player".to_string(),
            pair_guard: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_defaults(Self::default())
    }

    /// Create config from environment variables with fallback to provided defaults
    pub fn from_env_with_defaults(defaults: Self) -> Result<Self> {
        let mut fetch = defaults.fetch;
        fetch.min_marker_count = env_parse("MIN_MARKER_COUNT", fetch.min_marker_count)?;
        fetch.passes = env_parse::<u32>("FETCH_PASSES", fetch.passes)?.max(1);
        fetch.pass_pause = env_parse("FETCH_PASS_PAUSE_SECS", fetch.pass_pause.as_secs()).map(Duration::from_secs)?;
        fetch.fallback_policy = env_parse::<FallbackPolicy>("FALLBACK_POLICY", fetch.fallback_policy)?;
        fetch.fallback_target_markers = env_parse("FALLBACK_TARGET_MARKERS", fetch.fallback_target_markers)?;
        if let Some(dir) = env_opt("DEBUG_DUMP_DIR") {
            fetch.debug_dump_dir = Some(PathBuf::from(dir));
        }

        let mut extract = defaults.extract;
        if let Some(base) = env_opt("SITE_BASE_URL") {
            extract.site_base = base.trim_end_matches('/').to_string();
        }
        let offset_minutes: i32 = env_parse("DISPLAY_UTC_OFFSET_MINUTES", extract.display_offset.local_minus_utc() / 60)?;
        extract.display_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| anyhow!("DISPLAY_UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;

        let mut resolver = defaults.resolver;
        resolver.fuzzy_threshold = env_parse("FUZZY_THRESHOLD", resolver.fuzzy_threshold)?;
        if !(0.0..=1.0).contains(&resolver.fuzzy_threshold) {
            return Err(anyhow!("FUZZY_THRESHOLD must be within [0, 1], got {}", resolver.fuzzy_threshold));
        }
        if let Some(base) = env_opt("PROFILE_URL_BASE") {
            resolver.profile_url_base = base;
        }

        let mut publish = defaults.publish;
        publish.filter = env_parse("PUBLISH_FILTER", publish.filter)?;
        publish.chunk_size = env_parse("PUBLISH_CHUNK_SIZE", publish.chunk_size)?;
        if let Some(table) = env_opt("MATCHES_TABLE") {
            publish.table = table;
        }

        Ok(Self {
            target_url: env_opt("TARGET_URL").unwrap_or(defaults.target_url),
            aggressiveness: env_parse("AGGRESSIVENESS", defaults.aggressiveness)?,
            fetch,
            extract,
            resolver,
            publish,
            reference_table: env_opt("REFERENCE_TABLE").unwrap_or(defaults.reference_table),
            reference_name_column: env_opt("REFERENCE_NAME_COLUMN").unwrap_or(defaults.reference_name_column),
            pair_guard: env_bool("DEDUP_PAIR_GUARD", defaults.pair_guard)?,
        })
    }
}
