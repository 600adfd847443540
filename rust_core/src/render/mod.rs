//! Page renderer abstraction.
//!
//! A renderer turns a URL into a fully rendered HTML body. Two variants ship:
//! - [`ScraperApiRenderer`]: rendering proxy with tunable wait/scroll/proxy tier
//! - [`BrowserlessRenderer`]: real headless browser driven through Browserless
//!
//! The fetch orchestrator only sees the [`Renderer`] trait, so either variant
//! (or a test fake) can sit behind any strategy.

pub mod browserless;
pub mod error;
pub mod scraper_api;

pub use browserless::{BrowserlessConfig, BrowserlessRenderer};
pub use error::{RenderError, Result};
pub use scraper_api::ScraperApiRenderer;

use crate::circuit_breaker::CircuitSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Proxy aggressiveness tier, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyTier {
    Standard,
    Premium,
    Residential,
}

impl ProxyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyTier::Standard => "standard",
            ProxyTier::Premium => "premium",
            ProxyTier::Residential => "residential",
        }
    }
}

/// Scroll actions used to force lazy-loaded listings to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollProfile {
    /// Number of scroll actions; zero disables scrolling
    pub count: u32,
    /// Time allowed for each scroll to settle
    pub step_timeout: Duration,
    /// Extra pause after the scroll sequence
    pub pause: Duration,
}

impl ScrollProfile {
    pub fn none() -> Self {
        Self {
            count: 0,
            step_timeout: Duration::ZERO,
            pause: Duration::ZERO,
        }
    }

    pub fn enabled(&self) -> bool {
        self.count > 0
    }
}

/// Parameters for a single render round-trip.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    /// Time to wait before the content is considered settled
    pub wait: Duration,
    pub scroll: ScrollProfile,
    pub proxy_tier: ProxyTier,
    /// Egress country for the proxy ("fr", "be", ...)
    pub country_code: String,
    /// Randomized per attempt so a blocked upstream session is never reused
    pub session_id: u32,
    /// Transport timeout for the whole round-trip
    pub timeout: Duration,
}

/// Status code plus body returned by a renderer.
#[derive(Debug, Clone)]
pub struct RenderResponse {
    pub status: u16,
    pub body: String,
}

impl RenderResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse>;

    /// Whether the renderer is currently willing to take requests
    /// (quota, circuit breaker). Renderers without such limits are always
    /// available.
    fn is_available(&self) -> bool {
        true
    }

    /// Health gate view for renderers that keep one.
    fn circuit(&self) -> Option<CircuitSnapshot> {
        None
    }

    fn name(&self) -> &str;
}

/// Browser-like headers sent with every proxied request.
pub(crate) const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "fr-FR,fr;q=0.9,en;q=0.8"),
    ("DNT", "1"),
    ("Upgrade-Insecure-Requests", "1"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_tier_ordering() {
        assert!(ProxyTier::Standard < ProxyTier::Premium);
        assert!(ProxyTier::Premium < ProxyTier::Residential);
        assert_eq!(ProxyTier::Residential.as_str(), "residential");
    }

    #[test]
    fn test_scroll_profile_none() {
        assert!(!ScrollProfile::none().enabled());
        let profile = ScrollProfile {
            count: 30,
            step_timeout: Duration::from_millis(2000),
            pause: Duration::from_millis(3000),
        };
        assert!(profile.enabled());
    }
}
