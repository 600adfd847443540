//! Headless-browser fallback through the Browserless `/function` API.
//!
//! The remote browser navigates, dismisses the consent dialog, scrolls until
//! the listing stops growing and returns the final page source. Calls are
//! gated by a [`CircuitBreaker`]: repeated failures open it, and a quota or
//! credential rejection opens it on the spot.

use super::{RenderError, RenderRequest, RenderResponse, Renderer, Result};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Puppeteer script executed by Browserless. Parameters arrive in `context`.
const SCROLL_UNTIL_STABLE_SCRIPT: &str = r#"
export default async function ({ page, context }) {
  const sleep = (ms) => new Promise((resolve) => setTimeout(resolve, ms));
  await page.goto(context.url, { waitUntil: "networkidle2", timeout: context.navigationTimeoutMs });

  for (const selector of context.consentSelectors) {
    try {
      const button = await page.$(selector);
      if (button) {
        await button.click();
        await sleep(500);
        break;
      }
    } catch (e) {}
  }
  await page.evaluate((selectors) => {
    for (const selector of selectors) {
      document.querySelectorAll(selector).forEach((el) => el.remove());
    }
  }, context.consentSelectors);

  let lastHeight = -1;
  let lastCount = -1;
  let stableRounds = 0;
  for (let attempt = 0; attempt < context.maxScrollAttempts; attempt++) {
    await page.evaluate(() => window.scrollTo(0, document.body.scrollHeight));
    await sleep(context.scrollPauseMs);
    const height = await page.evaluate(() => document.body.scrollHeight);
    const count = await page.evaluate((sel) => document.querySelectorAll(sel).length, context.markerSelector);
    if (context.targetMarkers > 0 && count >= context.targetMarkers) break;
    if (height === lastHeight && count === lastCount) {
      stableRounds += 1;
      if (stableRounds >= context.stableRounds) break;
    } else {
      stableRounds = 0;
    }
    lastHeight = height;
    lastCount = count;
  }

  return { data: await page.content(), type: "text/html" };
}
"#;

/// Browser-side behavior of the fallback renderer.
#[derive(Debug, Clone)]
pub struct BrowserlessConfig {
    /// CSS selectors of consent buttons; clicked first, then removed from the DOM
    pub consent_selectors: Vec<String>,
    /// CSS selector of the structural marker counted while scrolling
    pub marker_selector: String,
    pub scroll_pause: Duration,
    pub max_scroll_attempts: u32,
    /// Consecutive unchanged observations needed to call the page stable
    pub stable_rounds: u32,
    /// Stop early once this many markers are present (0 disables)
    pub target_markers: usize,
    pub navigation_timeout: Duration,
}

impl Default for BrowserlessConfig {
    fn default() -> Self {
        Self {
            consent_selectors: vec![
                "#popin_tc_privacy_button_2".to_string(),
                "button[id*='accept']".to_string(),
                "#onetrust-accept-btn-handler".to_string(),
                "[class*='cookie'] button".to_string(),
            ],
            marker_selector: "sports-events-event-card".to_string(),
            scroll_pause: Duration::from_millis(2000),
            max_scroll_attempts: 60,
            stable_rounds: 3,
            target_markers: 0,
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

pub struct BrowserlessRenderer {
    client: Client,
    base_url: String,
    token: Option<String>,
    config: BrowserlessConfig,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for BrowserlessRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserlessRenderer")
            .field("base_url", &self.base_url)
            .field("circuit_state", &self.circuit_state())
            .finish()
    }
}

impl BrowserlessRenderer {
    pub fn new(base_url: &str, token: Option<&str>, config: BrowserlessConfig) -> Self {
        Self::with_circuit_breaker(base_url, token, config, CircuitBreakerConfig::default())
    }

    pub fn with_circuit_breaker(
        base_url: &str,
        token: Option<&str>,
        config: BrowserlessConfig,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            config,
            circuit_breaker: Arc::new(CircuitBreaker::new("browserless", breaker)),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    fn endpoint(&self, request: &RenderRequest) -> String {
        let mut endpoint = format!("{}/function", self.base_url);
        let mut query = Vec::new();
        if let Some(ref token) = self.token {
            query.push(format!("token={token}"));
        }
        if request.proxy_tier == super::ProxyTier::Residential {
            query.push("proxy=residential".to_string());
            query.push(format!("proxyCountry={}", request.country_code));
        }
        if !query.is_empty() {
            endpoint.push('?');
            endpoint.push_str(&query.join("&"));
        }
        endpoint
    }

    /// JSON body for the `/function` call.
    pub fn build_payload(&self, request: &RenderRequest) -> serde_json::Value {
        let pause = if request.scroll.enabled() {
            request.scroll.pause.max(self.config.scroll_pause)
        } else {
            self.config.scroll_pause
        };

        json!({
            "code": SCROLL_UNTIL_STABLE_SCRIPT,
            "context": {
                "url": request.url,
                "consentSelectors": self.config.consent_selectors,
                "markerSelector": self.config.marker_selector,
                "scrollPauseMs": pause.as_millis() as u64,
                "maxScrollAttempts": self.config.max_scroll_attempts.max(request.scroll.count),
                "stableRounds": self.config.stable_rounds,
                "targetMarkers": self.config.target_markers,
                "navigationTimeoutMs": self.config.navigation_timeout.as_millis() as u64,
            }
        })
    }

    async fn render_internal(&self, request: &RenderRequest) -> Result<RenderResponse> {
        let resp = self
            .client
            .post(self.endpoint(request))
            .header("Content-Type", "application/json")
            .json(&self.build_payload(request))
            .timeout(request.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RenderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(RenderResponse {
            status: status.as_u16(),
            body: resp.text().await?,
        })
    }
}

#[async_trait]
impl Renderer for BrowserlessRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse> {
        if !self.circuit_breaker.is_available() {
            return Err(RenderError::Unavailable(format!(
                "browserless circuit breaker is open (url={})",
                request.url
            )));
        }

        info!(url = %request.url, "Rendering through headless browser fallback");
        let result = self.render_internal(request).await;

        match &result {
            Ok(_) => self.circuit_breaker.record_success(),
            Err(e) if e.rejects_account() => {
                warn!(error = %e, "Browser backend rejected the account");
                self.circuit_breaker.trip(&e.to_string());
            }
            Err(e) => {
                warn!(error = %e, "Browser fallback render failed");
                self.circuit_breaker.record_failure(&e.to_string());
            }
        }

        result
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_available()
    }

    fn circuit(&self) -> Option<CircuitSnapshot> {
        Some(self.circuit_breaker.snapshot())
    }

    fn name(&self) -> &str {
        "browserless"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ProxyTier, ScrollProfile};

    fn request(tier: ProxyTier) -> RenderRequest {
        RenderRequest {
            url: "https://www.betclic.fr/tennis-stennis".to_string(),
            wait: Duration::from_secs(10),
            scroll: ScrollProfile {
                count: 100,
                step_timeout: Duration::from_millis(1500),
                pause: Duration::from_millis(4000),
            },
            proxy_tier: tier,
            country_code: "fr".to_string(),
            session_id: 7,
            timeout: Duration::from_secs(120),
        }
    }

    #[test]
    fn test_payload_carries_scroll_contract() {
        let renderer = BrowserlessRenderer::new("http://browserless:3000/", None, BrowserlessConfig::default());
        let payload = renderer.build_payload(&request(ProxyTier::Premium));

        let context = &payload["context"];
        assert_eq!(context["url"], "https://www.betclic.fr/tennis-stennis");
        assert_eq!(context["markerSelector"], "sports-events-event-card");
        assert_eq!(context["scrollPauseMs"], 4000);
        assert_eq!(context["maxScrollAttempts"], 100);
        assert_eq!(context["stableRounds"], 3);
        assert!(payload["code"].as_str().unwrap().contains("scrollHeight"));
    }

    #[test]
    fn test_endpoint_token_and_residential_proxy() {
        let renderer = BrowserlessRenderer::new("http://browserless:3000/", Some("tok"), BrowserlessConfig::default());
        assert_eq!(
            renderer.endpoint(&request(ProxyTier::Premium)),
            "http://browserless:3000/function?token=tok"
        );
        assert_eq!(
            renderer.endpoint(&request(ProxyTier::Residential)),
            "http://browserless:3000/function?token=tok&proxy=residential&proxyCountry=fr"
        );
    }

    #[tokio::test]
    async fn test_open_circuit_blocks_render() {
        let renderer = BrowserlessRenderer::with_circuit_breaker(
            "http://127.0.0.1:9",
            None,
            BrowserlessConfig::default(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(600),
                success_threshold: 1,
            },
        );
        renderer.circuit_breaker.record_failure("connection refused");

        assert!(!renderer.is_available());
        assert_eq!(renderer.circuit_state(), CircuitState::Open);
        let err = renderer.render(&request(ProxyTier::Premium)).await.unwrap_err();
        assert!(matches!(err, RenderError::Unavailable(_)));
        assert_eq!(renderer.circuit().map(|c| c.trips), Some(1));
    }
}
