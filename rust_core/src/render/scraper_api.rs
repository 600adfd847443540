//! Rendering-proxy client (ScraperAPI-compatible GET endpoint).

use super::{RenderRequest, RenderResponse, Renderer, Result, BROWSER_HEADERS};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_SCRAPERAPI_ENDPOINT: &str = "http://api.scraperapi.com";

#[derive(Clone)]
pub struct ScraperApiRenderer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for ScraperApiRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperApiRenderer")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl ScraperApiRenderer {
    pub fn new(api_key: &str) -> Self {
        Self::with_endpoint(DEFAULT_SCRAPERAPI_ENDPOINT, api_key)
    }

    pub fn with_endpoint(endpoint: &str, api_key: &str) -> Self {
        Self {
            client: Client::builder()
                .default_headers(browser_headers())
                .timeout(Duration::from_secs(180))
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Query parameters for one proxied render.
    pub fn build_query(&self, request: &RenderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("api_key", self.api_key.clone()),
            ("url", request.url.clone()),
            ("render", "true".to_string()),
            ("country_code", request.country_code.clone()),
            ("device_type", "desktop".to_string()),
            ("session_number", request.session_id.to_string()),
            ("keep_headers", "true".to_string()),
            ("autoparse", "false".to_string()),
            ("format", "html".to_string()),
            ("wait", request.wait.as_millis().to_string()),
            ("screenshot", "false".to_string()),
        ];

        match request.proxy_tier {
            super::ProxyTier::Standard => {}
            super::ProxyTier::Premium => params.push(("premium", "true".to_string())),
            super::ProxyTier::Residential => {
                params.push(("premium", "true".to_string()));
                params.push(("ultra_premium", "true".to_string()));
                params.push(("residential", "true".to_string()));
            }
        }

        if request.scroll.enabled() {
            params.push(("scroll", "true".to_string()));
            params.push(("scroll_count", request.scroll.count.to_string()));
            params.push((
                "scroll_timeout",
                request.scroll.step_timeout.as_millis().to_string(),
            ));
            params.push((
                "scroll_pause_time",
                request.scroll.pause.as_millis().to_string(),
            ));
        }

        params
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in BROWSER_HEADERS {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

#[async_trait]
impl Renderer for ScraperApiRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse> {
        debug!(
            url = %request.url,
            tier = request.proxy_tier.as_str(),
            country = %request.country_code,
            session = request.session_id,
            "Requesting proxied render"
        );

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&self.build_query(request))
            .timeout(request.timeout)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;

        Ok(RenderResponse { status, body })
    }

    fn name(&self) -> &str {
        "scraperapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ProxyTier, ScrollProfile};

    fn request(tier: ProxyTier, scroll: ScrollProfile) -> RenderRequest {
        RenderRequest {
            url: "https://www.betclic.fr/tennis-stennis".to_string(),
            wait: Duration::from_millis(45_000),
            scroll,
            proxy_tier: tier,
            country_code: "fr".to_string(),
            session_id: 42,
            timeout: Duration::from_secs(80),
        }
    }

    fn get<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_premium_query_with_scroll() {
        let renderer = ScraperApiRenderer::new("key");
        let scroll = ScrollProfile {
            count: 30,
            step_timeout: Duration::from_millis(2000),
            pause: Duration::from_millis(3000),
        };
        let params = renderer.build_query(&request(ProxyTier::Premium, scroll));

        assert_eq!(get(&params, "api_key"), Some("key"));
        assert_eq!(get(&params, "wait"), Some("45000"));
        assert_eq!(get(&params, "premium"), Some("true"));
        assert_eq!(get(&params, "ultra_premium"), None);
        assert_eq!(get(&params, "scroll_count"), Some("30"));
        assert_eq!(get(&params, "scroll_timeout"), Some("2000"));
        assert_eq!(get(&params, "scroll_pause_time"), Some("3000"));
        assert_eq!(get(&params, "session_number"), Some("42"));
        assert_eq!(get(&params, "country_code"), Some("fr"));
    }

    #[test]
    fn test_residential_query_without_scroll() {
        let renderer = ScraperApiRenderer::new("key");
        let params = renderer.build_query(&request(ProxyTier::Residential, ScrollProfile::none()));

        assert_eq!(get(&params, "ultra_premium"), Some("true"));
        assert_eq!(get(&params, "residential"), Some("true"));
        assert_eq!(get(&params, "scroll"), None);
    }

    #[test]
    fn test_standard_tier_has_no_premium_flag() {
        let renderer = ScraperApiRenderer::new("key");
        let params = renderer.build_query(&request(ProxyTier::Standard, ScrollProfile::none()));
        assert_eq!(get(&params, "premium"), None);
    }
}
