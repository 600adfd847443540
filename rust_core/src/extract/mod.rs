//! Dual-path extraction of match records from one rendered listing page.
//!
//! The same page is mined twice: once through the JSON state embedded in
//! inline scripts ([`payload`]) and once through the rendered cards
//! ([`dom`]). Both record sets are returned so the reconciliation engine
//! can merge them.

pub mod dom;
pub mod error;
pub mod payload;
pub mod slug;

pub use error::ExtractError;

use crate::fetch::{count_markers, DEFAULT_MARKER};
use crate::types::{MatchRecord, RawContent, ScrapeStamp};
use chrono::{FixedOffset, Offset, Utc};
use dom::CardSelectors;
use scraper::{Html, Selector};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Origin used to absolutize hrefs and synthesize payload URLs
    pub site_base: String,
    /// Listing path segment used in synthesized URLs
    pub listing_path: String,
    pub payload_key: String,
    pub card_selector: String,
    pub label_selector: String,
    pub anchor_selector: String,
    pub time_selector: String,
    /// Time-label tokens meaning "today"/"tomorrow"
    pub relative_day_tokens: Vec<String>,
    /// Offset used to render payload timestamps as date/time tokens
    pub display_offset: FixedOffset,
    pub marker: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            site_base: "https://www.betclic.fr".to_string(),
            listing_path: "tennis-stennis".to_string(),
            payload_key: r#""matches":["#.to_string(),
            card_selector: "sports-events-event-card".to_string(),
            label_selector: ".scoreboard_contestantLabel".to_string(),
            anchor_selector: "a.cardEvent".to_string(),
            time_selector: ".event_infoTime".to_string(),
            relative_day_tokens: vec!["Auj.".to_string(), "Dem.".to_string()],
            display_offset: Utc.fix(),
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

/// Records from both paths plus the counts used for diagnostics.
#[derive(Debug, Default)]
pub struct Extraction {
    pub payload: Vec<MatchRecord>,
    pub dom: Vec<MatchRecord>,
    /// Structural markers in the raw body
    pub marker_count: usize,
    /// Payload objects seen, usable or not
    pub payload_candidates: usize,
    /// Card elements seen, usable or not
    pub dom_cards: usize,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty() && self.dom.is_empty()
    }
}

pub struct Extractor {
    config: ExtractConfig,
    cards: CardSelectors,
    script: Selector,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Result<Self, ExtractError> {
        let cards = CardSelectors::compile(&config)?;
        let script = Selector::parse("script").map_err(|e| ExtractError::Selector {
            selector: "script".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { config, cards, script })
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn extract(&self, raw: &RawContent, stamp: &ScrapeStamp) -> Extraction {
        self.extract_body(&raw.body, stamp)
    }

    pub fn extract_body(&self, body: &str, stamp: &ScrapeStamp) -> Extraction {
        let document = Html::parse_document(body);

        let scripts: Vec<String> = document
            .select(&self.script)
            .map(|el| el.text().collect::<String>())
            .collect();
        let payload = payload::extract_payload(scripts.iter().map(String::as_str), &self.config, stamp);
        let payload_records = dedup_by_url(payload.records);

        let (dom_records, dom_cards) = match dom::extract_cards(&document, &self.cards, &self.config, stamp) {
            Ok(out) => (out.records, out.cards),
            Err(e) => {
                warn!("DOM path skipped: {}", e);
                (Vec::new(), 0)
            }
        };

        let extraction = Extraction {
            payload: payload_records,
            dom: dom_records,
            marker_count: count_markers(body, &self.config.marker),
            payload_candidates: payload.candidates,
            dom_cards,
        };

        info!(
            payload = extraction.payload.len(),
            payload_candidates = extraction.payload_candidates,
            dom = extraction.dom.len(),
            dom_cards = extraction.dom_cards,
            markers = extraction.marker_count,
            "Extraction complete"
        );
        extraction
    }
}

fn dedup_by_url(records: Vec<MatchRecord>) -> Vec<MatchRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.source_url.clone()))
        .collect()
}
