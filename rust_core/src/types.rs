//! Shared record types for the match acquisition pipeline.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One upcoming match as scraped from the listing page.
///
/// Serializes to a flat row whose keys are the snapshot table's columns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Date token as displayed ("Auj.", "Jeu. 01/01", "01/05"), possibly empty
    pub event_date: String,
    /// Time token as displayed ("15:00"), possibly empty
    pub event_time: String,
    pub tournament: String,
    /// Reserved, the listing does not expose rounds reliably
    pub round: String,
    pub participant_a: String,
    pub participant_b: String,
    /// Absolute match URL on the origin site
    pub source_url: String,
    pub scrape_date: String,
    pub scrape_time: String,
    /// Canonical profile URL, filled by the identity resolver
    pub participant_a_ref: String,
    pub participant_b_ref: String,
    pub participant_a_resolved: bool,
    pub participant_b_resolved: bool,
}

impl MatchRecord {
    /// Build an unresolved record stamped with the run's capture time.
    pub fn new(
        participant_a: impl Into<String>,
        participant_b: impl Into<String>,
        source_url: impl Into<String>,
        stamp: &ScrapeStamp,
    ) -> Self {
        Self {
            participant_a: participant_a.into(),
            participant_b: participant_b.into(),
            source_url: source_url.into(),
            scrape_date: stamp.date.clone(),
            scrape_time: stamp.time.clone(),
            ..Default::default()
        }
    }

    pub fn with_schedule(mut self, event_date: impl Into<String>, event_time: impl Into<String>) -> Self {
        self.event_date = event_date.into();
        self.event_time = event_time.into();
        self
    }

    pub fn with_tournament(mut self, tournament: impl Into<String>) -> Self {
        self.tournament = tournament.into();
        self
    }

    /// Both participants matched a reference profile with confidence
    pub fn both_resolved(&self) -> bool {
        self.participant_a_resolved && self.participant_b_resolved
    }

    /// Short human label used in log lines
    pub fn label(&self) -> String {
        format!(
            "{} vs {} | {} {} | {}",
            self.participant_a, self.participant_b, self.event_date, self.event_time, self.tournament
        )
    }
}

/// Capture timestamp shared by every record of one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrapeStamp {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
}

impl ScrapeStamp {
    pub fn now() -> Self {
        Self::at(&Local::now())
    }

    pub fn at<Tz: TimeZone>(at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            date: at.format("%Y-%m-%d").to_string(),
            time: at.format("%H:%M:%S").to_string(),
        }
    }
}

/// One row of the trusted reference ratings dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceProfile {
    /// Canonical display name, original casing
    pub display_name: String,
    /// Remaining columns (ratings etc.), carried but never interpreted
    pub attributes: Map<String, Value>,
}

impl ReferenceProfile {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            attributes: Map::new(),
        }
    }

    /// Build a profile from a raw store row. Rows without a usable name
    /// column yield `None`.
    pub fn from_row(row: &Value, name_column: &str) -> Option<Self> {
        let obj = row.as_object()?;
        let name = obj.get(name_column)?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }

        let attributes = obj
            .iter()
            .filter(|(k, _)| k.as_str() != name_column)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            display_name: name.to_string(),
            attributes,
        })
    }
}

/// Raw page body accepted by the fetch orchestrator.
#[derive(Clone, Debug)]
pub struct RawContent {
    pub body: String,
    /// Renderer that produced the body ("scraperapi", "browserless", ...)
    pub renderer: String,
    /// Strategy name the body was obtained with
    pub strategy: String,
    /// Structural markers counted during validation
    pub marker_count: usize,
}
