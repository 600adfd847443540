//! Multi-strategy fetch orchestrator.
//!
//! Drives a primary [`Renderer`] through an ordered strategy list (cheapest
//! first), validates every response, retries with backoff and fresh
//! sessions, rotates egress on block pages and optionally hands the target
//! to a browser fallback. Accepted pages are collected across passes and
//! the best one is picked by structural marker count.

pub mod error;
pub mod strategy;

pub use error::{AttemptError, FetchFailure};
pub use strategy::{AggressivenessProfile, Strategy};

use crate::circuit_breaker::CircuitSnapshot;
use crate::render::{RenderResponse, Renderer};
use crate::retry::Transient;
use crate::types::RawContent;
use rand::Rng;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MARKER: &str = "<sports-events-event-card";
pub const DEFAULT_MIN_MARKER_COUNT: usize = 30;

/// When the browser fallback may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    Never,
    /// Only when no strategy produced an accepted page
    #[default]
    OnFailure,
    /// Also when the best accepted page has fewer than the target markers
    WhenBelowTarget,
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "never" | "off" => Ok(FallbackPolicy::Never),
            "on_failure" | "failure" => Ok(FallbackPolicy::OnFailure),
            "when_below_target" | "below_target" => Ok(FallbackPolicy::WhenBelowTarget),
            other => Err(format!("unknown fallback policy: {other}")),
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FallbackPolicy::Never => "never",
            FallbackPolicy::OnFailure => "on_failure",
            FallbackPolicy::WhenBelowTarget => "when_below_target",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Minimum structural markers for a page to be accepted
    pub min_marker_count: usize,
    /// Opening-tag prefix counted as one structural marker
    pub marker: String,
    /// Substrings identifying an anti-bot block page
    pub block_signatures: Vec<String>,
    /// Accepted pages to collect for reconciliation
    pub passes: u32,
    pub pass_pause: Duration,
    pub fallback_policy: FallbackPolicy,
    pub fallback_target_markers: usize,
    /// Request parameters handed to the fallback renderer
    pub fallback_strategy: Strategy,
    /// Write each accepted body here for offline inspection
    pub debug_dump_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_marker_count: DEFAULT_MIN_MARKER_COUNT,
            marker: DEFAULT_MARKER.to_string(),
            block_signatures: vec!["Error 403".to_string(), "Forbidden".to_string()],
            passes: 1,
            pass_pause: Duration::from_secs(5),
            fallback_policy: FallbackPolicy::default(),
            fallback_target_markers: 0,
            fallback_strategy: Strategy::browser_fallback(),
            debug_dump_dir: None,
        }
    }
}

/// Every accepted page of one fetch, in acquisition order.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub pages: Vec<RawContent>,
    /// Render attempts made, fallback included
    pub attempts: u32,
    pub fallback_used: bool,
}

impl FetchOutcome {
    /// Highest marker count; the earliest page wins ties.
    pub fn best(&self) -> Option<&RawContent> {
        let mut best: Option<&RawContent> = None;
        for page in &self.pages {
            match best {
                Some(current) if page.marker_count <= current.marker_count => {}
                _ => best = Some(page),
            }
        }
        best
    }
}

/// Count opening tags starting with `marker`.
pub fn count_markers(body: &str, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    body.match_indices(marker)
        .filter(|(idx, _)| {
            // "<tag" must not be a prefix of a longer tag name
            body[idx + marker.len()..]
                .chars()
                .next()
                .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        })
        .count()
}

/// Accept or reject a rendered response.
pub fn validate_response(response: &RenderResponse, config: &FetchConfig) -> Result<usize, AttemptError> {
    if config
        .block_signatures
        .iter()
        .any(|sig| !sig.is_empty() && response.body.contains(sig.as_str()))
    {
        return Err(AttemptError::Blocked);
    }
    if response.status != 200 {
        return Err(AttemptError::Status(response.status));
    }

    let found = count_markers(&response.body, &config.marker);
    if found < config.min_marker_count {
        return Err(AttemptError::StructuralMismatch {
            found,
            required: config.min_marker_count,
        });
    }
    Ok(found)
}

pub struct FetchOrchestrator {
    primary: Arc<dyn Renderer>,
    fallback: Option<Arc<dyn Renderer>>,
    strategies: Vec<Strategy>,
    config: FetchConfig,
    last_session: AtomicU32,
}

impl FetchOrchestrator {
    pub fn new(primary: Arc<dyn Renderer>, strategies: Vec<Strategy>, config: FetchConfig) -> Self {
        Self {
            primary,
            fallback: None,
            strategies,
            config,
            last_session: AtomicU32::new(0),
        }
    }

    pub fn with_profile(primary: Arc<dyn Renderer>, profile: AggressivenessProfile, config: FetchConfig) -> Self {
        Self::new(primary, profile.strategies(), config)
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Renderer>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn fallback_circuit(&self) -> Option<CircuitSnapshot> {
        self.fallback.as_ref().and_then(|f| f.circuit())
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Best accepted page for `url`.
    pub async fn fetch(&self, url: &str) -> Result<RawContent, FetchFailure> {
        let outcome = self.fetch_all(url).await?;
        let attempts = outcome.attempts;
        outcome.best().cloned().ok_or_else(|| FetchFailure {
            reason: "no accepted page".to_string(),
            attempts,
        })
    }

    /// All accepted pages for `url`, one per successful pass plus the
    /// fallback page when it was used. A failed pass does not end the run;
    /// this only fails when no pass and no fallback produced a page.
    pub async fn fetch_all(&self, url: &str) -> Result<FetchOutcome, FetchFailure> {
        let mut outcome = FetchOutcome::default();
        let mut last_reason = "no strategies configured".to_string();
        let passes = self.config.passes.max(1);

        for pass in 0..passes {
            if pass > 0 {
                info!("Pausing {}ms before fetch pass {}/{}", self.config.pass_pause.as_millis(), pass + 1, passes);
                tokio::time::sleep(self.config.pass_pause).await;
            }

            match self.run_strategies(url, &mut outcome.attempts).await {
                Ok(page) => {
                    info!(
                        pass = pass + 1,
                        strategy = %page.strategy,
                        markers = page.marker_count,
                        "Accepted page"
                    );
                    self.accept(&mut outcome, page).await;
                }
                Err(reason) => {
                    warn!(pass = pass + 1, "All strategies exhausted: {}", reason);
                    last_reason = reason;
                }
            }
        }

        if self.wants_fallback(&outcome) {
            match self.try_fallback(url, &mut outcome.attempts).await {
                Some(Ok(page)) => {
                    outcome.fallback_used = true;
                    self.accept(&mut outcome, page).await;
                }
                Some(Err(reason)) => last_reason = reason,
                None => {}
            }
        }

        if outcome.pages.is_empty() {
            return Err(FetchFailure {
                reason: last_reason,
                attempts: outcome.attempts,
            });
        }
        Ok(outcome)
    }

    fn wants_fallback(&self, outcome: &FetchOutcome) -> bool {
        if self.fallback.is_none() {
            return false;
        }
        let best = outcome.best().map(|p| p.marker_count);
        match self.config.fallback_policy {
            FallbackPolicy::Never => false,
            FallbackPolicy::OnFailure => best.is_none(),
            FallbackPolicy::WhenBelowTarget => best.map_or(true, |count| count < self.config.fallback_target_markers),
        }
    }

    /// `None` when there is no fallback or it is currently unavailable.
    async fn try_fallback(&self, url: &str, attempts: &mut u32) -> Option<Result<RawContent, String>> {
        let fallback = self.fallback.as_ref()?;
        if !fallback.is_available() {
            info!(renderer = fallback.name(), "Browser fallback unavailable, skipping");
            return None;
        }

        let strategy = &self.config.fallback_strategy;
        let request = strategy.request(url, 0, self.next_session_id());
        *attempts += 1;
        info!(renderer = fallback.name(), "Trying browser fallback");

        let result = match fallback.render(&request).await {
            Ok(response) => validate_response(&response, &self.config).map(|count| (response, count)),
            Err(e) => Err(AttemptError::from(e)),
        };

        Some(match result {
            Ok((response, marker_count)) => Ok(RawContent {
                body: response.body,
                renderer: fallback.name().to_string(),
                strategy: strategy.name.clone(),
                marker_count,
            }),
            Err(e) => {
                warn!(renderer = fallback.name(), "Browser fallback rejected: {}", e);
                Err(format!("fallback: {e}"))
            }
        })
    }

    async fn run_strategies(&self, url: &str, attempts: &mut u32) -> Result<RawContent, String> {
        let mut last_reason = "no strategies configured".to_string();

        for strategy in &self.strategies {
            let mut rotation = 0usize;
            let per_strategy = strategy.attempts.max(1);

            for attempt in 1..=per_strategy {
                let request = strategy.request(url, rotation, self.next_session_id());
                *attempts += 1;
                debug!(
                    strategy = %strategy.name,
                    attempt,
                    country = %request.country_code,
                    session = request.session_id,
                    "Render attempt"
                );

                let result = match self.primary.render(&request).await {
                    Ok(response) => validate_response(&response, &self.config).map(|count| (response, count)),
                    Err(e) => Err(AttemptError::from(e)),
                };

                match result {
                    Ok((response, marker_count)) => {
                        return Ok(RawContent {
                            body: response.body,
                            renderer: self.primary.name().to_string(),
                            strategy: strategy.name.clone(),
                            marker_count,
                        });
                    }
                    Err(e) => {
                        warn!(
                            strategy = %strategy.name,
                            "Attempt {}/{} rejected: {}",
                            attempt,
                            per_strategy,
                            e
                        );
                        if e.escalates_egress() {
                            rotation += 1;
                            info!(
                                strategy = %strategy.name,
                                "Block page, escalating egress to {}",
                                strategy.country(rotation)
                            );
                        }
                        last_reason = format!("{}: {}", strategy.name, e);
                        if !e.is_transient() {
                            warn!(strategy = %strategy.name, "Permanent renderer error, abandoning strategy");
                            break;
                        }
                    }
                }

                if attempt < per_strategy && !strategy.backoff.is_zero() {
                    tokio::time::sleep(strategy.backoff).await;
                }
            }
            info!(strategy = %strategy.name, "Strategy exhausted, escalating");
        }

        Err(last_reason)
    }

    async fn accept(&self, outcome: &mut FetchOutcome, page: RawContent) {
        if outcome.pages.iter().any(|p| p.body == page.body) {
            info!(strategy = %page.strategy, "Identical page already collected, discarding");
            return;
        }
        self.dump(&page, outcome.pages.len() + 1).await;
        outcome.pages.push(page);
    }

    async fn dump(&self, page: &RawContent, n: usize) {
        let Some(dir) = &self.config.debug_dump_dir else {
            return;
        };
        let path = dir.join(format!("page_debug_{}_{}.html", page.renderer, n));
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("Could not create debug dump dir {}: {}", dir.display(), e);
            return;
        }
        match tokio::fs::write(&path, page.body.as_bytes()).await {
            Ok(()) => debug!("Wrote debug page to {}", path.display()),
            Err(e) => warn!("Could not write debug page {}: {}", path.display(), e),
        }
    }

    /// Fresh random session id, never equal to the previous one.
    fn next_session_id(&self) -> u32 {
        let previous = self.last_session.load(Ordering::SeqCst);
        let mut rng = rand::thread_rng();
        let mut id = rng.gen_range(1..=10_000u32);
        while id == previous {
            id = rng.gen_range(1..=10_000u32);
        }
        self.last_session.store(id, Ordering::SeqCst);
        id
    }
}
