//! One acquisition cycle: fetch, extract, reconcile, resolve, publish.
//!
//! Any stage that ends up with nothing to hand on short-circuits to
//! [`Stage::Done`] without touching the snapshot store.

use crate::circuit_breaker::CircuitSnapshot;
use crate::config::PipelineConfig;
use crate::dedup::{BatchStats, Reconciler};
use crate::extract::{ExtractError, Extractor};
use crate::fetch::FetchOrchestrator;
use crate::matching::{IdentityResolver, ResolutionStats};
use crate::publish::{PublishError, PublishReport, Publisher};
use crate::render::Renderer;
use crate::store::{load_reference_profiles, TableStore};
use crate::types::{MatchRecord, ScrapeStamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Fetching,
    Extracting,
    Reconciling,
    Resolving,
    Publishing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Reconciling => "reconciling",
            Stage::Resolving => "resolving",
            Stage::Publishing => "publishing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunExit {
    Published,
    FetchFailed { reason: String, attempts: u32 },
    NoRecords,
    /// Publish guard refused an empty (possibly filtered) snapshot
    NothingToPublish,
    PublishFailed(String),
}

impl RunExit {
    pub fn published(&self) -> bool {
        matches!(self, RunExit::Published)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<Stage>,
    pub pages: usize,
    pub fetch_attempts: u32,
    pub fallback_used: bool,
    /// Browser fallback gate after the fetch stage, when a fallback is configured
    pub fallback_circuit: Option<CircuitSnapshot>,
    pub payload_records: usize,
    pub dom_records: usize,
    pub reconciliation: Vec<BatchStats>,
    pub records: usize,
    pub resolution: ResolutionStats,
    pub reference_profiles: usize,
    pub publish: Option<PublishReport>,
    pub exit: RunExit,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            pages: 0,
            fetch_attempts: 0,
            fallback_used: false,
            fallback_circuit: None,
            payload_records: 0,
            dom_records: 0,
            reconciliation: Vec::new(),
            records: 0,
            resolution: ResolutionStats::default(),
            reference_profiles: 0,
            publish: None,
            exit: RunExit::NoRecords,
        }
    }

    fn enter(&mut self, stage: Stage) {
        info!(run_id = %self.run_id, stage = %stage, "Entering stage");
        self.stages.push(stage);
    }

    fn finish(mut self, exit: RunExit) -> Self {
        self.exit = exit;
        self.enter(Stage::Done);
        self.finished_at = Some(Utc::now());
        self
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    orchestrator: FetchOrchestrator,
    extractor: Extractor,
    reference_store: Arc<dyn TableStore>,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        primary: Arc<dyn Renderer>,
        fallback: Option<Arc<dyn Renderer>>,
        reference_store: Arc<dyn TableStore>,
        snapshot_store: Arc<dyn TableStore>,
    ) -> Result<Self, ExtractError> {
        let mut orchestrator = FetchOrchestrator::with_profile(primary, config.aggressiveness, config.fetch.clone());
        if let Some(fallback) = fallback {
            orchestrator = orchestrator.with_fallback(fallback);
        }
        let extractor = Extractor::new(config.extract.clone())?;
        let publisher = Publisher::new(snapshot_store, config.publish.clone());

        Ok(Self {
            config,
            orchestrator,
            extractor,
            reference_store,
            publisher,
        })
    }

    /// Replace the default strategy list (tests, custom deployments).
    pub fn with_orchestrator(mut self, orchestrator: FetchOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self) -> RunReport {
        self.run_with_stamp(ScrapeStamp::now()).await
    }

    /// Run one cycle with every record stamped with `stamp`.
    pub async fn run_with_stamp(&self, stamp: ScrapeStamp) -> RunReport {
        let mut report = RunReport::new();
        info!(
            run_id = %report.run_id,
            target = %self.config.target_url,
            profile = %self.config.aggressiveness,
            "Starting acquisition cycle"
        );

        report.enter(Stage::Fetching);
        let fetched = self.orchestrator.fetch_all(&self.config.target_url).await;
        report.fallback_circuit = self.orchestrator.fallback_circuit();
        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(failure) => {
                warn!(run_id = %report.run_id, "Fetch failed, snapshot left untouched: {}", failure);
                report.fetch_attempts = failure.attempts;
                return report.finish(RunExit::FetchFailed {
                    reason: failure.reason,
                    attempts: failure.attempts,
                });
            }
        };
        report.pages = outcome.pages.len();
        report.fetch_attempts = outcome.attempts;
        report.fallback_used = outcome.fallback_used;

        report.enter(Stage::Extracting);
        let mut payload_batches = Vec::with_capacity(outcome.pages.len());
        let mut dom_batches = Vec::with_capacity(outcome.pages.len());
        for page in &outcome.pages {
            let extraction = self.extractor.extract(page, &stamp);
            report.payload_records += extraction.payload.len();
            report.dom_records += extraction.dom.len();
            payload_batches.push(extraction.payload);
            dom_batches.push(extraction.dom);
        }
        if report.payload_records + report.dom_records == 0 {
            warn!(run_id = %report.run_id, "No records extracted, snapshot left untouched");
            return report.finish(RunExit::NoRecords);
        }

        report.enter(Stage::Reconciling);
        let mut reconciler = Reconciler::new().with_pair_guard(self.config.pair_guard);
        for batch in payload_batches.into_iter().chain(dom_batches) {
            reconciler.add_batch(batch);
        }
        let reconciliation = reconciler.finish();
        report.reconciliation = reconciliation.batches;
        let mut records: Vec<MatchRecord> = reconciliation.records;
        report.records = records.len();
        if records.is_empty() {
            return report.finish(RunExit::NoRecords);
        }

        report.enter(Stage::Resolving);
        let profiles = match load_reference_profiles(
            self.reference_store.as_ref(),
            &self.config.reference_table,
            &self.config.reference_name_column,
        )
        .await
        {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(run_id = %report.run_id, "Reference profiles unavailable, every name falls back: {}", e);
                Vec::new()
            }
        };
        report.reference_profiles = profiles.len();
        let resolver = IdentityResolver::new(&profiles, self.config.resolver.clone());
        report.resolution = resolver.resolve_all(&mut records);
        info!(
            run_id = %report.run_id,
            exact = report.resolution.exact,
            fuzzy = report.resolution.fuzzy,
            fallback = report.resolution.fallback,
            "Resolution complete"
        );

        report.enter(Stage::Publishing);
        let exit = match self.publisher.publish(&records).await {
            Ok(publish) => {
                report.publish = Some(publish);
                RunExit::Published
            }
            Err(PublishError::EmptySnapshot) => RunExit::NothingToPublish,
            Err(e) => RunExit::PublishFailed(e.to_string()),
        };

        let report = report.finish(exit);
        info!(
            run_id = %report.run_id,
            records = report.records,
            exit = ?report.exit,
            "Acquisition cycle finished"
        );
        report
    }
}
