//! Cross-pass, cross-path record reconciliation.
//!
//! Batches are processed in the order given and the first record seen wins.
//! A record is rejected when its [`DedupKey`] or its non-empty source URL was
//! already accepted, so the output never holds two records sharing either.

use crate::matching::normalize_name;
use crate::types::MatchRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Fuzzy composite identity of a match, symmetric in its participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub participants: (String, String),
    pub date: String,
    pub hour: String,
}

impl DedupKey {
    pub fn of(record: &MatchRecord) -> Self {
        Self {
            participants: participant_pair(record),
            date: record.event_date.trim().to_lowercase(),
            hour: hour_of(&record.event_time),
        }
    }
}

/// Name normalization plus removal of parenthesized content and digits.
pub fn clean_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            c if c.is_ascii_digit() => {}
            c => out.push(c),
        }
    }
    normalize_name(&out)
}

/// Hour component of a time token: `"15:30"` -> `"15"`, `"1530"` -> `"15"`.
pub fn hour_of(time: &str) -> String {
    let time = time.trim();
    if let Some((hour, _)) = time.split_once(':') {
        return hour.trim().to_string();
    }
    if !time.is_empty() && time.chars().all(|c| c.is_ascii_digit()) {
        return time.chars().take(2).collect();
    }
    time.to_lowercase()
}

fn sorted_pair(a: String, b: String) -> (String, String) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn participant_pair(record: &MatchRecord) -> (String, String) {
    sorted_pair(clean_name(&record.participant_a), clean_name(&record.participant_b))
}

/// Pair guard identity: only normalized, so seeds and digits still tell
/// pairs apart.
fn guard_pair(record: &MatchRecord) -> (String, String) {
    sorted_pair(normalize_name(&record.participant_a), normalize_name(&record.participant_b))
}

/// Per-batch accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub accepted: usize,
    pub rejected_by_key: usize,
    pub rejected_by_url: usize,
    pub rejected_by_pair: usize,
}

impl BatchStats {
    pub fn total(&self) -> usize {
        self.accepted + self.rejected_by_key + self.rejected_by_url + self.rejected_by_pair
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub records: Vec<MatchRecord>,
    pub batches: Vec<BatchStats>,
}

impl Reconciliation {
    pub fn rejected(&self) -> usize {
        self.batches.iter().map(|b| b.total() - b.accepted).sum()
    }
}

/// Incremental reconciler; feed batches in priority order.
#[derive(Debug, Default)]
pub struct Reconciler {
    pair_guard: bool,
    seen_keys: HashSet<DedupKey>,
    seen_urls: HashSet<String>,
    seen_pairs: HashSet<(String, String)>,
    out: Reconciliation,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reject a dated record whose participant pair was already
    /// accepted, whatever its date or hour.
    pub fn with_pair_guard(mut self, enabled: bool) -> Self {
        self.pair_guard = enabled;
        self
    }

    pub fn add_batch<I>(&mut self, records: I) -> BatchStats
    where
        I: IntoIterator<Item = MatchRecord>,
    {
        let mut stats = BatchStats::default();

        for record in records {
            let key = DedupKey::of(&record);
            let pair = guard_pair(&record);
            let url = record.source_url.trim().to_string();

            if self.seen_keys.contains(&key) {
                debug!("Duplicate by key: {}", record.label());
                stats.rejected_by_key += 1;
                continue;
            }
            if !url.is_empty() && self.seen_urls.contains(&url) {
                debug!("Duplicate by url: {}", url);
                stats.rejected_by_url += 1;
                continue;
            }
            if self.pair_guard && !key.date.is_empty() && self.seen_pairs.contains(&pair) {
                debug!("Duplicate by pair: {}", record.label());
                stats.rejected_by_pair += 1;
                continue;
            }

            self.seen_pairs.insert(pair);
            self.seen_keys.insert(key);
            if !url.is_empty() {
                self.seen_urls.insert(url);
            }
            self.out.records.push(record);
            stats.accepted += 1;
        }

        self.out.batches.push(stats.clone());
        stats
    }

    pub fn len(&self) -> usize {
        self.out.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.records.is_empty()
    }

    pub fn finish(self) -> Reconciliation {
        info!(
            accepted = self.out.records.len(),
            rejected = self.out.rejected(),
            batches = self.out.batches.len(),
            "Reconciliation complete"
        );
        self.out
    }
}

/// Merge record sets in the given order, first-seen wins.
pub fn reconcile<I>(record_sets: I) -> Vec<MatchRecord>
where
    I: IntoIterator<Item = Vec<MatchRecord>>,
{
    let mut reconciler = Reconciler::new();
    for set in record_sets {
        reconciler.add_batch(set);
    }
    reconciler.finish().records
}
