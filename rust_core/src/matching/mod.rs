//! Participant identity resolution.
//!
//! Maps free-text participant names onto canonical reference profiles:
//! 1. exact match on normalized names
//! 2. best fuzzy match at or above the threshold
//! 3. synthesized fallback profile URL (unresolved)

use crate::types::{MatchRecord, ReferenceProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_PROFILE_URL_BASE: &str = "https://www.tennisabstract.com/cgi-bin/player.cgi?p=";
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.80;

/// Non-breaking spaces to spaces, collapsed whitespace, lower-case.
pub fn normalize_name(name: &str) -> String {
    name.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Profile identifier derived from a name: `"Jean-Luc O'Neil"` -> `"jeanluconeil"`.
pub fn profile_slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Ratcliff/Obershelp ratio `2*M / (len(a) + len(b))` over chars, where `M`
/// counts the chars of all matching blocks. Blocks are found by taking the
/// longest common run, then recursing on the pieces left and right of it.
///
/// Not symmetric in rare tie cases: pass the reference name as `a`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, (alo, ahi), (blo, bhi));
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
/// The run starting earliest in `a`, then earliest in `b`, wins ties.
fn longest_match(a: &[char], b: &[char], (alo, ahi): (usize, usize), (blo, bhi): (usize, usize)) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best) = (alo, blo, 0);
    let width = bhi - blo;
    // run lengths ending at (i - 1, j) and (i, j), offset by one column
    let mut prev = vec![0usize; width + 1];
    let mut row = vec![0usize; width + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            row[col] = if a[i] == b[j] { prev[col - 1] + 1 } else { 0 };
            if row[col] > best {
                best = row[col];
                best_i = i + 1 - best;
                best_j = j + 1 - best;
            }
        }
        std::mem::swap(&mut prev, &mut row);
    }
    (best_i, best_j, best)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    Exact,
    Fuzzy { score: f64, matched: String },
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub url: String,
    pub resolved: bool,
    pub method: ResolutionMethod,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub profile_url_base: String,
    /// Minimum similarity for a fuzzy match (inclusive)
    pub fuzzy_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            profile_url_base: DEFAULT_PROFILE_URL_BASE.to_string(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

impl ResolverConfig {
    pub fn profile_url(&self, name: &str) -> String {
        format!("{}{}", self.profile_url_base, profile_slug(name))
    }
}

/// Resolution counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub exact: usize,
    pub fuzzy: usize,
    pub fallback: usize,
}

impl ResolutionStats {
    fn record(&mut self, method: &ResolutionMethod) {
        match method {
            ResolutionMethod::Exact => self.exact += 1,
            ResolutionMethod::Fuzzy { .. } => self.fuzzy += 1,
            ResolutionMethod::Fallback => self.fallback += 1,
        }
    }

    pub fn resolved(&self) -> usize {
        self.exact + self.fuzzy
    }
}

struct Entry {
    normalized: String,
    display_name: String,
}

/// Resolver over one run's reference snapshot. Normalized names are
/// computed once into a side table; the profiles themselves are untouched.
pub struct IdentityResolver {
    entries: Vec<Entry>,
    exact: HashMap<String, usize>,
    config: ResolverConfig,
}

impl IdentityResolver {
    pub fn new(profiles: &[ReferenceProfile], config: ResolverConfig) -> Self {
        let entries: Vec<Entry> = profiles
            .iter()
            .map(|p| Entry {
                normalized: normalize_name(&p.display_name),
                display_name: p.display_name.clone(),
            })
            .collect();

        let mut exact = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            // duplicates keep the first reference row
            exact.entry(entry.normalized.clone()).or_insert(idx);
        }

        Self { entries, exact, config }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Resolution {
        let normalized = normalize_name(name);

        if let Some(&idx) = self.exact.get(&normalized) {
            return Resolution {
                url: self.config.profile_url(&self.entries[idx].display_name),
                resolved: true,
                method: ResolutionMethod::Exact,
            };
        }

        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let score = similarity(&entry.normalized, &normalized);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((idx, score)),
            }
        }

        if let Some((idx, score)) = best {
            if score >= self.config.fuzzy_threshold {
                let matched = self.entries[idx].display_name.clone();
                debug!("Fuzzy match '{}' -> '{}' ({:.3})", name, matched, score);
                return Resolution {
                    url: self.config.profile_url(&matched),
                    resolved: true,
                    method: ResolutionMethod::Fuzzy { score, matched },
                };
            }
        }

        debug!("No reference match for '{}', using fallback profile", name);
        Resolution {
            url: self.config.profile_url(name),
            resolved: false,
            method: ResolutionMethod::Fallback,
        }
    }

    /// Fill both participants' reference URL and resolved flag.
    pub fn resolve_record(&self, record: &mut MatchRecord, stats: &mut ResolutionStats) {
        let a = self.resolve(&record.participant_a);
        let b = self.resolve(&record.participant_b);
        stats.record(&a.method);
        stats.record(&b.method);

        record.participant_a_ref = a.url;
        record.participant_a_resolved = a.resolved;
        record.participant_b_ref = b.url;
        record.participant_b_resolved = b.resolved;
    }

    pub fn resolve_all(&self, records: &mut [MatchRecord]) -> ResolutionStats {
        let mut stats = ResolutionStats::default();
        for record in records.iter_mut() {
            self.resolve_record(record, &mut stats);
        }
        stats
    }
}

/// One-shot resolution of a single name against a reference dataset.
pub fn resolve(name: &str, reference_profiles: &[ReferenceProfile]) -> (String, bool) {
    let resolution = IdentityResolver::new(reference_profiles, ResolverConfig::default()).resolve(name);
    (resolution.url, resolution.resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScrapeStamp;

    fn profiles(names: &[&str]) -> Vec<ReferenceProfile> {
        names.iter().map(|n| ReferenceProfile::new(*n)).collect()
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Novak\u{a0}\u{a0}DJOKOVIC "), "novak djokovic");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_profile_slug() {
        assert_eq!(profile_slug("Novak Djokovic"), "novakdjokovic");
        assert_eq!(profile_slug("Jean-Luc O'Neil"), "jeanluconeil");
        assert_eq!(profile_slug("Félix Auger-Aliassime"), "flixaugeraliassime");
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_similarity_matching_blocks() {
        // " wawrinka" then "stan": 13 of 31 chars
        assert_eq!(similarity("stanislas wawrinka", "stan wawrinka"), 26.0 / 31.0);
        assert_eq!(similarity("carlos alcaraz garfia", "carlos alcaraz"), 0.8);
        // "tomm", " p", "ul"
        assert_eq!(similarity("tommy paul", "tommi piul"), 0.8);
        assert_eq!(similarity("tommy paul", "tommi piol"), 0.7);
    }

    #[test]
    fn test_fuzzy_accepts_shortened_names() {
        let refs = profiles(&["Stanislas Wawrinka", "Carlos Alcaraz Garfia"]);
        let resolver = IdentityResolver::new(&refs, ResolverConfig::default());

        let stan = resolver.resolve("Stan Wawrinka");
        assert!(stan.resolved);
        assert_eq!(stan.url, format!("{DEFAULT_PROFILE_URL_BASE}stanislaswawrinka"));

        // exactly at the threshold
        let carlos = resolver.resolve("Carlos Alcaraz");
        assert_eq!(
            carlos.method,
            ResolutionMethod::Fuzzy {
                score: 0.8,
                matched: "Carlos Alcaraz Garfia".to_string()
            }
        );
    }

    #[test]
    fn test_exact_beats_fuzzy() {
        let refs = profiles(&["Novak Djokovic", "Novak Djokovik"]);
        let (url, resolved) = resolve("novak   djokovic", &refs);
        assert!(resolved);
        assert_eq!(url, format!("{DEFAULT_PROFILE_URL_BASE}novakdjokovic"));

        let resolver = IdentityResolver::new(&refs, ResolverConfig::default());
        assert_eq!(resolver.resolve("NOVAK DJOKOVIC").method, ResolutionMethod::Exact);
    }

    #[test]
    fn test_duplicate_reference_first_row_wins() {
        let refs = profiles(&["Ann Lee", "ann  lee"]);
        let resolver = IdentityResolver::new(&refs, ResolverConfig::default());
        assert!(resolver.resolve("ANN LEE").url.ends_with("p=annlee"));
    }

    #[test]
    fn test_fuzzy_boundary_inclusive() {
        let refs = profiles(&["Tommy Paul"]);
        let resolver = IdentityResolver::new(&refs, ResolverConfig::default());

        let at_threshold = resolver.resolve("Tommi Piul");
        assert!(at_threshold.resolved);
        assert_eq!(
            at_threshold.method,
            ResolutionMethod::Fuzzy {
                score: 0.8,
                matched: "Tommy Paul".to_string()
            }
        );
        assert_eq!(at_threshold.url, format!("{DEFAULT_PROFILE_URL_BASE}tommypaul"));

        let below = resolver.resolve("Tommi Piol");
        assert!(!below.resolved);
        assert_eq!(below.method, ResolutionMethod::Fallback);
        assert_eq!(below.url, format!("{DEFAULT_PROFILE_URL_BASE}tommipiol"));
    }

    #[test]
    fn test_fuzzy_tie_earliest_row_wins() {
        let refs = profiles(&["Jane Dox", "Jane Doy"]);
        let resolver = IdentityResolver::new(&refs, ResolverConfig::default());
        match resolver.resolve("Jane Doe").method {
            ResolutionMethod::Fuzzy { matched, .. } => assert_eq!(matched, "Jane Dox"),
            other => panic!("expected fuzzy match, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_reference_falls_back() {
        let (url, resolved) = resolve("Unknown Qualifier", &[]);
        assert!(!resolved);
        assert_eq!(url, format!("{DEFAULT_PROFILE_URL_BASE}unknownqualifier"));
    }

    #[test]
    fn test_resolve_all_counts() {
        let refs = profiles(&["Jane Doe", "Ann Lee"]);
        let resolver = IdentityResolver::new(&refs, ResolverConfig::default());
        let stamp = ScrapeStamp {
            date: "2024-05-01".to_string(),
            time: "10:00:00".to_string(),
        };
        let mut records = vec![
            MatchRecord::new("Jane Doe", "Anne Lee", "u1", &stamp),
            MatchRecord::new("Zed Zed", "Ann Lee", "u2", &stamp),
        ];

        let stats = resolver.resolve_all(&mut records);
        assert_eq!(stats, ResolutionStats { exact: 2, fuzzy: 1, fallback: 1 });
        assert!(records[0].both_resolved());
        assert!(!records[1].participant_a_resolved);
        assert_eq!(records[1].participant_a_ref, format!("{DEFAULT_PROFILE_URL_BASE}zedzed"));
        assert_eq!(records[0].participant_b_ref, format!("{DEFAULT_PROFILE_URL_BASE}annlee"));
    }
}
