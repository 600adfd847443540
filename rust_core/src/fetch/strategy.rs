//! Fetch strategy profiles.
//!
//! A strategy bundles the wait/scroll/proxy parameters of one escalation
//! step. Lists are ordered cheapest first and selected by a single
//! [`AggressivenessProfile`].

use crate::render::{ProxyTier, RenderRequest, ScrollProfile};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One escalation step of the fetch orchestrator.
#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    /// Settle time before the renderer snapshots the page
    pub wait: Duration,
    pub scroll: ScrollProfile,
    pub proxy_tier: ProxyTier,
    /// Egress countries, rotated when a block page comes back
    pub countries: Vec<String>,
    /// Transport timeout per attempt
    pub timeout: Duration,
    /// Attempts before moving to the next strategy
    pub attempts: u32,
    /// Sleep between failed attempts
    pub backoff: Duration,
}

impl Strategy {
    /// Egress country for the given rotation index.
    pub fn country(&self, rotation: usize) -> &str {
        if self.countries.is_empty() {
            return "fr";
        }
        &self.countries[rotation % self.countries.len()]
    }

    pub fn request(&self, url: &str, rotation: usize, session_id: u32) -> RenderRequest {
        RenderRequest {
            url: url.to_string(),
            wait: self.wait,
            scroll: self.scroll,
            proxy_tier: self.proxy_tier,
            country_code: self.country(rotation).to_string(),
            session_id,
            timeout: self.timeout,
        }
    }

    /// Short premium render with moderate scrolling.
    pub fn premium_quick() -> Self {
        Self {
            name: "premium-quick".to_string(),
            wait: Duration::from_millis(5_000),
            scroll: ScrollProfile {
                count: 50,
                step_timeout: Duration::from_millis(3_000),
                pause: Duration::from_millis(2_000),
            },
            proxy_tier: ProxyTier::Premium,
            countries: countries(&["fr", "be", "ch"]),
            timeout: Duration::from_secs(90),
            attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }

    /// Long settle time, few slow scrolls; survives constrained hosts.
    pub fn premium_patient() -> Self {
        Self {
            name: "premium-patient".to_string(),
            wait: Duration::from_millis(45_000),
            scroll: ScrollProfile {
                count: 30,
                step_timeout: Duration::from_millis(2_000),
                pause: Duration::from_millis(3_000),
            },
            proxy_tier: ProxyTier::Premium,
            countries: countries(&["fr", "be", "ch"]),
            timeout: Duration::from_secs(80),
            attempts: 3,
            backoff: Duration::from_secs(10),
        }
    }

    /// Longest settle time and heavy scrolling.
    pub fn premium_deep() -> Self {
        Self {
            name: "premium-deep".to_string(),
            wait: Duration::from_millis(60_000),
            scroll: ScrollProfile {
                count: 100,
                step_timeout: Duration::from_millis(1_500),
                pause: Duration::from_millis(4_000),
            },
            proxy_tier: ProxyTier::Premium,
            countries: countries(&["fr", "be", "ch"]),
            timeout: Duration::from_secs(120),
            attempts: 3,
            backoff: Duration::from_secs(10),
        }
    }

    /// Last proxy resort: residential egress, single attempt.
    pub fn residential_final() -> Self {
        Self {
            name: "residential-final".to_string(),
            wait: Duration::from_millis(10_000),
            scroll: ScrollProfile {
                count: 30,
                step_timeout: Duration::from_millis(2_000),
                pause: Duration::from_millis(3_000),
            },
            proxy_tier: ProxyTier::Residential,
            countries: countries(&["fr"]),
            timeout: Duration::from_secs(120),
            attempts: 1,
            backoff: Duration::from_secs(10),
        }
    }

    /// Parameters handed to the browser fallback renderer.
    pub fn browser_fallback() -> Self {
        Self {
            name: "browser-fallback".to_string(),
            wait: Duration::from_millis(5_000),
            scroll: ScrollProfile {
                count: 60,
                step_timeout: Duration::from_millis(1_500),
                pause: Duration::from_millis(2_000),
            },
            proxy_tier: ProxyTier::Premium,
            countries: countries(&["fr"]),
            timeout: Duration::from_secs(240),
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

fn countries(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

/// How hard the orchestrator tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggressivenessProfile {
    /// Fewer, slower, more reliable requests (resource-constrained hosts)
    Conservative,
    #[default]
    Standard,
    /// Deep scrolling and long waits; most complete listings, most quota
    Aggressive,
}

impl AggressivenessProfile {
    pub fn strategies(&self) -> Vec<Strategy> {
        match self {
            AggressivenessProfile::Conservative => {
                vec![Strategy::premium_patient(), Strategy::residential_final()]
            }
            AggressivenessProfile::Standard => vec![
                Strategy::premium_quick(),
                Strategy::premium_patient(),
                Strategy::residential_final(),
            ],
            AggressivenessProfile::Aggressive => vec![
                Strategy::premium_deep(),
                Strategy::premium_patient(),
                Strategy::residential_final(),
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggressivenessProfile::Conservative => "conservative",
            AggressivenessProfile::Standard => "standard",
            AggressivenessProfile::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for AggressivenessProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggressivenessProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" | "low" => Ok(AggressivenessProfile::Conservative),
            "standard" | "default" | "medium" => Ok(AggressivenessProfile::Standard),
            "aggressive" | "high" => Ok(AggressivenessProfile::Aggressive),
            other => Err(format!("unknown aggressiveness profile: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_escalate_to_residential() {
        for profile in [
            AggressivenessProfile::Conservative,
            AggressivenessProfile::Standard,
            AggressivenessProfile::Aggressive,
        ] {
            let strategies = profile.strategies();
            assert!(!strategies.is_empty());
            let tiers: Vec<ProxyTier> = strategies.iter().map(|s| s.proxy_tier).collect();
            let mut sorted = tiers.clone();
            sorted.sort();
            assert_eq!(tiers, sorted, "{profile} must go cheapest first");
            assert_eq!(tiers.last(), Some(&ProxyTier::Residential));
        }
    }

    #[test]
    fn test_country_rotation_wraps() {
        let strategy = Strategy::premium_quick();
        assert_eq!(strategy.country(0), "fr");
        assert_eq!(strategy.country(1), "be");
        assert_eq!(strategy.country(2), "ch");
        assert_eq!(strategy.country(3), "fr");

        let mut bare = Strategy::premium_quick();
        bare.countries.clear();
        assert_eq!(bare.country(5), "fr");
    }

    #[test]
    fn test_request_from_strategy() {
        let request = Strategy::premium_patient().request("https://x.test/list", 1, 99);
        assert_eq!(request.country_code, "be");
        assert_eq!(request.session_id, 99);
        assert_eq!(request.wait, Duration::from_millis(45_000));
        assert_eq!(request.scroll.count, 30);
    }

    #[test]
    fn test_parse_profile() {
        assert_eq!("Aggressive".parse(), Ok(AggressivenessProfile::Aggressive));
        assert_eq!(" conservative ".parse(), Ok(AggressivenessProfile::Conservative));
        assert_eq!("default".parse(), Ok(AggressivenessProfile::Standard));
        assert!("turbo".parse::<AggressivenessProfile>().is_err());
    }
}
