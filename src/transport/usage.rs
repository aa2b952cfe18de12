//! Per-provider usage tracking (spec §3 `UsageTracker`, §4.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default)]
struct ProviderCounters {
    requests_today: u64,
    failures_today: u64,
    requests_this_month: u64,
    day_started: Option<DateTime<Utc>>,
    month_started: Option<DateTime<Utc>>,
}

/// Free-tier ceilings used to compute `approaching_limit`. Values are
/// conservative defaults for the major premium RPC vendors; operators
/// override via config when their plan differs.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCeiling {
    pub daily_requests: u64,
}

impl Default for ProviderCeiling {
    fn default() -> Self {
        ProviderCeiling { daily_requests: 300_000 }
    }
}

pub struct UsageTracker {
    counters: parking_lot::Mutex<HashMap<String, ProviderCounters>>,
    ceilings: HashMap<String, ProviderCeiling>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub provider: String,
    pub requests_today: u64,
    pub failures_today: u64,
    pub requests_this_month: u64,
    pub approaching_limit: bool,
}

impl UsageTracker {
    pub fn new() -> Self {
        UsageTracker {
            counters: parking_lot::Mutex::new(HashMap::new()),
            ceilings: HashMap::new(),
        }
    }

    pub fn with_ceiling(mut self, provider: impl Into<String>, ceiling: ProviderCeiling) -> Self {
        self.ceilings.insert(provider.into(), ceiling);
        self
    }

    pub fn record_request(&self, provider: &str, failed: bool) {
        let mut counters = self.counters.lock();
        let entry = counters.entry(provider.to_string()).or_default();
        let now = Utc::now();
        roll_if_needed(entry, now);
        entry.requests_today += 1;
        entry.requests_this_month += 1;
        if failed {
            entry.failures_today += 1;
        }
    }

    pub fn summary(&self) -> Vec<ProviderUsage> {
        let counters = self.counters.lock();
        counters
            .iter()
            .map(|(provider, c)| {
                let ceiling = self.ceilings.get(provider).copied().unwrap_or_default();
                let approaching_limit =
                    c.requests_today as f64 > 0.8 * ceiling.daily_requests as f64;
                ProviderUsage {
                    provider: provider.clone(),
                    requests_today: c.requests_today,
                    failures_today: c.failures_today,
                    requests_this_month: c.requests_this_month,
                    approaching_limit,
                }
            })
            .collect()
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Reset daily/monthly counters when a UTC midnight / first-of-month
/// boundary has been crossed since the last recorded request.
fn roll_if_needed(entry: &mut ProviderCounters, now: DateTime<Utc>) {
    match entry.day_started {
        Some(started) if started.date_naive() == now.date_naive() => {}
        _ => {
            entry.requests_today = 0;
            entry.failures_today = 0;
            entry.day_started = Some(now);
        }
    }
    match entry.month_started {
        Some(started) if started.year() == now.year() && started.month() == now.month() => {}
        _ => {
            entry.requests_this_month = 0;
            entry.month_started = Some(now);
        }
    }
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_requests_and_failures_per_provider() {
        let tracker = UsageTracker::new();
        tracker.record_request("alchemy", false);
        tracker.record_request("alchemy", true);
        tracker.record_request("quicknode", false);

        let summary = tracker.summary();
        let alchemy = summary.iter().find(|u| u.provider == "alchemy").unwrap();
        assert_eq!(alchemy.requests_today, 2);
        assert_eq!(alchemy.failures_today, 1);
        let quicknode = summary.iter().find(|u| u.provider == "quicknode").unwrap();
        assert_eq!(quicknode.requests_today, 1);
    }

    #[test]
    fn approaching_limit_flips_past_eighty_percent() {
        let tracker = UsageTracker::new()
            .with_ceiling("alchemy", ProviderCeiling { daily_requests: 10 });
        for _ in 0..9 {
            tracker.record_request("alchemy", false);
        }
        let summary = tracker.summary();
        assert!(summary[0].approaching_limit);
    }
}
