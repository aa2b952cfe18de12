//! RPC endpoints: rate limiting + URL redaction (spec §3, §4.1).

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use super::breaker::CircuitBreaker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderClass {
    Premium,
    Backup,
    Public,
}

/// A token-bucket-free preventive rate limiter: counters reset when a
/// wall-clock second/minute boundary is crossed, and a call is only
/// attempted if it would not exceed either bucket (spec §4.1: "the
/// endpoint is skipped, not throttled").
struct RateCounters {
    per_second_limit: u32,
    per_minute_limit: u32,
    second_count: u32,
    second_boundary: u64,
    minute_count: u32,
    minute_boundary: u64,
}

impl RateCounters {
    fn new(per_second_limit: u32, per_minute_limit: u32) -> Self {
        let now = unix_secs();
        RateCounters {
            per_second_limit,
            per_minute_limit,
            second_count: 0,
            second_boundary: now,
            minute_count: 0,
            minute_boundary: now / 60,
        }
    }

    fn roll(&mut self) {
        let now = unix_secs();
        if now != self.second_boundary {
            self.second_count = 0;
            self.second_boundary = now;
        }
        let minute = now / 60;
        if minute != self.minute_boundary {
            self.minute_count = 0;
            self.minute_boundary = minute;
        }
    }

    fn would_exceed(&mut self) -> bool {
        self.roll();
        self.second_count >= self.per_second_limit || self.minute_count >= self.per_minute_limit
    }

    fn record(&mut self) {
        self.roll();
        self.second_count += 1;
        self.minute_count += 1;
    }
}

fn unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub struct Endpoint {
    pub id: String,
    pub provider_class: ProviderClass,
    raw_url: String,
    sanitized_url: String,
    pub priority: i32,
    rate: parking_lot::Mutex<RateCounters>,
    pub breaker: parking_lot::Mutex<CircuitBreaker>,
    consecutive_failures: std::sync::atomic::AtomicU32,
    ema_latency_ms: parking_lot::Mutex<f64>,
    healthy: std::sync::atomic::AtomicBool,
}

impl Endpoint {
    pub fn new(
        id: impl Into<String>,
        provider_class: ProviderClass,
        raw_url: impl Into<String>,
        priority: i32,
        per_second_limit: u32,
        per_minute_limit: u32,
        failure_threshold: u32,
        recovery_timeout: std::time::Duration,
    ) -> Self {
        let raw_url = raw_url.into();
        let sanitized_url = sanitize_url(&raw_url);
        Endpoint {
            id: id.into(),
            provider_class,
            raw_url,
            sanitized_url,
            priority,
            rate: parking_lot::Mutex::new(RateCounters::new(per_second_limit, per_minute_limit)),
            breaker: parking_lot::Mutex::new(CircuitBreaker::new(failure_threshold, recovery_timeout)),
            consecutive_failures: std::sync::atomic::AtomicU32::new(0),
            ema_latency_ms: parking_lot::Mutex::new(0.0),
            healthy: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Only the sanitized form is ever allowed to escape this module —
    /// logs, errors, and audit metadata all read from here.
    pub fn sanitized_url(&self) -> &str {
        &self.sanitized_url
    }

    /// Raw URL, used only for the actual I/O call.
    pub(super) fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self.breaker.lock().state(), super::breaker::BreakerState::Open)
    }

    pub fn would_exceed_rate_limit(&self) -> bool {
        self.rate.lock().would_exceed()
    }

    pub fn record_attempt(&self) {
        self.rate.lock().record();
    }

    pub fn record_success(&self, latency: std::time::Duration) {
        self.breaker.lock().record_success();
        self.consecutive_failures.store(0, std::sync::atomic::Ordering::Relaxed);
        self.set_healthy(true);
        let mut ema = self.ema_latency_ms.lock();
        let sample = latency.as_secs_f64() * 1000.0;
        *ema = if *ema == 0.0 { sample } else { 0.8 * *ema + 0.2 * sample };
    }

    pub fn record_failure(&self) {
        self.breaker.lock().record_failure();
        self.consecutive_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn ema_latency_ms(&self) -> f64 {
        *self.ema_latency_ms.lock()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Replace any query-string value that looks like an API key segment
/// with `***`, keeping only provider + path visible. E.g.
/// `https://base-mainnet.g.alchemy.com/v2/ABCDEF123456` becomes
/// `https://base-mainnet.g.alchemy.com/v2/***`.
pub fn sanitize_url(raw: &str) -> String {
    if let Ok(mut url) = url::Url::parse(raw) {
        url.set_query(None);
        let segments: Vec<String> = url
            .path_segments()
            .map(|s| s.collect::<Vec<_>>())
            .unwrap_or_default()
            .iter()
            .map(|seg| if looks_like_secret(seg) { "***".to_string() } else { seg.to_string() })
            .collect();
        url.set_path(&segments.join("/"));
        url.to_string()
    } else {
        "***".to_string()
    }
}

fn looks_like_secret(segment: &str) -> bool {
    segment.len() >= 20 && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sanitizes_api_key_path_segment() {
        let sanitized = sanitize_url("https://base-mainnet.g.alchemy.com/v2/AbCdEfGh12345678901234567890");
        assert_eq!(sanitized, "https://base-mainnet.g.alchemy.com/v2/***");
    }

    #[test]
    fn strips_query_strings_entirely() {
        let sanitized = sanitize_url("https://rpc.example.com/?key=supersecretvalue");
        assert!(!sanitized.contains("supersecretvalue"));
    }

    #[test]
    fn leaves_short_path_segments_alone() {
        let sanitized = sanitize_url("https://mainnet.base.org/rpc");
        assert_eq!(sanitized, "https://mainnet.base.org/rpc");
    }

    #[test]
    fn rate_limit_skips_once_bucket_exhausted() {
        let ep = Endpoint::new(
            "test", ProviderClass::Public, "https://example.com", 1, 2, 100, 3, Duration::from_secs(60),
        );
        assert!(!ep.would_exceed_rate_limit());
        ep.record_attempt();
        assert!(!ep.would_exceed_rate_limit());
        ep.record_attempt();
        assert!(ep.would_exceed_rate_limit());
    }

    #[test]
    fn ema_latency_smooths_across_samples() {
        let ep = Endpoint::new(
            "test", ProviderClass::Public, "https://example.com", 1, 100, 1000, 3, Duration::from_secs(60),
        );
        ep.record_success(Duration::from_millis(100));
        assert_eq!(ep.ema_latency_ms(), 100.0);
        ep.record_success(Duration::from_millis(200));
        assert!((ep.ema_latency_ms() - 120.0).abs() < 1e-6);
    }
}
