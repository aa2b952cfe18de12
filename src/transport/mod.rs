//! RPC Transport (spec §4.1, component C1).
//!
//! Pool of endpoints with health, rate limits, circuit breaking,
//! gradual-rollout routing, and URL redaction. Grounded on the
//! teacher's `ProviderBuilder::new().connect_http(url)` idiom in
//! `venues/evm.rs`, generalized from "one provider per call" to a
//! pool with failover — the JSON-RPC envelope is hand-rolled with
//! `reqwest` + `serde_json::Value` rather than going through `alloy`'s
//! provider abstraction, since the pool needs to own retry/failover
//! *below* the provider layer.

pub mod breaker;
pub mod endpoint;
pub mod usage;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;

use crate::audit::{AuditEvent, AuditSink, Severity};
use crate::error::{MammonError, Result};

pub use endpoint::{Endpoint, ProviderClass};
pub use usage::{ProviderUsage, UsageTracker};

pub struct TransportConfig {
    pub premium_rpc_enabled: bool,
    pub premium_rpc_percentage: u8,
    pub request_timeout: Duration,
    /// Seed for the rollout draw — the *only* source of non-determinism
    /// in endpoint selection (spec §4.1 step 1). Tests pin this.
    pub rollout_seed: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            premium_rpc_enabled: false,
            premium_rpc_percentage: 50,
            request_timeout: Duration::from_secs(10),
            rollout_seed: None,
        }
    }
}

pub struct Transport {
    http: reqwest::Client,
    endpoints_by_network: HashMap<String, Vec<Arc<Endpoint>>>,
    config: TransportConfig,
    usage: UsageTracker,
    sink: Arc<dyn AuditSink>,
    rng: parking_lot::Mutex<rand::rngs::StdRng>,
    request_id: std::sync::atomic::AtomicU64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EndpointHealth {
    pub id: String,
    pub provider: String,
    pub healthy: bool,
    pub circuit_state: &'static str,
    pub ema_latency_ms: f64,
    pub consecutive_failures: u32,
}

impl Transport {
    pub fn new(config: TransportConfig, sink: Arc<dyn AuditSink>) -> Self {
        use rand::SeedableRng;
        let rng = match config.rollout_seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_os_rng(),
        };
        Transport {
            http: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .expect("reqwest client"),
            endpoints_by_network: HashMap::new(),
            config,
            usage: UsageTracker::new(),
            sink,
            rng: parking_lot::Mutex::new(rng),
            request_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Register an endpoint for a network. Endpoints are kept sorted
    /// by ascending priority (lower = preferred) as they're added.
    pub fn add_endpoint(&mut self, network: &str, endpoint: Endpoint) {
        let list = self.endpoints_by_network.entry(network.to_string()).or_default();
        list.push(Arc::new(endpoint));
        list.sort_by_key(|e| e.priority);
    }

    pub fn usage_summary(&self) -> Vec<ProviderUsage> {
        self.usage.summary()
    }

    pub fn health(&self) -> Vec<EndpointHealth> {
        self.endpoints_by_network
            .values()
            .flatten()
            .map(|e| EndpointHealth {
                id: e.id.clone(),
                provider: format!("{:?}", e.provider_class),
                healthy: e.is_healthy() && !e.is_circuit_open(),
                circuit_state: match e.breaker.lock().state() {
                    breaker::BreakerState::Closed => "closed",
                    breaker::BreakerState::Open => "open",
                    breaker::BreakerState::HalfOpen => "half_open",
                },
                ema_latency_ms: e.ema_latency_ms(),
                consecutive_failures: e.consecutive_failures(),
            })
            .collect()
    }

    /// Execute a JSON-RPC call against the endpoint pool for `network`,
    /// following spec §4.1 steps 1–4.
    pub async fn call(&self, network: &str, method: &str, params: Value) -> Result<Value> {
        let endpoints = self
            .endpoints_by_network
            .get(network)
            .ok_or_else(|| MammonError::Transport(format!("no endpoints configured for network '{network}'")))?;

        let premium_in_play = self.config.premium_rpc_enabled
            && self.rng.lock().random_range(0..100) < self.config.premium_rpc_percentage;

        let candidates: Vec<&Arc<Endpoint>> = endpoints
            .iter()
            .filter(|e| {
                if e.provider_class == ProviderClass::Premium && !premium_in_play {
                    return false;
                }
                !e.is_circuit_open() && !e.would_exceed_rate_limit() && e.is_healthy()
            })
            .collect();

        for endpoint in &candidates {
            match self.attempt(endpoint, method, &params).await {
                Ok(value) => return Ok(value),
                Err(_) => continue,
            }
        }

        // Fallback: try the public endpoint regardless of rollout gating,
        // even if it was filtered out above for being the premium-skip case
        // (it never is, since Public is never gated by premium_in_play) —
        // this covers the case where public was excluded for rate/circuit
        // reasons the first time but the candidate list was otherwise empty.
        if let Some(public) = endpoints.iter().find(|e| e.provider_class == ProviderClass::Public) {
            if !candidates.iter().any(|c| Arc::ptr_eq(c, public)) {
                if let Ok(value) = self.attempt(public, method, &params).await {
                    return Ok(value);
                }
            }
        }

        self.sink.record(AuditEvent::new(
            "rpc_endpoint_failure",
            Severity::Critical,
            "transport",
            format!("all endpoints exhausted for network '{network}' method '{method}'"),
            serde_json::json!({ "network": network, "method": method }),
        ));
        Err(MammonError::Transport(format!(
            "all endpoints exhausted for network '{network}' method '{method}'"
        )))
    }

    async fn attempt(&self, endpoint: &Arc<Endpoint>, method: &str, params: &Value) -> Result<Value> {
        endpoint.record_attempt();
        let mut breaker = endpoint.breaker.lock();
        if !breaker.permits_call() {
            return Err(MammonError::CircuitOpen { endpoint: endpoint.sanitized_url().to_string() });
        }
        drop(breaker);

        let id = self.request_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let provider = format!("{:?}", endpoint.provider_class).to_lowercase();
        let started = Instant::now();
        let response = self.http.post(endpoint.raw_url()).json(&body).send().await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let parsed: std::result::Result<Value, _> = resp.json().await;
                match parsed {
                    Ok(json) if json.get("error").is_some() => {
                        // A JSON-RPC-level error (e.g. a revert) is not a
                        // transport failure — it's handed back unchanged.
                        endpoint.record_success(started.elapsed());
                        self.usage.record_request(&provider, false);
                        Ok(json)
                    }
                    Ok(json) => {
                        endpoint.record_success(started.elapsed());
                        self.usage.record_request(&provider, false);
                        self.sink.record(AuditEvent::new(
                            "rpc_request",
                            Severity::Info,
                            "transport",
                            format!("{method} via {}", endpoint.sanitized_url()),
                            serde_json::json!({ "network_endpoint": endpoint.sanitized_url(), "method": method }),
                        ));
                        Ok(json.get("result").cloned().unwrap_or(json))
                    }
                    Err(e) => {
                        endpoint.record_failure();
                        self.usage.record_request(&provider, true);
                        Err(MammonError::Transport(format!("malformed JSON from {}: {e}", endpoint.sanitized_url())))
                    }
                }
            }
            Ok(resp) => {
                // 429/5xx are transient transport failures per spec §4.1.
                let status = resp.status();
                endpoint.record_failure();
                self.usage.record_request(&provider, true);
                if status.as_u16() == 429 {
                    Err(MammonError::RateLimited { endpoint: endpoint.sanitized_url().to_string() })
                } else {
                    Err(MammonError::Transport(format!("http {status} from {}", endpoint.sanitized_url())))
                }
            }
            Err(e) => {
                endpoint.record_failure();
                self.usage.record_request(&provider, true);
                let msg = if e.is_timeout() { "timeout".to_string() } else { e.to_string() };
                if endpoint.is_circuit_open() {
                    self.sink.record(AuditEvent::new(
                        "rpc_circuit_breaker_opened",
                        Severity::Warning,
                        "transport",
                        format!("circuit opened for {}", endpoint.sanitized_url()),
                        serde_json::json!({ "network_endpoint": endpoint.sanitized_url() }),
                    ));
                }
                Err(MammonError::Transport(format!("{msg} from {}", endpoint.sanitized_url())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sink() -> Arc<dyn AuditSink> {
        Arc::new(crate::audit::MemoryAuditSink::default())
    }

    #[test]
    fn endpoints_sorted_by_priority_on_insert() {
        let mut transport = Transport::new(TransportConfig::default(), sink());
        transport.add_endpoint(
            "base",
            Endpoint::new("backup", ProviderClass::Backup, "https://b.example.com", 2, 10, 100, 3, Duration::from_secs(60)),
        );
        transport.add_endpoint(
            "base",
            Endpoint::new("public", ProviderClass::Public, "https://p.example.com", 5, 10, 100, 3, Duration::from_secs(60)),
        );
        transport.add_endpoint(
            "base",
            Endpoint::new("premium", ProviderClass::Premium, "https://a.example.com", 1, 10, 100, 3, Duration::from_secs(60)),
        );
        let list = &transport.endpoints_by_network["base"];
        assert_eq!(list[0].id, "premium");
        assert_eq!(list[1].id, "backup");
        assert_eq!(list[2].id, "public");
    }

    #[tokio::test]
    async fn no_endpoints_for_network_is_transport_error() {
        let transport = Transport::new(TransportConfig::default(), sink());
        let result = transport.call("nonexistent", "eth_blockNumber", serde_json::json!([])).await;
        assert!(matches!(result, Err(MammonError::Transport(_))));
    }

    #[test]
    fn premium_rollout_is_seed_deterministic() {
        let mut cfg = TransportConfig::default();
        cfg.rollout_seed = Some(42);
        cfg.premium_rpc_enabled = true;
        cfg.premium_rpc_percentage = 50;
        let transport = Transport::new(cfg, sink());
        let draws: Vec<u32> = (0..5).map(|_| transport.rng.lock().random_range(0..100)).collect();

        let mut cfg2 = TransportConfig::default();
        cfg2.rollout_seed = Some(42);
        cfg2.premium_rpc_enabled = true;
        cfg2.premium_rpc_percentage = 50;
        let transport2 = Transport::new(cfg2, sink());
        let draws2: Vec<u32> = (0..5).map(|_| transport2.rng.lock().random_range(0..100)).collect();

        assert_eq!(draws, draws2);
    }
}
