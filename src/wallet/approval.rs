//! Approval gate (spec §3 `ApprovalRequest`, §4.3 step 7).
//!
//! Replaces a polling loop with a one-shot `tokio::sync::oneshot`
//! channel: `wait_for_approval` suspends on the receiver instead of
//! checking status every N ms, and a timeout races it via `tokio::select!`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub amount_usd: Decimal,
    pub kind: String,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ApprovalStatus,
}

/// Resolves a pending request to a terminal status, waking anyone
/// blocked in `wait_for_approval`. Kept out of `ApprovalRequest` itself
/// since the sender is consumed on first use.
struct Pending {
    request: ApprovalRequest,
    resolver: Option<oneshot::Sender<ApprovalStatus>>,
}

/// Process-wide singleton tracking in-flight approval requests (spec §5:
/// "approval registry" is one of the shared-state singletons).
#[derive(Default)]
pub struct ApprovalRegistry {
    pending: parking_lot::Mutex<HashMap<Uuid, Pending>>,
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        ApprovalRegistry { pending: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Raise a request and return both the request (for the audit log)
    /// and a receiver to await its terminal status.
    pub fn raise(
        &self,
        amount_usd: Decimal,
        kind: impl Into<String>,
        rationale: impl Into<String>,
        timeout: Duration,
    ) -> (ApprovalRequest, oneshot::Receiver<ApprovalStatus>) {
        let now = Utc::now();
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            amount_usd,
            kind: kind.into(),
            rationale: rationale.into(),
            created_at: now,
            expires_at: now + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::hours(1)),
            status: ApprovalStatus::Pending,
        };
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            request.id,
            Pending { request: request.clone(), resolver: Some(tx) },
        );
        (request, rx)
    }

    /// Operator approves a pending request. No-op if already terminal.
    pub fn approve(&self, id: Uuid) -> bool {
        self.resolve(id, ApprovalStatus::Approved)
    }

    pub fn reject(&self, id: Uuid) -> bool {
        self.resolve(id, ApprovalStatus::Rejected)
    }

    fn resolve(&self, id: Uuid, status: ApprovalStatus) -> bool {
        let mut pending = self.pending.lock();
        if let Some(entry) = pending.get_mut(&id) {
            if entry.request.status != ApprovalStatus::Pending {
                return false;
            }
            entry.request.status = status;
            if let Some(resolver) = entry.resolver.take() {
                let _ = resolver.send(status);
            }
            return true;
        }
        false
    }

    pub fn get(&self, id: Uuid) -> Option<ApprovalRequest> {
        self.pending.lock().get(&id).map(|p| p.request.clone())
    }

    /// An ApprovalRequest is "destroyed after terminal status" per the
    /// spec's lifecycle note — callers remove it once `wait_for_approval`
    /// returns so the registry doesn't grow unbounded.
    pub fn remove(&self, id: Uuid) {
        self.pending.lock().remove(&id);
    }
}

/// Await a request's terminal status, racing the expiry timeout. On
/// timeout the request is marked `Expired` in the registry so a later
/// `get` reflects it even though this call already returned.
pub async fn wait_for_approval(
    registry: &ApprovalRegistry,
    id: Uuid,
    receiver: oneshot::Receiver<ApprovalStatus>,
    timeout: Duration,
) -> ApprovalStatus {
    match tokio::time::timeout(timeout, receiver).await {
        Ok(Ok(status)) => status,
        Ok(Err(_)) => ApprovalStatus::Rejected, // sender dropped without resolving
        Err(_) => {
            registry.resolve(id, ApprovalStatus::Expired);
            ApprovalStatus::Expired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn approve_resolves_waiter() {
        let registry = ApprovalRegistry::new();
        let (request, rx) = registry.raise(dec!(5000), "rebalance", "moving to higher APY", Duration::from_secs(3600));
        let id = request.id;
        // A oneshot channel buffers its single value, so resolving before
        // the receiver is awaited still delivers it.
        assert!(registry.approve(id));
        let status = wait_for_approval(&registry, id, rx, Duration::from_secs(3600)).await;
        assert_eq!(status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn expiry_marks_request_expired() {
        let registry = ApprovalRegistry::new();
        let (request, rx) = registry.raise(dec!(5000), "rebalance", "test", Duration::from_millis(10));
        let id = request.id;
        let status = wait_for_approval(&registry, id, rx, Duration::from_millis(10)).await;
        assert_eq!(status, ApprovalStatus::Expired);
        assert_eq!(registry.get(id).unwrap().status, ApprovalStatus::Expired);
    }

    #[test]
    fn double_resolve_is_noop() {
        let registry = ApprovalRegistry::new();
        let (request, _rx) = registry.raise(dec!(100), "test", "test", Duration::from_secs(60));
        assert!(registry.approve(request.id));
        assert!(!registry.reject(request.id));
        assert_eq!(registry.get(request.id).unwrap().status, ApprovalStatus::Approved);
    }
}
