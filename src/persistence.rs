//! Persistence (spec §3/§6, SPEC_FULL §B).
//!
//! A small embedded JSON-lines store, in the spirit of `run/state.rs`'s
//! `RunState::load_or_new`/`save` file-backed persistence — one file
//! per record kind (positions, decisions, pending transactions)
//! instead of a single overwrite-in-place blob, since positions and
//! decisions are append/replace streams rather than one counter.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::model::{Position, RebalanceRecommendation};

/// One recorded decision: the recommendation plus whether it was
/// executed, for audit/replay after the fact.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionRecord {
    pub recommendation_summary: String,
    pub destination_protocol: String,
    pub destination_pool: String,
    pub amount_usd: rust_decimal::Decimal,
    pub executed: bool,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl DecisionRecord {
    pub fn from_recommendation(rec: &RebalanceRecommendation, executed: bool) -> Self {
        DecisionRecord {
            recommendation_summary: rec.reason.clone(),
            destination_protocol: rec.destination_protocol.clone(),
            destination_pool: rec.destination_pool.clone(),
            amount_usd: rec.amount_usd,
            executed,
            recorded_at: chrono::Utc::now(),
        }
    }
}

pub struct Store {
    dir: PathBuf,
    positions: Mutex<HashMap<(String, String, String), Position>>,
}

impl Store {
    /// Opens (creating if absent) the JSON-lines store rooted at `dir`.
    /// Positions are loaded eagerly since callers need the current set
    /// on every tick; decisions and pending transactions are append-only
    /// and read back only on demand.
    pub fn load_or_new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("creating persistence dir {}", dir.display()))?;

        let mut positions = HashMap::new();
        for position in read_lines::<Position>(&dir.join("positions.jsonl"))? {
            positions.insert(position.key(), position);
        }

        Ok(Store { dir, positions: Mutex::new(positions) })
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.lock().values().cloned().collect()
    }

    pub fn active_positions(&self) -> Vec<Position> {
        self.positions
            .lock()
            .values()
            .filter(|p| p.status == crate::model::PositionStatus::Active)
            .cloned()
            .collect()
    }

    /// Upserts a position by its `(wallet, protocol, pool)` key and
    /// rewrites the positions file — at most a few dozen active
    /// positions, so a full rewrite per change is simpler than a log +
    /// compaction scheme and still cheap.
    pub fn upsert_position(&self, position: Position) -> Result<()> {
        let mut guard = self.positions.lock();
        guard.insert(position.key(), position);
        write_all(&self.dir.join("positions.jsonl"), guard.values())
    }

    pub fn remove_position(&self, key: &(String, String, String)) -> Result<()> {
        let mut guard = self.positions.lock();
        guard.remove(key);
        write_all(&self.dir.join("positions.jsonl"), guard.values())
    }

    pub fn record_decision(&self, record: &DecisionRecord) -> Result<()> {
        append_line(&self.dir.join("decisions.jsonl"), record)
    }

    pub fn decisions(&self) -> Result<Vec<DecisionRecord>> {
        read_lines(&self.dir.join("decisions.jsonl"))
    }

    /// Tracks a pending transaction hash between broadcast and
    /// confirmation, so a crash mid-pipeline can be reconciled on
    /// restart instead of silently forgotten.
    pub fn record_pending_tx(&self, tx_hash: &str, context: &str) -> Result<()> {
        append_line(&self.dir.join("pending_tx.jsonl"), &PendingTx {
            tx_hash: tx_hash.to_string(),
            context: context.to_string(),
            recorded_at: chrono::Utc::now(),
        })
    }

    pub fn pending_tx(&self) -> Result<Vec<PendingTx>> {
        read_lines(&self.dir.join("pending_tx.jsonl"))
    }
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct PendingTx {
    pub tx_hash: String,
    pub context: String,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line).with_context(|| format!("parsing line in {}", path.display()))?);
    }
    Ok(out)
}

fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {} for append", path.display()))?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn write_all<'a, T: Serialize + 'a>(path: &Path, records: impl Iterator<Item = &'a T>) -> Result<()> {
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    fs::write(path, buf).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_position(pool: &str) -> Position {
        Position {
            wallet_address: "0xabc".into(),
            protocol_id: "aave".into(),
            pool_id: pool.into(),
            token: "USDC".into(),
            amount: dec!(1000),
            usd_value_snapshot: dec!(1000),
            entry_apy: dec!(5),
            current_apy: dec!(5),
            opened_at: Utc::now(),
            closed_at: None,
            status: crate::model::PositionStatus::Active,
        }
    }

    #[test]
    fn upsert_and_reload_round_trips_positions() {
        let dir = std::env::temp_dir().join(format!("mammon-test-{}", uuid::Uuid::new_v4()));
        let store = Store::load_or_new(&dir).unwrap();
        store.upsert_position(sample_position("usdc-pool")).unwrap();

        let reopened = Store::load_or_new(&dir).unwrap();
        assert_eq!(reopened.positions().len(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn remove_position_drops_it_from_store() {
        let dir = std::env::temp_dir().join(format!("mammon-test-{}", uuid::Uuid::new_v4()));
        let store = Store::load_or_new(&dir).unwrap();
        let position = sample_position("usdc-pool");
        let key = position.key();
        store.upsert_position(position).unwrap();
        store.remove_position(&key).unwrap();
        assert!(store.positions().is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn decisions_append_without_losing_prior_records() {
        let dir = std::env::temp_dir().join(format!("mammon-test-{}", uuid::Uuid::new_v4()));
        let store = Store::load_or_new(&dir).unwrap();
        for i in 0..3 {
            store
                .record_decision(&DecisionRecord {
                    recommendation_summary: format!("move {i}"),
                    destination_protocol: "aave".into(),
                    destination_pool: "usdc-pool".into(),
                    amount_usd: dec!(100),
                    executed: true,
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }
        assert_eq!(store.decisions().unwrap().len(), 3);
        fs::remove_dir_all(&dir).ok();
    }
}
