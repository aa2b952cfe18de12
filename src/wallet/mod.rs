//! Wallet / Signer (spec §4.3, component C3).
//!
//! Grounded on `run/config.rs`'s `PrivateKeySigner` usage, generalized
//! from a raw-private-key CLI flag to BIP-39 mnemonic derivation at
//! `m/44'/60'/0'/0/0` via `alloy::signers::local::MnemonicBuilder`. The
//! nine-step `execute()` gate chain (simulation, gas, fee cap, spend
//! limit, approval, broadcast, confirmation) is new logic directly off
//! the spec; each step's primitive (nonce, limits, approval, gas) lives
//! in its own submodule so `execute` itself reads as an ordered list.

pub mod approval;
pub mod gas;
pub mod limits;
pub mod nonce;

use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::{SignableTransaction, TxEip1559};
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSigner;
use alloy::signers::Signer;
use rust_decimal::Decimal;
use serde_json::json;

use crate::audit::{AuditEvent, AuditSink, Severity};
use crate::error::{MammonError, Result};
use crate::oracle::PriceOracle;
use crate::transport::Transport;
use approval::{wait_for_approval, ApprovalRegistry, ApprovalStatus};
use gas::{buffered_gas_limit, compute_fees, enforce_cap};
use limits::SpendingLimits;
use nonce::NonceTracker;

/// An unsigned call the wallet is asked to carry out. `token_symbol` is
/// used only to convert `value_usd_hint`/native value to USD for the
/// spending and approval checks — it is not part of the wire format.
#[derive(Debug, Clone)]
pub struct TransactionCall {
    pub to: Address,
    pub value: U256,
    pub calldata: Bytes,
    pub token_symbol: String,
    pub token_decimals: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    pub wait_for_confirmation: bool,
    pub confirmations: u64,
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub tx_hash: String,
    pub confirmed: bool,
    pub block_number: Option<u64>,
}

struct SignedTx {
    raw: Bytes,
    nonce: u64,
    tx_hash: String,
}

pub struct Wallet {
    signer: PrivateKeySigner,
    address: Address,
    network: String,
    chain_id: u64,
    nonce: NonceTracker,
    pub limits: SpendingLimits,
    pub approvals: ApprovalRegistry,
    transport: Arc<Transport>,
    oracle: Arc<PriceOracle>,
    sink: Arc<dyn AuditSink>,
    max_gas_price_gwei: Decimal,
    max_priority_fee_gwei: Decimal,
    dry_run_mode: bool,
    approval_timeout: Duration,
    confirmation_timeout: Duration,
}

impl Wallet {
    /// Derives a signer from a BIP-39 mnemonic at `m/44'/60'/0'/0/0`
    /// and pulls the chain's `pending` nonce to seed the tracker.
    pub async fn new(
        mnemonic: &str,
        network: &str,
        chain_id: u64,
        limits: SpendingLimits,
        max_gas_price_gwei: Decimal,
        max_priority_fee_gwei: Decimal,
        dry_run_mode: bool,
        transport: Arc<Transport>,
        oracle: Arc<PriceOracle>,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(mnemonic)
            .derivation_path("m/44'/60'/0'/0/0")
            .map_err(|e| MammonError::Config(format!("invalid derivation path: {e}")))?
            .build()
            .map_err(|e| MammonError::Config(format!("invalid mnemonic: {e}")))?;
        let address = signer.address();

        let pending_nonce = fetch_nonce(&transport, network, address).await?;

        Ok(Wallet {
            signer,
            address,
            network: network.to_string(),
            chain_id,
            nonce: NonceTracker::new(pending_nonce),
            limits,
            approvals: ApprovalRegistry::new(),
            transport,
            oracle,
            sink,
            max_gas_price_gwei,
            max_priority_fee_gwei,
            dry_run_mode,
            approval_timeout: Duration::from_secs(3600),
            confirmation_timeout: Duration::from_secs(300),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn balance(&self, token: &str) -> Result<Decimal> {
        if token.eq_ignore_ascii_case("native") {
            let result = self
                .transport
                .call(&self.network, "eth_getBalance", json!([format!("{:#x}", self.address), "latest"]))
                .await?;
            let wei = parse_hex_u256(&result)?;
            return Ok(crate::money::from_token_units(wei, 18));
        }
        let decimals = crate::chain::token_decimals(token);
        let address = crate::chain::token_address(self.chain_id, token)
            .ok_or_else(|| MammonError::Config(format!("unknown token '{token}' on chain {}", self.chain_id)))?;
        let selector = "0x70a08231"; // balanceOf(address)
        let calldata = format!("{selector}{:0>64}", hex::encode(self.address.as_slice()));
        let call_obj = json!([{ "to": format!("{address:#x}"), "data": calldata }, "latest"]);
        let result = self.transport.call(&self.network, "eth_call", call_obj).await?;
        let units = parse_hex_u256(&result)?;
        Ok(crate::money::from_token_units(units, decimals))
    }

    pub async fn estimate_gas(&self, call: &TransactionCall) -> Result<u64> {
        let params = json!([{
            "from": format!("{:#x}", self.address),
            "to": format!("{:#x}", call.to),
            "value": format!("{:#x}", call.value),
            "data": format!("0x{}", hex::encode(&call.calldata)),
        }]);
        let result = self.transport.call(&self.network, "eth_estimateGas", params).await?;
        let raw = parse_hex_u256(&result)?;
        Ok(raw.try_into().unwrap_or(u64::MAX))
    }

    /// Builds and signs `call` right now, assigning the next nonce
    /// immediately — unlike `execute()`, nothing here waits on the
    /// spending or approval gates, so this is only for callers that
    /// need a signed-but-unbroadcast transaction outside the full
    /// execution contract (e.g. relaying through a separate broadcaster).
    pub async fn sign(&self, call: &TransactionCall) -> Result<Bytes> {
        let raw_estimate = self.estimate_gas(call).await?;
        let gas_limit = buffered_gas_limit(raw_estimate, call.calldata.len());
        let base_fee_gwei = self.current_base_fee_gwei().await?;
        let fees = compute_fees(base_fee_gwei, self.max_priority_fee_gwei);
        if let Some((current, cap)) = enforce_cap(&fees, self.max_gas_price_gwei) {
            return Err(MammonError::GasPriceCapExceeded { current_gwei: current, cap_gwei: cap });
        }
        let assigned_nonce = self.nonce.next();
        Ok(self.build_and_sign(call, assigned_nonce, gas_limit, &fees).await?.raw)
    }

    async fn build_and_sign(
        &self,
        call: &TransactionCall,
        nonce: u64,
        gas_limit: u64,
        fees: &gas::Eip1559Fees,
    ) -> Result<SignedTx> {
        let tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: crate::money::gwei_to_wei(fees.max_fee_gwei).try_into().unwrap_or(u128::MAX),
            max_priority_fee_per_gas: crate::money::gwei_to_wei(fees.max_priority_fee_gwei)
                .try_into()
                .unwrap_or(u128::MAX),
            to: TxKind::Call(call.to),
            value: call.value,
            input: call.calldata.clone(),
            access_list: Default::default(),
        };
        let signature = self
            .signer
            .sign_transaction(&mut tx.clone())
            .await
            .map_err(|e| MammonError::Config(format!("signing failed: {e}")))?;
        let signed = tx.into_signed(signature);
        let tx_hash = format!("{:#x}", signed.hash());
        let raw = Bytes::from(signed.encoded_2718());
        Ok(SignedTx { raw, nonce, tx_hash })
    }

    /// The nine-step execution contract from spec §4.3. Every rejection
    /// path returns before any state mutation below it in the list.
    pub async fn execute(&self, call: TransactionCall, options: ExecuteOptions) -> Result<Receipt> {
        // Step 1: dry-run gate.
        if self.dry_run_mode {
            return Err(MammonError::DryRunBlocked);
        }

        // Step 2: convert value to USD via the oracle.
        let token_amount = crate::money::from_token_units(call.value, call.token_decimals);
        let price = self.oracle.get_price(&call.token_symbol).await?;
        let value_usd = crate::money::token_to_usd(token_amount, price);

        // Step 3: pre-flight simulation.
        self.simulate(&call).await?;

        // Step 4: tiered gas estimation.
        let raw_estimate = self.estimate_gas(&call).await?;
        let gas_limit = buffered_gas_limit(raw_estimate, call.calldata.len());

        // Step 5: EIP-1559 fees, capped.
        let base_fee_gwei = self.current_base_fee_gwei().await?;
        let fees = compute_fees(base_fee_gwei, self.max_priority_fee_gwei);
        if let Some((current, cap)) = enforce_cap(&fees, self.max_gas_price_gwei) {
            return Err(MammonError::GasPriceCapExceeded { current_gwei: current, cap_gwei: cap });
        }

        // Step 6: atomic spending check + record (critical section).
        self.limits
            .atomic_check_and_record(value_usd)
            .map_err(|scope| MammonError::SpendingLimitExceeded { scope })?;

        // Step 7: approval gate.
        if self.limits.requires_approval(value_usd) {
            let (request, receiver) = self.approvals.raise(
                value_usd,
                "rebalance_transaction",
                format!("send {value_usd} USD to {:#x}", call.to),
                self.approval_timeout,
            );
            self.sink.record(AuditEvent::new(
                "approval_requested",
                Severity::Warning,
                "wallet",
                format!("approval requested for {value_usd} USD"),
                json!({ "approval_id": request.id.to_string(), "amount_usd": value_usd.to_string() }),
            ));
            let status = wait_for_approval(&self.approvals, request.id, receiver, self.approval_timeout).await;
            self.approvals.remove(request.id);
            match status {
                ApprovalStatus::Approved => {
                    self.sink.record(AuditEvent::new(
                        "approval_approved",
                        Severity::Info,
                        "wallet",
                        "approval granted",
                        json!({ "approval_id": request.id.to_string() }),
                    ));
                }
                other => {
                    let kind = if other == ApprovalStatus::Expired { "approval_expired" } else { "approval_rejected" };
                    self.sink.record(AuditEvent::new(
                        kind,
                        Severity::Warning,
                        "wallet",
                        format!("approval ended in {other:?}"),
                        json!({ "approval_id": request.id.to_string() }),
                    ));
                    return Err(MammonError::ApprovalDenied { status: other });
                }
            }
        }

        // Step 8: assign nonce, sign, broadcast.
        let signed = self.build_and_sign(&call, self.nonce.next(), gas_limit, &fees).await?;
        let SignedTx { raw, nonce: assigned_nonce, tx_hash } = signed;

        self.sink.record(AuditEvent::new(
            "transaction_signed",
            Severity::Info,
            "wallet",
            format!("signed tx {tx_hash}"),
            json!({ "nonce": assigned_nonce, "to": format!("{:#x}", call.to) }),
        ));

        let broadcast_result = self
            .transport
            .call(&self.network, "eth_sendRawTransaction", json!([format!("0x{}", hex::encode(&raw))]))
            .await;
        let tx_hash = match broadcast_result {
            Ok(value) => value.as_str().map(|s| s.to_string()).unwrap_or(tx_hash),
            Err(e) => {
                self.sink.record(AuditEvent::new(
                    "transaction_failed",
                    Severity::Critical,
                    "wallet",
                    format!("broadcast failed: {e}"),
                    json!({ "nonce": assigned_nonce }),
                ));
                return Err(e);
            }
        };
        self.sink.record(AuditEvent::new(
            "transaction_executed",
            Severity::Info,
            "wallet",
            format!("broadcast {tx_hash}"),
            json!({ "nonce": assigned_nonce }),
        ));

        // Step 9: optional confirmation wait.
        if options.wait_for_confirmation {
            self.wait_for_confirmation(&tx_hash, options.confirmations).await
        } else {
            Ok(Receipt { tx_hash, confirmed: false, block_number: None })
        }
    }

    async fn simulate(&self, call: &TransactionCall) -> Result<()> {
        let params = json!([{
            "from": format!("{:#x}", self.address),
            "to": format!("{:#x}", call.to),
            "value": format!("{:#x}", call.value),
            "data": format!("0x{}", hex::encode(&call.calldata)),
        }, "pending"]);
        let result = self.transport.call(&self.network, "eth_call", params).await?;
        if let Some(reason) = result.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str()) {
            return Err(MammonError::Revert { reason: reason.to_string() });
        }
        Ok(())
    }

    async fn current_base_fee_gwei(&self) -> Result<Decimal> {
        let block = self
            .transport
            .call(&self.network, "eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let base_fee_wei = block
            .get("baseFeePerGas")
            .and_then(|v| v.as_str())
            .and_then(|s| U256::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .unwrap_or(U256::from(1_000_000_000u64)); // 1 gwei fallback
        Ok(crate::money::wei_to_gwei(base_fee_wei))
    }

    async fn wait_for_confirmation(&self, tx_hash: &str, confirmations: u64) -> Result<Receipt> {
        let deadline = tokio::time::Instant::now() + self.confirmation_timeout;
        loop {
            let receipt = self
                .transport
                .call(&self.network, "eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !receipt.is_null() {
                if let Some(block_hex) = receipt.get("blockNumber").and_then(|v| v.as_str()) {
                    let block_number = u64::from_str_radix(block_hex.trim_start_matches("0x"), 16).ok();
                    let latest = self.latest_block_number().await.unwrap_or(block_number.unwrap_or(0));
                    if let Some(mined_at) = block_number {
                        if latest.saturating_sub(mined_at) + 1 >= confirmations {
                            return Ok(Receipt { tx_hash: tx_hash.to_string(), confirmed: true, block_number });
                        }
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Receipt { tx_hash: tx_hash.to_string(), confirmed: false, block_number: None });
            }
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
    }

    async fn latest_block_number(&self) -> Result<u64> {
        let result = self.transport.call(&self.network, "eth_blockNumber", json!([])).await?;
        Ok(parse_hex_u256(&result)?.try_into().unwrap_or(0))
    }
}

async fn fetch_nonce(transport: &Transport, network: &str, address: Address) -> Result<u64> {
    let result = transport
        .call(network, "eth_getTransactionCount", json!([format!("{address:#x}"), "pending"]))
        .await?;
    Ok(parse_hex_u256(&result)?.try_into().unwrap_or(0))
}

fn parse_hex_u256(value: &serde_json::Value) -> Result<U256> {
    let s = value
        .as_str()
        .ok_or_else(|| MammonError::Transport("expected hex string result".into()))?;
    U256::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| MammonError::Transport(format!("malformed hex result '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_encode_round_trips_address_bytes() {
        let bytes = [0xde, 0xad, 0xbe, 0xef];
        assert_eq!(hex::encode(bytes), "deadbeef");
    }
}
