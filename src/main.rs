//! CLI entry point: wires config → transport → oracle → wallet →
//! venue adapters → scheduler, then runs the tick loop until a
//! `ctrlc`-delivered interrupt requests a clean shutdown.
//!
//! Grounded on the teacher's `main.rs` clap dispatch, collapsed from a
//! multi-subcommand workflow tool to the single `run`/`dry-run` split
//! this agent needs — an operator either runs it for real or in
//! `--dry-run` to see what it *would* do without broadcasting.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mammon_core::audit::FileAuditSink;
use mammon_core::chain::NetworkConfig;
use mammon_core::config::MammonConfig;
use mammon_core::oracle::PriceOracle;
use mammon_core::persistence::Store;
use mammon_core::scheduler::Scheduler;
use mammon_core::transport::endpoint::{Endpoint, ProviderClass};
use mammon_core::transport::{Transport, TransportConfig};
use mammon_core::venues::amm::{AmmAdapter, AmmPool};
use mammon_core::venues::lending::{LendingAdapter, LendingPool};
use mammon_core::venues::Adapter;
use mammon_core::wallet::{limits::SpendingLimits, Wallet};

#[derive(Parser)]
#[command(name = "mammon-core", version, about = "Autonomous DeFi yield-optimization agent")]
struct Cli {
    /// Run a single tick and exit instead of looping forever.
    #[arg(long)]
    once: bool,

    /// Directory for the JSON-lines position/decision store.
    #[arg(long, default_value = "mammon-data")]
    data_dir: std::path::PathBuf,

    /// Path the audit log is appended to.
    #[arg(long, default_value = "mammon-audit.jsonl")]
    audit_log: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = MammonConfig::from_env()?;
    let network = NetworkConfig::lookup(&config.network)
        .ok_or_else(|| anyhow::anyhow!("unknown network '{}'", config.network))?
        .clone();

    let sink: Arc<dyn mammon_core::audit::AuditSink> = Arc::new(FileAuditSink::new(cli.audit_log));

    let mut transport = Transport::new(
        TransportConfig {
            premium_rpc_enabled: config.premium_rpc_enabled,
            premium_rpc_percentage: config.premium_rpc_percentage,
            request_timeout: Duration::from_secs(10),
            rollout_seed: None,
        },
        sink.clone(),
    );

    if let (true, Some(key)) = (config.premium_rpc_enabled, config.alchemy_api_key.as_ref()) {
        transport.add_endpoint(
            &network.id,
            Endpoint::new(
                "alchemy",
                ProviderClass::Premium,
                format!("https://base-mainnet.g.alchemy.com/v2/{key}"),
                0,
                config.alchemy_rate_limit_per_second,
                config.alchemy_rate_limit_per_second * 60,
                config.rpc_failure_threshold,
                Duration::from_secs(config.rpc_recovery_timeout_secs),
            ),
        );
    }
    if let (true, Some(url)) = (config.premium_rpc_enabled, config.quicknode_endpoint.as_ref()) {
        transport.add_endpoint(
            &network.id,
            Endpoint::new(
                "quicknode",
                ProviderClass::Backup,
                url.clone(),
                50,
                config.quicknode_rate_limit_per_second,
                config.quicknode_rate_limit_per_second * 60,
                config.rpc_failure_threshold,
                Duration::from_secs(config.rpc_recovery_timeout_secs),
            ),
        );
    }
    transport.add_endpoint(
        &network.id,
        Endpoint::new(
            "public",
            ProviderClass::Public,
            config.rpc_url.clone().unwrap_or_else(|| network.default_rpc_url.clone()),
            100,
            config.public_rate_limit_per_second,
            config.public_rate_limit_per_second * 60,
            config.rpc_failure_threshold,
            Duration::from_secs(config.rpc_recovery_timeout_secs),
        ),
    );
    let transport = Arc::new(transport);

    let oracle = Arc::new(PriceOracle::new(
        transport.clone(),
        config.chainlink_price_network.clone(),
        Duration::from_secs(config.chainlink_max_staleness_seconds),
        Duration::from_secs(config.chainlink_cache_ttl_seconds),
        config.chainlink_fallback_to_mock,
        sink.clone(),
    ));

    let limits = SpendingLimits::new(
        config.max_transaction_value_usd,
        config.daily_spending_limit_usd,
        config.approval_threshold_usd,
        config.max_gas_price_gwei,
    );

    let wallet = Arc::new(
        Wallet::new(
            &config.wallet_mnemonic,
            &network.id,
            network.chain_id,
            limits,
            config.max_gas_price_gwei,
            config.max_priority_fee_gwei,
            config.dry_run_mode,
            transport.clone(),
            oracle.clone(),
            sink.clone(),
        )
        .await?,
    );

    let adapters = build_adapters(&network, transport.clone(), oracle.clone());
    let store = Arc::new(Store::load_or_new(&cli.data_dir)?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    let mut scheduler = Scheduler::new(config.clone(), adapters, wallet, oracle, store, sink, shutdown_rx);

    if cli.once {
        let summary = scheduler.tick().await?;
        tracing::info!(
            opportunities = summary.opportunities_found,
            executed = summary.rebalances_executed,
            "single tick complete"
        );
    } else {
        scheduler.run().await;
    }

    Ok(())
}

/// Base-mainnet Aave v3 pool and Aerodrome router addresses — the only
/// two venues this build ships adapters for.
fn build_adapters(
    network: &NetworkConfig,
    transport: Arc<Transport>,
    oracle: Arc<PriceOracle>,
) -> Vec<Arc<Adapter>> {
    use alloy::primitives::address;

    let mut adapters = Vec::new();

    if let Some(usdc) = mammon_core::chain::token_address(network.chain_id, "USDC") {
        let aave = LendingAdapter::new(
            "aave",
            address!("A238Dd80C259a72e81d7e4664a9801593F98d1c5"),
            network.id.clone(),
            vec![LendingPool { pool_id: "usdc".into(), asset_symbol: "USDC".into(), asset_address: usdc }],
            transport.clone(),
            oracle.clone(),
        );
        adapters.push(Arc::new(Adapter::Lending(aave)));
    }

    if let (Some(weth), Some(usdc)) = (
        mammon_core::chain::token_address(network.chain_id, "WETH"),
        mammon_core::chain::token_address(network.chain_id, "USDC"),
    ) {
        let aerodrome = AmmAdapter::new(
            "aerodrome",
            address!("cF77a3Ba9A5CA399B7c97c74d54e5b1Beb874E43"),
            network.id.clone(),
            vec![AmmPool {
                pool_id: "weth-usdc".into(),
                pair_address: address!("cDAC0d6c6C59727a65F871236188350531885C43"),
                token0_symbol: "WETH".into(),
                token1_symbol: "USDC".into(),
                token0_address: weth,
                token1_address: usdc,
                stable: false,
            }],
            transport,
            oracle,
        );
        adapters.push(Arc::new(Adapter::Amm(aerodrome)));
    }

    adapters
}
