//! Shielded Ops CLI
//!
//! ```text
//! shielded_ops [--env <env>] <command>
//!
//!   balances   refresh and print the settled balance snapshot
//!   transfer   refresh, run the private transfer, then POI reconciliation
//!   poi        refresh, then POI reconciliation only (always exits 0)
//! ```
//!
//! Configuration comes from `config/<env>.yaml`; secrets from the
//! environment (`.env` honored): MNEMONIC, ENCRYPTION_KEY, RPC_URL,
//! TARGET_0ZK_ADDRESS, CREATION_BLOCK.

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use shielded_ops::chain::{ChainProvider, JsonRpcProvider};
use shielded_ops::config::{AppConfig, ConfigError, Credentials};
use shielded_ops::engine::ShieldedEngine;
use shielded_ops::money::parse_units;
use shielded_ops::report::{format_reconciliation, format_run, format_snapshot};
use shielded_ops::workflow::RunStatus;
use shielded_ops::{Session, TransferRequest, WalletId};

// ============================================================
// ARGUMENTS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Balances,
    Transfer,
    Poi,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "balances" => Some(Command::Balances),
            "transfer" => Some(Command::Transfer),
            "poi" => Some(Command::Poi),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Command::Balances => "balances",
            Command::Transfer => "transfer",
            Command::Poi => "poi",
        }
    }
}

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// First positional argument that is not a flag value
fn get_command(args: &[String]) -> Option<String> {
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--env" || arg == "-e" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with('-') {
            return Some(arg.clone());
        }
    }
    None
}

fn usage() -> &'static str {
    "usage: shielded_ops [--env <env>] <balances|transfer|poi>"
}

// ============================================================
// COLLABORATORS
// ============================================================

#[cfg(feature = "sim-engine")]
fn build_engine(config: &AppConfig) -> Result<Arc<dyn ShieldedEngine>> {
    use shielded_ops::engine::FsArtifactStore;
    use shielded_ops::engine::sim::SimulatedEngine;

    warn!(
        artifacts_dir = %config.artifacts_dir,
        "No engine binding linked, using the simulated engine"
    );
    let artifacts = Arc::new(FsArtifactStore::new(&config.artifacts_dir));
    Ok(Arc::new(SimulatedEngine::new().with_artifacts(artifacts)))
}

#[cfg(not(feature = "sim-engine"))]
fn build_engine(_config: &AppConfig) -> Result<Arc<dyn ShieldedEngine>> {
    anyhow::bail!("no shielded engine available: rebuild with the `sim-engine` feature")
}

fn build_provider(config: &AppConfig, credentials: &Credentials) -> Result<Arc<dyn ChainProvider>> {
    if let Some(rpc) = &config.rpc {
        let mut rpc = rpc.clone();
        if rpc.url.is_empty() {
            rpc.url = credentials.rpc_url.clone();
        }
        info!(url = %rpc.url, "Using JSON-RPC chain provider");
        let provider = JsonRpcProvider::new(rpc).context("failed to build JSON-RPC provider")?;
        return Ok(Arc::new(provider));
    }

    fallback_provider()
}

#[cfg(feature = "sim-engine")]
fn fallback_provider() -> Result<Arc<dyn ChainProvider>> {
    warn!("No rpc section configured, using the simulated chain provider");
    Ok(Arc::new(shielded_ops::chain::sim::SimulatedProvider::new()))
}

#[cfg(not(feature = "sim-engine"))]
fn fallback_provider() -> Result<Arc<dyn ChainProvider>> {
    anyhow::bail!("no `rpc` section in config and no simulated provider compiled in")
}

/// Secrets for `command`; `transfer` also needs a recipient
fn credentials_for<F>(command: Command, lookup: F) -> Result<Credentials, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let credentials = Credentials::from_lookup(lookup)?;
    if command == Command::Transfer && credentials.target_address.is_none() {
        return Err(ConfigError::MissingEnv("TARGET_0ZK_ADDRESS"));
    }
    Ok(credentials)
}

fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Completed | RunStatus::CompletedWithWarnings => ExitCode::SUCCESS,
        RunStatus::Fatal => ExitCode::from(2),
        RunStatus::Failed | RunStatus::Running => ExitCode::FAILURE,
    }
}

// ============================================================
// COMMANDS
// ============================================================

async fn print_balances(session: &Session, wallet_id: &WalletId, config: &AppConfig) -> Result<()> {
    let snapshot = session
        .refresh_balances(wallet_id)
        .await
        .context("balance refresh failed")?;
    println!("\n=== Balances for {} ===", wallet_id);
    print!("{}", format_snapshot(&snapshot, config.transfer.token_decimals));
    Ok(())
}

async fn reconcile(session: &Session, wallet_id: &WalletId, config: &AppConfig) {
    // Fresh UTXOs before touching POIs; a failed refresh does not stop reconciliation
    if let Err(e) = print_balances(session, wallet_id, config).await {
        warn!(wallet_id = %wallet_id, error = %e, "Pre-reconciliation refresh failed");
    }

    let report = session.reconcile(wallet_id).await;
    println!("\n=== POI Reconciliation ===");
    print!("{}", format_reconciliation(&report));
}

async fn transfer(
    session: &Session,
    wallet_id: &WalletId,
    config: &AppConfig,
    credentials: &Credentials,
) -> Result<ExitCode> {
    let recipient = credentials
        .target_address
        .clone()
        .context("TARGET_0ZK_ADDRESS is required for `transfer`")?;
    let amount = parse_units(&config.transfer.amount, config.transfer.token_decimals)
        .context("invalid transfer.amount")?;

    print_balances(session, wallet_id, config).await?;

    let request = TransferRequest::single(
        wallet_id.clone(),
        credentials.encryption_key.clone(),
        config.transfer.token_address.clone(),
        amount,
        recipient,
    )
    .with_memo(config.transfer.memo.clone())
    .with_sender_address_shown(config.transfer.show_sender_address_to_recipient);

    let outcome = session.transfer(request).await;
    println!("\n=== Private Transfer ===");
    print!("{}", format_run(&outcome.run));
    if let Some(hash) = &outcome.tx_hash {
        println!("  tx_hash: {}", hash);
    }
    if outcome.run.requires_escalation() {
        error!(run_id = %outcome.run.run_id, "Transfer hit a fatal engine error");
    }

    // Reconciliation runs regardless; only the transfer decides the exit code
    reconcile(session, wallet_id, config).await;

    Ok(exit_code(outcome.run.status))
}

async fn run(command: Command, config: &AppConfig, credentials: Credentials) -> Result<ExitCode> {
    let engine = build_engine(config)?;
    let provider = build_provider(config, &credentials)?;
    let session = Session::new(engine, provider, config);
    let _scan_watcher = session.watch_scan_progress();

    let result = match session.load_wallet(&credentials).await {
        Ok(wallet_id) => match command {
            Command::Balances => print_balances(&session, &wallet_id, config)
                .await
                .map(|_| ExitCode::SUCCESS),
            Command::Transfer => transfer(&session, &wallet_id, config, &credentials).await,
            Command::Poi => {
                reconcile(&session, &wallet_id, config).await;
                Ok(ExitCode::SUCCESS)
            }
        },
        Err(e) => Err(anyhow::Error::new(e).context("failed to load wallet")),
    };

    if let Err(e) = session.shutdown().await {
        warn!(error = %e, "Session shutdown failed");
    }
    result
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is fine; variables may come from the shell
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = get_command(&args).as_deref().and_then(Command::parse) else {
        eprintln!("{}", usage());
        return ExitCode::from(64);
    };

    let env = get_env(&args);
    let app_config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::from(78);
        }
    };
    let _log_guard = shielded_ops::logging::init_logging(&app_config);

    info!(
        git_hash = env!("GIT_HASH"),
        env = %env,
        command = command.as_str(),
        network = %app_config.network.name,
        poi_nodes = ?app_config.poi_node_urls,
        "Starting shielded_ops"
    );

    let credentials = match credentials_for(command, |key| std::env::var(key).ok()) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!(error = %e, "Missing credentials");
            eprintln!("❌ {}", e);
            return ExitCode::from(78);
        }
    };

    match run(command, &app_config, credentials).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "Command failed");
            eprintln!("❌ {:#}", e);
            // `poi` never fails the process
            if command == Command::Poi {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
