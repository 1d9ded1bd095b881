//! velock
//!
//! Command-line front end for a local vote-escrow database. Each invocation
//! opens the sled store, runs one lifecycle call or query, and prints the
//! result as JSON.
//!
//! Usage:
//!   velock create     --owner <label|b58> --amount <tokens> (--weeks <n> | --duration <secs>)
//!   velock increase   --owner <label|b58> --amount <tokens>
//!   velock extend     --owner <label|b58> (--weeks <n> | --unlock <unix_ts>)
//!   velock withdraw   --owner <label|b58>
//!   velock info       --owner <label|b58>
//!   velock power      --owner <label|b58> [--at <unix_ts>]
//!   velock supply     [--at <unix_ts>]
//!   velock checkpoint

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use velock_core::{
    constants::{EPOCH_SECS, POWER_PRECISION, UNITS_PER_TOKEN},
    AccountId, Balance, EngineConfig, Lock, Power, Timestamp,
};
use velock_state::{StateDb, VeEngine};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "velock", version, about = "Vote-escrow lock engine")]
struct Args {
    /// Directory for the sled database.
    #[arg(long, global = true, default_value = "~/.velock/data")]
    data_dir: PathBuf,

    /// Engine parameters as a JSON file. Omitted fields take defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Treat this Unix timestamp as the current time.
    #[arg(long, global = true)]
    now: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lock tokens for a duration.
    Create {
        /// Owner label or base-58 account id.
        #[arg(long)]
        owner: String,
        /// Amount in tokens (converted to base units).
        #[arg(long)]
        amount: f64,
        /// Lock duration in weeks.
        #[arg(long, conflicts_with = "duration")]
        weeks: Option<i64>,
        /// Lock duration in seconds.
        #[arg(long)]
        duration: Option<i64>,
    },

    /// Add tokens to an active lock.
    Increase {
        #[arg(long)]
        owner: String,
        /// Amount in tokens.
        #[arg(long)]
        amount: f64,
    },

    /// Push the unlock time of an active lock later.
    Extend {
        #[arg(long)]
        owner: String,
        /// New duration from now, in weeks.
        #[arg(long, conflicts_with = "unlock")]
        weeks: Option<i64>,
        /// New absolute unlock time (Unix seconds, rounded down to an epoch).
        #[arg(long)]
        unlock: Option<i64>,
    },

    /// Release an expired lock.
    Withdraw {
        #[arg(long)]
        owner: String,
    },

    /// Show the lock held by an owner.
    Info {
        #[arg(long)]
        owner: String,
    },

    /// Voting power of an owner.
    Power {
        #[arg(long)]
        owner: String,
        /// Evaluate at this timestamp instead of now.
        #[arg(long)]
        at: Option<i64>,
    },

    /// Total voting power across all locks.
    Supply {
        /// Evaluate at this timestamp without committing catch-up.
        #[arg(long)]
        at: Option<i64>,
    },

    /// Replay pending slope changes up to now.
    Checkpoint,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,velock=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let now = args.now.unwrap_or_else(|| chrono::Utc::now().timestamp());

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);
    let engine = VeEngine::open(db, config).context("loading vote-escrow state")?;
    info!(data_dir = %data_dir.display(), now, "velock ready");

    let output = run(&engine, args.command, now)?;
    engine.db.flush().context("flushing state database")?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run(engine: &VeEngine, command: Command, now: Timestamp) -> anyhow::Result<Value> {
    let out = match command {
        Command::Create {
            owner,
            amount,
            weeks,
            duration,
        } => {
            let owner = parse_owner(&owner);
            let duration = match (weeks, duration) {
                (Some(w), None) => weeks_to_secs(w)?,
                (None, Some(d)) => d,
                _ => bail!("pass exactly one of --weeks or --duration"),
            };
            let lock = engine.create_lock(&owner, tokens_to_units(amount)?, duration, now)?;
            lock_json(&lock, engine.voting_power(&owner, now))
        }

        Command::Increase { owner, amount } => {
            let owner = parse_owner(&owner);
            let lock = engine.increase_amount(&owner, tokens_to_units(amount)?, now)?;
            lock_json(&lock, engine.voting_power(&owner, now))
        }

        Command::Extend {
            owner,
            weeks,
            unlock,
        } => {
            let owner = parse_owner(&owner);
            let lock = match (weeks, unlock) {
                (Some(w), None) => engine.extend_lock_duration(&owner, weeks_to_secs(w)?, now)?,
                (None, Some(u)) => engine.extend_lock(&owner, u, now)?,
                _ => bail!("pass exactly one of --weeks or --unlock"),
            };
            lock_json(&lock, engine.voting_power(&owner, now))
        }

        Command::Withdraw { owner } => {
            let owner = parse_owner(&owner);
            let lock = engine.withdraw(&owner, now)?;
            json!({
                "owner": lock.owner.to_b58(),
                "released_units": lock.amount.to_string(),
                "released_tokens": units_to_tokens(lock.amount),
            })
        }

        Command::Info { owner } => {
            let id = parse_owner(&owner);
            match engine.lock_info(&id) {
                Some(info) => json!({
                    "owner": id.to_b58(),
                    "amount_units": info.amount.to_string(),
                    "unlock_time": info.unlock_time,
                    "created_at": info.created_at,
                    "expired": info.unlock_time <= now,
                }),
                None => json!({ "owner": id.to_b58(), "lock": null }),
            }
        }

        Command::Power { owner, at } => {
            let owner = parse_owner(&owner);
            let ts = at.unwrap_or(now);
            power_json(engine.voting_power(&owner, ts), ts)
        }

        Command::Supply { at } => {
            let (power, ts) = match at {
                Some(ts) => (engine.total_supply_at(ts)?, ts),
                None => (engine.total_supply(now)?, now),
            };
            let mut out = power_json(power, ts);
            out["locks"] = json!(engine.lock_count());
            out
        }

        Command::Checkpoint => {
            let advance = engine.checkpoint(now)?;
            json!({
                "steps": advance.steps,
                "caught_up": advance.caught_up,
                "timestamp": now,
            })
        }
    };
    Ok(out)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    EngineConfig::from_json(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// A valid base-58 account id is used as-is; anything else is a label.
fn parse_owner(s: &str) -> AccountId {
    AccountId::from_b58(s).unwrap_or_else(|_| AccountId::from_label(s))
}

fn tokens_to_units(tokens: f64) -> anyhow::Result<Balance> {
    if !tokens.is_finite() || tokens < 0.0 {
        bail!("amount must be a non-negative number, got {}", tokens);
    }
    Ok((tokens * UNITS_PER_TOKEN as f64).round() as Balance)
}

fn units_to_tokens(units: Balance) -> f64 {
    units as f64 / UNITS_PER_TOKEN as f64
}

fn weeks_to_secs(weeks: i64) -> anyhow::Result<i64> {
    weeks
        .checked_mul(EPOCH_SECS)
        .with_context(|| format!("{} weeks overflows a duration", weeks))
}

fn lock_json(lock: &Lock, power: Power) -> Value {
    json!({
        "owner": lock.owner.to_b58(),
        "amount_units": lock.amount.to_string(),
        "amount_tokens": units_to_tokens(lock.amount),
        "unlock_time": lock.unlock_time,
        "created_at": lock.created_at,
        "power": power.to_string(),
        "power_tokens": power_to_tokens(power),
    })
}

fn power_json(power: Power, ts: Timestamp) -> Value {
    json!({
        "timestamp": ts,
        "power": power.to_string(),
        "power_tokens": power_to_tokens(power),
    })
}

fn power_to_tokens(power: Power) -> f64 {
    power as f64 / (POWER_PRECISION as f64 * UNITS_PER_TOKEN as f64)
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
