//! Operator command line for the wallet ledger.
//!
//! Connects to PostgreSQL, runs one ledger command and prints its result as
//! JSON on stdout. Logs go to stderr.

mod command;
mod config;

use std::{process::ExitCode, sync::Arc};

use anyhow::Error;
use log::info;
use pico_args::Arguments;
use serde_json::json;
use wallet_ledger::{
    Database, WalletManager,
    wallet::{ChannelEventSink, LedgerEvent},
};

use command::Invocation;
use config::CliConfig;

const HELP: &str = "\
Operate on the wallet ledger

USAGE:
  ledger_cli [OPTIONS] <COMMAND>

COMMANDS:
  migrate                                   Create ledger tables if missing
  health                                    Check that the database is reachable
  balance  USER                             Show a wallet (provisions an empty one)
  deposit  USER AMOUNT                      Add funds to a wallet
  withdraw USER AMOUNT                      Remove funds from a wallet
  transfer FROM TO AMOUNT [--description TEXT]
                                            Move funds between wallets
  history  USER [--limit N]                 List entries, newest first
  show     USER ID                          Show one entry visible to USER

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/ledger_db]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL                     PostgreSQL connection string
  DB_MAX_CONNECTIONS               Maximum pool size
  LEDGER_LOCK_TIMEOUT_MS           Longest wait for a wallet row lock
  LEDGER_TRANSACTION_TIMEOUT_SECS  Longest a unit of work may run before commit
  LEDGER_QUERY_TIMEOUT_SECS        Longest a read may run
  RUST_LOG                         Log filter (logs are written to stderr)
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<ExitCode, Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(ExitCode::SUCCESS);
    }

    let database_url: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let invocation = Invocation::parse(pargs)?;
    let config = CliConfig::from_env(database_url)?;

    env_logger::builder().format_target(false).init();

    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    info!("Database connected successfully");

    let command = match invocation {
        Invocation::Migrate => {
            db.migrate().await?;
            println!("{}", json!({ "migrated": true }));
            db.close().await;
            return Ok(ExitCode::SUCCESS);
        }
        Invocation::Ledger(command) => command,
    };

    let (sink, mut events) = ChannelEventSink::channel(config.event_buffer);
    let notifier = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            notify(&event);
        }
    });

    let wallets = WalletManager::new(Arc::new(db.ledger_store()), config.ledger)
        .with_event_sink(Arc::new(sink));

    if command.is_mutation() {
        info!("Running {:?}", command);
    }
    let outcome = command.execute(&wallets).await;

    // Dropping the manager closes the event channel so the notifier drains and exits
    drop(wallets);
    if let Err(e) = notifier.await {
        log::error!("Event notifier failed: {}", e);
    }
    db.close().await;

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            log::error!("Command failed: {}", e);
            println!(
                "{}",
                json!({
                    "error": e.kind(),
                    "message": e.client_message(),
                    "retryable": e.is_retryable(),
                })
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Stand-in for notification delivery: log who should hear about a committed event
fn notify(event: &LedgerEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => info!("Notify users {:?}: {}", event.recipients(), payload),
        Err(e) => log::warn!("Failed to encode event for entry {}: {}", event.entry().id, e),
    }
}
