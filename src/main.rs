//! bank-ledger - command runner over the ledger library
//!
//! ```text
//! bank-ledger [--env <env>] <command> [args...]
//!
//!   create-account <owner> <currency> [initial_deposit]
//!   get-account    <account_id>
//!   list-accounts  <owner> [page_id] [page_size]
//!   transfer       <from_id> <to_id> <amount> <currency>
//!   list-transfers <from_id> <to_id> [page_id] [page_size]
//!   list-entries   <account_id> [page_id] [page_size]
//!   reconcile      <account_id>
//! ```
//!
//! Uses PostgreSQL when `database.url` (or `DATABASE_URL`) is set. Without
//! a database only `create-account` runs, against a throwaway in-process
//! ledger; every other command reads state from earlier runs and is
//! refused. Results are printed as JSON on stdout.

use std::sync::Arc;

use anyhow::{Context, bail};
use serde::Serialize;

use bank_ledger::config::AppConfig;
use bank_ledger::db::Database;
use bank_ledger::{
    AccountId, AccountService, LedgerReader, MemoryStore, MinorUnits, PgStore, RetryPolicy,
    Store, TransferEngine, TransferRequest,
};

const DEFAULT_PAGE_ID: i32 = 1;
const DEFAULT_PAGE_SIZE: i32 = 10;

#[derive(Debug, PartialEq)]
enum Command {
    CreateAccount {
        owner: String,
        currency: String,
        initial_deposit: MinorUnits,
    },
    GetAccount(AccountId),
    ListAccounts {
        owner: String,
        page_id: i32,
        page_size: i32,
    },
    Transfer(TransferRequest),
    ListTransfers {
        from: AccountId,
        to: AccountId,
        page_id: i32,
        page_size: i32,
    },
    ListEntries {
        account_id: AccountId,
        page_id: i32,
        page_size: i32,
    },
    Reconcile(AccountId),
}

impl Command {
    /// Whether the command depends on accounts created by an earlier run
    fn needs_database(&self) -> bool {
        !matches!(self, Command::CreateAccount { .. })
    }
}

// ============================================================
// ARGUMENTS
// ============================================================

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Positional arguments with `--env <value>` removed
fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if arg == "--env" || arg == "-e" {
            skip = true;
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn arg<T>(args: &[String], index: usize, name: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = args
        .get(index)
        .with_context(|| format!("missing argument <{}>", name))?;
    raw.parse()
        .with_context(|| format!("invalid <{}>: {}", name, raw))
}

fn opt_arg<T>(args: &[String], index: usize, name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if args.get(index).is_some() {
        arg(args, index, name)
    } else {
        Ok(default)
    }
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    let Some(name) = args.first() else {
        bail!("missing command");
    };
    let rest = &args[1..];

    let command = match name.as_str() {
        "create-account" => Command::CreateAccount {
            owner: arg(rest, 0, "owner")?,
            currency: arg(rest, 1, "currency")?,
            initial_deposit: opt_arg(rest, 2, "initial_deposit", 0)?,
        },
        "get-account" => Command::GetAccount(arg(rest, 0, "account_id")?),
        "list-accounts" => Command::ListAccounts {
            owner: arg(rest, 0, "owner")?,
            page_id: opt_arg(rest, 1, "page_id", DEFAULT_PAGE_ID)?,
            page_size: opt_arg(rest, 2, "page_size", DEFAULT_PAGE_SIZE)?,
        },
        "transfer" => Command::Transfer(TransferRequest::new(
            arg(rest, 0, "from_id")?,
            arg(rest, 1, "to_id")?,
            arg(rest, 2, "amount")?,
            arg::<String>(rest, 3, "currency")?,
        )),
        "list-transfers" => Command::ListTransfers {
            from: arg(rest, 0, "from_id")?,
            to: arg(rest, 1, "to_id")?,
            page_id: opt_arg(rest, 2, "page_id", DEFAULT_PAGE_ID)?,
            page_size: opt_arg(rest, 3, "page_size", DEFAULT_PAGE_SIZE)?,
        },
        "list-entries" => Command::ListEntries {
            account_id: arg(rest, 0, "account_id")?,
            page_id: opt_arg(rest, 1, "page_id", DEFAULT_PAGE_ID)?,
            page_size: opt_arg(rest, 2, "page_size", DEFAULT_PAGE_SIZE)?,
        },
        "reconcile" => Command::Reconcile(arg(rest, 0, "account_id")?),
        other => bail!("unknown command '{}'", other),
    };
    Ok(command)
}

// ============================================================
// EXECUTION
// ============================================================

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run<S: Store>(store: Arc<S>, config: &AppConfig, command: Command) -> anyhow::Result<()> {
    let accounts = AccountService::new(store.clone());
    let reader = LedgerReader::with_retry(store.clone(), RetryPolicy::from_config(&config.retry));

    match command {
        Command::CreateAccount {
            owner,
            currency,
            initial_deposit,
        } => print_json(
            &accounts
                .open_funded_account(&owner, &currency, initial_deposit)
                .await?,
        ),
        Command::GetAccount(id) => print_json(&accounts.get_account(id).await?),
        Command::ListAccounts {
            owner,
            page_id,
            page_size,
        } => print_json(&accounts.list_accounts(&owner, page_id, page_size).await?),
        Command::Transfer(request) => {
            let engine = TransferEngine::from_config(store, config);
            print_json(&engine.execute(&request).await?)
        }
        Command::ListTransfers {
            from,
            to,
            page_id,
            page_size,
        } => print_json(&reader.list_transfers(from, to, page_id, page_size).await?),
        Command::ListEntries {
            account_id,
            page_id,
            page_size,
        } => print_json(&reader.list_entries(account_id, page_id, page_size).await?),
        Command::Reconcile(account_id) => print_json(&reader.reconcile(account_id).await?),
    }
}

// ============================================================
// MAIN
// ============================================================

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let env = get_env(&args);
    let command = parse_command(&positional(&args))?;

    let app_config = AppConfig::load(&env)?;
    let _log_guard = bank_ledger::logging::init_logging(&app_config);

    tracing::info!("Starting bank-ledger in {} mode", env);

    let database_url = app_config
        .database
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    rt.block_on(async {
        match database_url {
            Some(url) => {
                let db = Database::connect_with(&url, &app_config.database)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                let store = PgStore::with_isolation(db, app_config.database.isolation);
                run(Arc::new(store), &app_config, command).await
            }
            None if command.needs_database() => {
                bail!(
                    "this command needs a database: set database.url in config/{}.yaml or DATABASE_URL",
                    env
                )
            }
            None => {
                tracing::warn!("No database configured, using in-process ledger");
                run(Arc::new(MemoryStore::new()), &app_config, command).await
            }
        }
    })
}
