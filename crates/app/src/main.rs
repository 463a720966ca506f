use std::{error::Error, process::ExitCode};

use clap::Parser;
use engine::{Engine, EngineError, ErrorKind};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, DatabaseConnection};
use serde_json::{Value, json};

use cli::{AccountCommand, Cli, Command, TxCommand};
use settings::Settings;

mod cli;
mod settings;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::new(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid settings: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "tally={level},engine={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    match run(cli, settings).await {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::from(exit_code(err.as_ref()))
        }
    }
}

/// Exit status for a failed command.
fn exit_code(err: &(dyn Error + Send + Sync + 'static)) -> u8 {
    match err.downcast_ref::<EngineError>().map(EngineError::kind) {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::Integrity) => 4,
        Some(ErrorKind::Storage) => 5,
        None => 1,
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<Value, BoxError> {
    let url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.database.url());
    let db = connect(&url).await?;

    let engine = Engine::builder()
        .database(db)
        .retry_attempts(settings.engine.retry_attempts)
        .account_deletion(settings.engine.account_deletion)
        .build()
        .await?;
    let user = cli.user.as_str();

    let output = match cli.command {
        Command::Account(account) => match account.command {
            AccountCommand::New { name, opening } => {
                json!({ "id": engine.new_account(user, &name, opening).await? })
            }
            AccountCommand::List => serde_json::to_value(engine.list_accounts(user).await?)?,
            AccountCommand::Rename { id, name } => {
                engine.rename_account(id, user, &name).await?;
                serde_json::to_value(engine.account(id, user).await?)?
            }
            AccountCommand::Delete { id } => {
                let removed = engine.delete_account(id, user).await?;
                json!({ "id": id, "removed_transactions": removed })
            }
        },
        Command::Tx(tx) => match tx.command {
            TxCommand::Create(args) => {
                json!({ "id": engine.create_transaction(user, args.into()).await? })
            }
            TxCommand::Update { id, args } => {
                engine.update_transaction(id, user, args.into()).await?;
                serde_json::to_value(engine.transaction(id, user).await?)?
            }
            TxCommand::Delete { id } => {
                engine.delete_transaction(id, user).await?;
                json!({ "id": id, "deleted": true })
            }
            TxCommand::Show { id } => serde_json::to_value(engine.transaction(id, user).await?)?,
            TxCommand::List(args) => {
                serde_json::to_value(engine.list_transactions(user, &args.into()).await?)?
            }
        },
        Command::Reconcile => serde_json::to_value(engine.recompute_balances(user).await?)?,
    };

    Ok(output)
}

async fn connect(url: &str) -> Result<DatabaseConnection, BoxError> {
    let mut options = ConnectOptions::new(url);
    // Each pooled connection to `sqlite::memory:` is its own database.
    if url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }
    options.sqlx_logging(false);

    let database = sea_orm::Database::connect(options).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
