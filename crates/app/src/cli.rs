use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{Money, TransactionCmd, TransactionListFilter, TransactionType};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Personal ledger with consistent account balances")]
pub struct Cli {
    /// Settings file, without extension (`tally` loads `./tally.toml`).
    #[arg(long, default_value = "tally")]
    pub config: String,

    /// Database connection string; overrides the `database` setting.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Owner key every operation runs on behalf of.
    #[arg(long, env = "TALLY_USER")]
    pub user: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Account(Account),
    Tx(Tx),
    /// Rebuild balances from transaction history and report drift.
    Reconcile,
}

#[derive(Args, Debug)]
pub struct Account {
    #[command(subcommand)]
    pub command: AccountCommand,
}

#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    New {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        opening: Money,
    },
    List,
    Rename {
        id: Uuid,
        #[arg(long)]
        name: String,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
pub struct Tx {
    #[command(subcommand)]
    pub command: TxCommand,
}

#[derive(Subcommand, Debug)]
pub enum TxCommand {
    Create(TxArgs),
    Update {
        id: Uuid,
        #[command(flatten)]
        args: TxArgs,
    },
    Delete {
        id: Uuid,
    },
    Show {
        id: Uuid,
    },
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct TxArgs {
    #[arg(long)]
    account: Uuid,
    #[arg(long = "type", value_parser = parse_type)]
    transaction_type: TransactionType,
    #[arg(long)]
    amount: Money,
    #[arg(long)]
    sub_category: Option<Uuid>,
    #[arg(long)]
    destination: Option<Uuid>,
    #[arg(long)]
    note: Option<String>,
    /// RFC 3339 timestamp; defaults to now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

impl From<TxArgs> for TransactionCmd {
    fn from(args: TxArgs) -> Self {
        let occurred_at = args.at.unwrap_or_else(Utc::now);
        TransactionCmd {
            account_id: args.account,
            transaction_type: args.transaction_type,
            amount: args.amount,
            sub_category_id: args.sub_category,
            destination_account_id: args.destination,
            note: args.note,
            occurred_at,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    account: Option<Uuid>,
    #[arg(long = "type", value_parser = parse_type)]
    kinds: Vec<TransactionType>,
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    #[arg(long)]
    limit: Option<u64>,
}

impl From<ListArgs> for TransactionListFilter {
    fn from(args: ListArgs) -> Self {
        TransactionListFilter {
            account_id: args.account,
            from: args.from,
            to: args.to,
            kinds: (!args.kinds.is_empty()).then_some(args.kinds),
            limit: args.limit,
        }
    }
}

fn parse_type(raw: &str) -> Result<TransactionType, String> {
    TransactionType::try_from(raw).map_err(|err| err.to_string())
}
