//! Balance-consistency engine for a personal-finance ledger.
//!
//! Accounts hold a stored balance; transactions (expense, income, transfer)
//! move money between them. Every create, update or delete of a transaction
//! runs as a single atomic unit that adjusts the affected balances and the
//! transaction row together, so concurrent writers never lose an update.
//!
//! Balances only move through [`Engine`] operations. The delta arithmetic
//! behind them is internal:
//!
//! ```compile_fail
//! use engine::posting::Posting;
//! ```

pub use accounts::Account;
pub use commands::{TransactionCmd, TransactionIntent};
pub use error::{EngineError, ErrorKind};
pub use money::Money;
pub use ops::{
    AccountDeletionPolicy, BalanceCorrection, DEFAULT_RETRY_ATTEMPTS, Engine, EngineBuilder,
    TransactionListFilter,
};
pub use transactions::{Transaction, TransactionKind, TransactionType};

mod accounts;
mod commands;
mod error;
mod money;
mod ops;
mod posting;
mod transactions;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
