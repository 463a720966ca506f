use std::{future::Future, time::Duration};

use sea_orm::DatabaseConnection;
use serde::Deserialize;

use crate::{EngineError, ResultEngine};

mod accounts;
mod store;
mod transactions;

pub use accounts::BalanceCorrection;
pub use transactions::TransactionListFilter;

/// Default number of times an atomic unit runs before a write conflict is
/// reported as a storage fault.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 10;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(4);
const RETRY_MAX_DELAY: Duration = Duration::from_millis(250);

/// Run a block as one atomic unit.
///
/// The unit begins a DB transaction, commits when the block returns `Ok` and
/// rolls back when it returns `Err`. Write conflicts rerun the whole block on a
/// fresh transaction, at most `retry_attempts` times in total, sleeping for
/// [`retry_delay`] before each rerun; any other error is returned unchanged.
macro_rules! atomically {
    ($self:expr, $op:literal, |$tx:ident| $body:expr) => {{
        let mut attempt: u32 = 1;
        loop {
            let outcome: $crate::ResultEngine<_> =
                match sea_orm::TransactionTrait::begin(&$self.database).await {
                    Ok($tx) => {
                        tracing::debug!(op = $op, attempt, "atomic unit started");
                        match $crate::ops::settle(async { $body }).await {
                            Ok(value) => match $tx.commit().await {
                                Ok(()) => Ok(value),
                                Err(err) => Err($crate::EngineError::from(err)),
                            },
                            Err(err) => {
                                if let Err(rollback_err) = $tx.rollback().await {
                                    tracing::error!(
                                        op = $op,
                                        error = %rollback_err,
                                        "rollback failed"
                                    );
                                }
                                Err(err)
                            }
                        }
                    }
                    Err(err) => Err($crate::EngineError::from(err)),
                };

            match outcome {
                Ok(value) => {
                    tracing::debug!(op = $op, attempt, "atomic unit committed");
                    break Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < $self.retry_attempts => {
                    let delay = $crate::ops::retry_delay(attempt);
                    tracing::warn!(
                        op = $op,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "write conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    break Err($crate::EngineError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => break Err(err),
            }
        }
    }};
}

pub(crate) use atomically;

/// Pins the output type of an atomic unit body so `?` inside it converts into
/// [`EngineError`].
pub(crate) async fn settle<T>(unit: impl Future<Output = ResultEngine<T>>) -> ResultEngine<T> {
    unit.await
}

/// Pause before rerunning a unit after its `attempt`-th run hit a conflict.
///
/// The ceiling doubles per attempt from [`RETRY_BASE_DELAY`] up to
/// [`RETRY_MAX_DELAY`]. Half of it is always waited; the other half is random.
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    let doublings = attempt.saturating_sub(1).min(16);
    let ceiling = RETRY_BASE_DELAY
        .saturating_mul(1 << doublings)
        .min(RETRY_MAX_DELAY);
    let floor = ceiling / 2;
    let spread = u64::try_from((ceiling - floor).as_micros()).unwrap_or(0);
    floor + Duration::from_micros(rand::random_range(0..=spread))
}

/// What happens to transactions that reference an account being deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountDeletionPolicy {
    /// Refuse to delete an account while any transaction references it.
    #[default]
    Restrict,
    /// Reverse every referencing transaction on its other accounts, then
    /// delete those transactions together with the account.
    Cascade,
}

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    retry_attempts: u32,
    account_deletion: AccountDeletionPolicy,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn account_deletion(&self) -> AccountDeletionPolicy {
        self.account_deletion
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    retry_attempts: Option<u32>,
    account_deletion: AccountDeletionPolicy,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Total runs allowed for an atomic unit that keeps hitting write
    /// conflicts. Must be at least 1.
    pub fn retry_attempts(mut self, attempts: u32) -> EngineBuilder {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn account_deletion(mut self, policy: AccountDeletionPolicy) -> EngineBuilder {
        self.account_deletion = policy;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let retry_attempts = self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS);
        if retry_attempts == 0 {
            return Err(EngineError::Validation(
                "retry_attempts must be >= 1".to_string(),
            ));
        }
        Ok(Engine {
            database: self.database,
            retry_attempts,
            account_deletion: self.account_deletion,
        })
    }
}
