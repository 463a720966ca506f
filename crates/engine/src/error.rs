//! The module contains the error the engine can throw.
//!
//! Every failure is classified by [`EngineError::kind`] into one of four
//! buckets:
//!
//! - [`Validation`] malformed intent, rejected before any store access.
//! - [`NotFound`] referenced account or transaction absent or not owned.
//! - [`Integrity`] an account referenced by a stored transaction is gone.
//! - [`Storage`] the database could not complete the atomic unit.
//!
//!  [`Validation`]: ErrorKind::Validation
//!  [`NotFound`]: ErrorKind::NotFound
//!  [`Integrity`]: ErrorKind::Integrity
//!  [`Storage`]: ErrorKind::Storage
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid transaction: {0}")]
    Validation(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("\"{0}\" is still referenced by transactions")]
    AccountInUse(String),
    #[error("Integrity violation: {0}")]
    Integrity(String),
    /// A concurrent unit changed an account between read and write.
    ///
    /// Handled by the atomic unit; callers only see it turned into
    /// [`EngineError::RetriesExhausted`].
    #[error("Write conflict on {0}")]
    Conflict(String),
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error(transparent)]
    Storage(#[from] DbErr),
}

/// Coarse classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Integrity,
    Storage,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::ExistingKey(_) | Self::AccountInUse(_) => {
                ErrorKind::Validation
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Conflict(_) | Self::RetriesExhausted { .. } | Self::Storage(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Whether the atomic unit may run again from scratch after this error.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Storage(err) => is_busy(err),
            _ => false,
        }
    }
}

/// SQLite reports lock contention as `database is locked`/`busy`, Postgres as
/// serialization or deadlock failures.
fn is_busy(err: &DbErr) -> bool {
    let message = err.to_string().to_lowercase();
    ["database is locked", "database is busy", "could not serialize", "deadlock detected"]
        .iter()
        .any(|needle| message.contains(needle))
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::AccountInUse(a), Self::AccountInUse(b)) => a == b,
            (Self::Integrity(a), Self::Integrity(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (
                Self::RetriesExhausted {
                    attempts: a,
                    last: la,
                },
                Self::RetriesExhausted {
                    attempts: b,
                    last: lb,
                },
            ) => a == b && la == lb,
            (Self::Storage(a), Self::Storage(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
