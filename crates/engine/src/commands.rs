//! Command structs for engine write operations.
//!
//! [`TransactionCmd`] is the loosely typed shape a request layer decodes
//! (flat `type`, optional per-type fields). [`TransactionCmd::validate`] turns
//! it into a [`TransactionIntent`] whose [`TransactionKind`] makes invalid
//! combinations unrepresentable. Validation never touches the database.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    EngineError, Money, ResultEngine, TransactionKind, TransactionType,
    util::normalize_optional_text,
};

/// Create or replace a transaction.
#[derive(Clone, Debug, Deserialize)]
pub struct TransactionCmd {
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub sub_category_id: Option<Uuid>,
    pub destination_account_id: Option<Uuid>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl TransactionCmd {
    #[must_use]
    pub fn new(
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            transaction_type,
            amount,
            sub_category_id: None,
            destination_account_id: None,
            note: None,
            occurred_at,
        }
    }

    #[must_use]
    pub fn expense(account_id: Uuid, amount: Money, occurred_at: DateTime<Utc>) -> Self {
        Self::new(account_id, TransactionType::Expense, amount, occurred_at)
    }

    #[must_use]
    pub fn income(account_id: Uuid, amount: Money, occurred_at: DateTime<Utc>) -> Self {
        Self::new(account_id, TransactionType::Income, amount, occurred_at)
    }

    #[must_use]
    pub fn transfer(
        account_id: Uuid,
        destination_account_id: Uuid,
        amount: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(account_id, TransactionType::Transfer, amount, occurred_at)
            .destination_account_id(destination_account_id)
    }

    #[must_use]
    pub fn sub_category_id(mut self, sub_category_id: Uuid) -> Self {
        self.sub_category_id = Some(sub_category_id);
        self
    }

    #[must_use]
    pub fn destination_account_id(mut self, destination_account_id: Uuid) -> Self {
        self.destination_account_id = Some(destination_account_id);
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Checks every field rule that does not need the database.
    pub fn validate(&self) -> ResultEngine<TransactionIntent> {
        if !self.amount.is_positive() {
            return Err(EngineError::Validation("amount must be > 0".to_string()));
        }

        let kind = match self.transaction_type {
            TransactionType::Expense | TransactionType::Income => {
                let sub_category_id = self.sub_category_id.ok_or_else(|| {
                    EngineError::Validation(format!(
                        "sub_category_id is required for {}",
                        self.transaction_type
                    ))
                })?;
                if self.destination_account_id.is_some() {
                    return Err(EngineError::Validation(format!(
                        "destination_account_id is not allowed for {}",
                        self.transaction_type
                    )));
                }
                if self.transaction_type == TransactionType::Expense {
                    TransactionKind::Expense { sub_category_id }
                } else {
                    TransactionKind::Income { sub_category_id }
                }
            }
            TransactionType::Transfer => {
                let destination_account_id = self.destination_account_id.ok_or_else(|| {
                    EngineError::Validation(
                        "destination_account_id is required for transfers".to_string(),
                    )
                })?;
                if destination_account_id == self.account_id {
                    return Err(EngineError::Validation(
                        "source and destination accounts cannot be the same".to_string(),
                    ));
                }
                TransactionKind::Transfer {
                    destination_account_id,
                    sub_category_id: self.sub_category_id,
                }
            }
        };

        Ok(TransactionIntent {
            account_id: self.account_id,
            kind,
            amount: self.amount,
            note: normalize_optional_text(self.note.as_deref()),
            occurred_at: self.occurred_at,
        })
    }
}

/// A validated transaction, ready to be posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionIntent {
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
