//! Transaction primitives.
//!
//! A `Transaction` is a recorded income, expense or transfer. Its balance
//! effect on the referenced accounts is derived from its [`TransactionKind`]
//! and amount (see the posting module).

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, util::parse_uuid};

/// Flat transaction type, as it appears on the wire and in storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Expense,
    Income,
    Transfer,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Transfer => "transfer",
        }
    }
}

impl TryFrom<&str> for TransactionType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            "transfer" => Ok(Self::Transfer),
            other => Err(EngineError::Validation(format!(
                "invalid transaction type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction kind together with the fields that kind requires.
///
/// Expense and income always carry a sub-category; a transfer always carries
/// a destination account and may carry a sub-category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
    Expense {
        sub_category_id: Uuid,
    },
    Income {
        sub_category_id: Uuid,
    },
    Transfer {
        destination_account_id: Uuid,
        sub_category_id: Option<Uuid>,
    },
}

impl TransactionKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Expense { .. } => TransactionType::Expense,
            Self::Income { .. } => TransactionType::Income,
            Self::Transfer { .. } => TransactionType::Transfer,
        }
    }

    pub fn sub_category_id(&self) -> Option<Uuid> {
        match *self {
            Self::Expense { sub_category_id } | Self::Income { sub_category_id } => {
                Some(sub_category_id)
            }
            Self::Transfer {
                sub_category_id, ..
            } => sub_category_id,
        }
    }

    pub fn destination_account_id(&self) -> Option<Uuid> {
        match *self {
            Self::Transfer {
                destination_account_id,
                ..
            } => Some(destination_account_id),
            Self::Expense { .. } | Self::Income { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    /// Source account.
    pub account_id: Uuid,
    #[serde(flatten)]
    pub kind: TransactionKind,
    pub amount: Money,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub destination_account_id: Option<String>,
    pub sub_category_id: Option<String>,
    pub kind: String,
    pub amount_minor: i64,
    pub note: Option<String>,
    pub occurred_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            user_id: ActiveValue::Set(tx.user_id.clone()),
            account_id: ActiveValue::Set(tx.account_id.to_string()),
            destination_account_id: ActiveValue::Set(
                tx.kind.destination_account_id().map(|id| id.to_string()),
            ),
            sub_category_id: ActiveValue::Set(tx.kind.sub_category_id().map(|id| id.to_string())),
            kind: ActiveValue::Set(tx.kind.transaction_type().as_str().to_string()),
            amount_minor: ActiveValue::Set(tx.amount.cents()),
            note: ActiveValue::Set(tx.note.clone()),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
        }
    }
}

fn parse_optional_uuid(value: Option<&str>, label: &str) -> ResultEngine<Option<Uuid>> {
    value.map(|raw| parse_uuid(raw, label)).transpose()
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let transaction_type = TransactionType::try_from(model.kind.as_str())
            .map_err(|_| EngineError::Integrity(format!("invalid stored kind: {}", model.kind)))?;
        let sub_category_id =
            parse_optional_uuid(model.sub_category_id.as_deref(), "sub_category")?;
        let destination_account_id =
            parse_optional_uuid(model.destination_account_id.as_deref(), "destination account")?;
        let missing = |field: &str| {
            EngineError::Integrity(format!(
                "stored {transaction_type} {} has no {field}",
                model.id
            ))
        };

        let kind = match transaction_type {
            TransactionType::Expense => TransactionKind::Expense {
                sub_category_id: sub_category_id.ok_or_else(|| missing("sub_category_id"))?,
            },
            TransactionType::Income => TransactionKind::Income {
                sub_category_id: sub_category_id.ok_or_else(|| missing("sub_category_id"))?,
            },
            TransactionType::Transfer => TransactionKind::Transfer {
                destination_account_id: destination_account_id
                    .ok_or_else(|| missing("destination_account_id"))?,
                sub_category_id,
            },
        };

        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            user_id: model.user_id,
            account_id: parse_uuid(&model.account_id, "account")?,
            kind,
            amount: Money::new(model.amount_minor),
            note: model.note,
            occurred_at: model.occurred_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
