//! The module contains `Account` struct and its storage model.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::Serialize;
use uuid::Uuid;

use crate::{EngineError, Money, util::parse_uuid};

/// An account.
///
/// An account is a representation of a real wallet, a bank account or
/// anything else where money is kept. Its balance moves only through
/// transactions recorded by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Stable identifier for this account.
    pub id: Uuid,
    /// Opaque owner key of the user the account belongs to.
    pub user_id: String,
    pub name: String,
    pub balance: Money,
    /// Balance the account was opened with, before any transaction.
    pub opening_balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: String, name: String, opening_balance: Money, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            balance: opening_balance,
            opening_balance,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub balance_minor: i64,
    pub opening_balance_minor: i64,
    /// Bumped on every balance write; guards read-modify-write cycles.
    pub version: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(value: &Account) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            user_id: ActiveValue::Set(value.user_id.clone()),
            name: ActiveValue::Set(value.name.clone()),
            balance_minor: ActiveValue::Set(value.balance.cents()),
            opening_balance_minor: ActiveValue::Set(value.opening_balance.cents()),
            version: ActiveValue::Set(0),
            created_at: ActiveValue::Set(value.created_at),
            updated_at: ActiveValue::Set(value.updated_at),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "account")?,
            user_id: model.user_id,
            name: model.name,
            balance: Money::new(model.balance_minor),
            opening_balance: Money::new(model.opening_balance_minor),
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
