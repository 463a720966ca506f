//! Account Store and Transaction Store primitives.
//!
//! No balance arithmetic lives here except the compare-and-swap write, which
//! only persists a value the caller already computed.

use std::collections::{BTreeMap, btree_map::Entry};

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, QueryFilter, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    EngineError, Money, ResultEngine, accounts,
    posting::{Delta, Phase, Posting},
    transactions,
};

use super::Engine;

impl Engine {
    /// Fetch an account owned by `user_id`, `NotFound` otherwise.
    pub(super) async fn find_account_owned(
        &self,
        db: &DatabaseTransaction,
        account_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<accounts::Model> {
        accounts::Entity::find_by_id(account_id.to_string())
            .filter(accounts::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("account {account_id}")))
    }

    /// Fetch an account a stored transaction references.
    ///
    /// The transaction was valid when it was applied, so a missing account
    /// here means it was removed behind the engine's back.
    pub(super) async fn find_account_for_reversal(
        &self,
        db: &DatabaseTransaction,
        account_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<accounts::Model> {
        accounts::Entity::find_by_id(account_id.to_string())
            .filter(accounts::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| {
                EngineError::Integrity(format!(
                    "account {account_id} referenced by a transaction no longer exists"
                ))
            })
    }

    /// Persist a new balance if nobody wrote the account since `model` was
    /// read; `Conflict` otherwise.
    pub(super) async fn save_account_balance(
        &self,
        db: &DatabaseTransaction,
        model: &accounts::Model,
        balance: Money,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::BalanceMinor, Expr::value(balance.cents()))
            .col_expr(accounts::Column::Version, Expr::value(model.version + 1))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::Id.eq(model.id.clone()))
            .filter(accounts::Column::Version.eq(model.version))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::Conflict(format!("account {}", model.id)));
        }
        Ok(())
    }

    pub(super) async fn find_transaction_owned(
        &self,
        db: &DatabaseTransaction,
        transaction_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<transactions::Model> {
        transactions::Entity::find_by_id(transaction_id.to_string())
            .filter(transactions::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("transaction {transaction_id}")))
    }

    /// Apply a posting to the account balances it touches.
    pub(super) async fn post(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
        posting: &Posting,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        self.apply_deltas(db, user_id, posting.deltas(), now).await
    }

    /// Fold deltas into freshly read balances and write every changed account.
    ///
    /// Each account is read once, on first touch; later deltas on the same
    /// account compose on the running balance. Writes happen in account id
    /// order.
    pub(super) async fn apply_deltas(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
        deltas: Vec<Delta>,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        let mut touched: BTreeMap<Uuid, (accounts::Model, Money)> = BTreeMap::new();

        for delta in deltas {
            let (_, balance) = match touched.entry(delta.account_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let model = match delta.phase {
                        Phase::Revert => {
                            self.find_account_for_reversal(db, delta.account_id, user_id)
                                .await?
                        }
                        Phase::Apply => {
                            self.find_account_owned(db, delta.account_id, user_id)
                                .await?
                        }
                    };
                    let balance = Money::new(model.balance_minor);
                    entry.insert((model, balance))
                }
            };
            *balance = balance.checked_add(delta.amount).ok_or_else(|| {
                EngineError::Validation(format!("balance overflow on account {}", delta.account_id))
            })?;
        }

        for (model, balance) in touched.values() {
            if balance.cents() == model.balance_minor {
                continue;
            }
            self.save_account_balance(db, model, *balance, now).await?;
        }

        Ok(())
    }
}
