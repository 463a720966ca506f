use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use sea_orm::{
    ActiveValue, Condition, PaginatorTrait, QueryFilter, QueryOrder, prelude::*, sea_query::Expr,
};

use crate::{
    Account, EngineError, Money, ResultEngine, Transaction, accounts,
    posting::{Effect, Posting},
    transactions,
    util::{normalize_required_name, parse_uuid},
};

use super::{AccountDeletionPolicy, Engine, atomically};

/// An account whose stored balance disagreed with its transaction history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceCorrection {
    pub account_id: Uuid,
    pub stored: Money,
    pub recomputed: Money,
}

fn references_account(account_id: Uuid) -> Condition {
    let account_id = account_id.to_string();
    Condition::any()
        .add(transactions::Column::AccountId.eq(account_id.clone()))
        .add(transactions::Column::DestinationAccountId.eq(account_id))
}

impl Engine {
    /// Return an account snapshot from DB.
    pub async fn account(&self, account_id: Uuid, user_id: &str) -> ResultEngine<Account> {
        atomically!(self, "account", |db_tx| {
            let model = self.find_account_owned(&db_tx, account_id, user_id).await?;
            Account::try_from(model)
        })
    }

    /// All accounts owned by `user_id`, ordered by name.
    pub async fn list_accounts(&self, user_id: &str) -> ResultEngine<Vec<Account>> {
        atomically!(self, "list_accounts", |db_tx| {
            accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id))
                .order_by_asc(accounts::Column::Name)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Account::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Open a new account.
    ///
    /// Names are unique per owner, compared case-insensitively.
    pub async fn new_account(
        &self,
        user_id: &str,
        name: &str,
        opening_balance: Money,
    ) -> ResultEngine<Uuid> {
        let name = normalize_required_name(name, "account")?;
        atomically!(self, "new_account", |db_tx| {
            let exists = accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id))
                .filter(Expr::cust("LOWER(name)").eq(name.to_lowercase()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(name.clone()));
            }

            let account = Account::new(user_id.to_string(), name.clone(), opening_balance, Utc::now());
            accounts::ActiveModel::from(&account).insert(&db_tx).await?;

            tracing::info!(account_id = %account.id, opening = %opening_balance, "account created");
            Ok(account.id)
        })
    }

    pub async fn rename_account(
        &self,
        account_id: Uuid,
        user_id: &str,
        new_name: &str,
    ) -> ResultEngine<()> {
        let new_name = normalize_required_name(new_name, "account")?;
        atomically!(self, "rename_account", |db_tx| {
            let model = self.find_account_owned(&db_tx, account_id, user_id).await?;

            let exists = accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id))
                .filter(Expr::cust("LOWER(name)").eq(new_name.to_lowercase()))
                .filter(accounts::Column::Id.ne(account_id.to_string()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(new_name.clone()));
            }

            let mut active: accounts::ActiveModel = model.into();
            active.name = ActiveValue::Set(new_name.clone());
            active.updated_at = ActiveValue::Set(Utc::now());
            active.update(&db_tx).await?;
            Ok(())
        })
    }

    /// Delete an account according to the configured [`AccountDeletionPolicy`].
    ///
    /// Returns how many transactions were removed along with it (always 0
    /// under `Restrict`).
    pub async fn delete_account(&self, account_id: Uuid, user_id: &str) -> ResultEngine<u64> {
        atomically!(self, "delete_account", |db_tx| {
            let model = self.find_account_owned(&db_tx, account_id, user_id).await?;

            let referencing = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(references_account(account_id));

            let removed = match self.account_deletion {
                AccountDeletionPolicy::Restrict => {
                    if referencing.count(&db_tx).await? > 0 {
                        return Err(EngineError::AccountInUse(model.name.clone()));
                    }
                    0
                }
                AccountDeletionPolicy::Cascade => {
                    let linked = referencing
                        .all(&db_tx)
                        .await?
                        .into_iter()
                        .map(Transaction::try_from)
                        .collect::<ResultEngine<Vec<_>>>()?;

                    // Only transfer counterparts survive; the deleted account's
                    // own balance goes with it.
                    let deltas = linked
                        .iter()
                        .flat_map(|tx| Posting::Delete { old: Effect::from(tx) }.deltas())
                        .filter(|delta| delta.account_id != account_id)
                        .collect();
                    self.apply_deltas(&db_tx, user_id, deltas, Utc::now()).await?;

                    let ids: Vec<String> = linked.iter().map(|tx| tx.id.to_string()).collect();
                    transactions::Entity::delete_many()
                        .filter(transactions::Column::Id.is_in(ids))
                        .exec(&db_tx)
                        .await?
                        .rows_affected
                }
            };

            let deleted = accounts::Entity::delete_many()
                .filter(accounts::Column::Id.eq(model.id.clone()))
                .filter(accounts::Column::Version.eq(model.version))
                .exec(&db_tx)
                .await?;
            if deleted.rows_affected == 0 {
                return Err(EngineError::Conflict(format!("account {}", model.id)));
            }

            tracing::info!(account_id = %account_id, removed, "account deleted");
            Ok(removed)
        })
    }

    /// Rebuild every balance owned by `user_id` from its transaction history.
    ///
    /// A balance equals the opening balance plus the signed effect of every
    /// live transaction touching the account. Drifted balances are written
    /// back and reported.
    pub async fn recompute_balances(&self, user_id: &str) -> ResultEngine<Vec<BalanceCorrection>> {
        atomically!(self, "recompute_balances", |db_tx| {
            let owned = accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id))
                .all(&db_tx)
                .await?;

            let mut expected: BTreeMap<Uuid, (accounts::Model, Money)> = BTreeMap::new();
            for model in owned {
                let id = parse_uuid(&model.id, "account")?;
                let opening = Money::new(model.opening_balance_minor);
                expected.insert(id, (model, opening));
            }

            let history = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id))
                .all(&db_tx)
                .await?;
            for model in history {
                let tx = Transaction::try_from(model)?;
                for (account_id, amount) in Effect::from(&tx).deltas() {
                    let (_, balance) = expected.get_mut(&account_id).ok_or_else(|| {
                        EngineError::Integrity(format!(
                            "account {account_id} referenced by transaction {} no longer exists",
                            tx.id
                        ))
                    })?;
                    *balance = balance.checked_add(amount).ok_or_else(|| {
                        EngineError::Integrity(format!("balance overflow on account {account_id}"))
                    })?;
                }
            }

            let now = Utc::now();
            let mut corrections = Vec::new();
            for (account_id, (model, recomputed)) in &expected {
                let stored = Money::new(model.balance_minor);
                if stored == *recomputed {
                    continue;
                }
                self.save_account_balance(&db_tx, model, *recomputed, now)
                    .await?;
                tracing::warn!(
                    account_id = %account_id,
                    stored = %stored,
                    recomputed = %recomputed,
                    "balance drift corrected"
                );
                corrections.push(BalanceCorrection {
                    account_id: *account_id,
                    stored,
                    recomputed: *recomputed,
                });
            }
            Ok(corrections)
        })
    }
}
