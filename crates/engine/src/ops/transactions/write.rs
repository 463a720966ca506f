use chrono::Utc;
use uuid::Uuid;

use sea_orm::{ActiveModelTrait, EntityTrait};

use crate::{
    ResultEngine, Transaction, TransactionCmd, TransactionIntent,
    posting::{Effect, Posting},
    transactions,
};

use super::super::{Engine, atomically};

fn build_transaction(
    id: Uuid,
    user_id: &str,
    intent: TransactionIntent,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
) -> Transaction {
    Transaction {
        id,
        user_id: user_id.to_string(),
        account_id: intent.account_id,
        kind: intent.kind,
        amount: intent.amount,
        note: intent.note,
        occurred_at: intent.occurred_at,
        created_at,
        updated_at,
    }
}

impl Engine {
    /// Record a new transaction and apply its effect to the balances it
    /// touches.
    ///
    /// The command is validated before any storage access. The referenced
    /// accounts must exist and belong to `user_id`.
    pub async fn create_transaction(&self, user_id: &str, cmd: TransactionCmd) -> ResultEngine<Uuid> {
        let intent = cmd.validate()?;
        let transaction_id = Uuid::new_v4();

        atomically!(self, "create_transaction", |db_tx| {
            let now = Utc::now();
            let tx = build_transaction(transaction_id, user_id, intent.clone(), now, now);

            self.post(&db_tx, user_id, &Posting::Create { new: Effect::from(&tx) }, now)
                .await?;
            transactions::ActiveModel::from(&tx).insert(&db_tx).await?;

            tracing::info!(
                transaction_id = %transaction_id,
                kind = %tx.kind.transaction_type(),
                amount = %tx.amount,
                "transaction created"
            );
            Ok(transaction_id)
        })
    }

    /// Replace every mutable field of a transaction.
    ///
    /// The old effect is reverted and the new one applied in the same atomic
    /// unit, so a failure on either half leaves all balances untouched.
    pub async fn update_transaction(
        &self,
        transaction_id: Uuid,
        user_id: &str,
        cmd: TransactionCmd,
    ) -> ResultEngine<()> {
        let intent = cmd.validate()?;

        atomically!(self, "update_transaction", |db_tx| {
            let model = self
                .find_transaction_owned(&db_tx, transaction_id, user_id)
                .await?;
            let old = Transaction::try_from(model)?;
            let now = Utc::now();
            let new = build_transaction(old.id, user_id, intent.clone(), old.created_at, now);

            let posting = Posting::Update {
                old: Effect::from(&old),
                new: Effect::from(&new),
            };
            self.post(&db_tx, user_id, &posting, now).await?;
            transactions::ActiveModel::from(&new).update(&db_tx).await?;

            tracing::info!(
                transaction_id = %transaction_id,
                kind = %new.kind.transaction_type(),
                amount = %new.amount,
                "transaction updated"
            );
            Ok(())
        })
    }

    /// Remove a transaction and revert its effect.
    pub async fn delete_transaction(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<()> {
        atomically!(self, "delete_transaction", |db_tx| {
            let model = self
                .find_transaction_owned(&db_tx, transaction_id, user_id)
                .await?;
            let old = Transaction::try_from(model)?;
            let now = Utc::now();

            self.post(&db_tx, user_id, &Posting::Delete { old: Effect::from(&old) }, now)
                .await?;
            transactions::Entity::delete_by_id(old.id.to_string())
                .exec(&db_tx)
                .await?;

            tracing::info!(transaction_id = %transaction_id, "transaction deleted");
            Ok(())
        })
    }
}
