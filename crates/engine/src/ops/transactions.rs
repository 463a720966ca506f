use uuid::Uuid;

use crate::{ResultEngine, Transaction};

use super::{Engine, atomically};

mod list;
mod write;

pub use list::TransactionListFilter;

impl Engine {
    /// Return a transaction owned by `user_id`.
    pub async fn transaction(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<Transaction> {
        atomically!(self, "transaction", |db_tx| {
            let model = self
                .find_transaction_owned(&db_tx, transaction_id, user_id)
                .await?;
            Transaction::try_from(model)
        })
    }
}
