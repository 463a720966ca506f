//! Sign convention and balance deltas.
//!
//! This is the only place that knows how a transaction moves money:
//!
//! | kind     | source    | destination |
//! |----------|-----------|-------------|
//! | expense  | `-amount` | -           |
//! | income   | `+amount` | -           |
//! | transfer | `-amount` | `+amount`   |
//!
//! Reverting a transaction applies the same table negated. An update is a
//! revert of the old footprint followed by an apply of the new one, composed
//! inside a single atomic unit by the engine.

use uuid::Uuid;

use crate::{Money, Transaction, TransactionKind};

/// Balance footprint of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Effect {
    pub(crate) account_id: Uuid,
    pub(crate) kind: TransactionKind,
    pub(crate) amount: Money,
}

impl Effect {
    /// Signed deltas in application order: source first, then destination.
    pub(crate) fn deltas(&self) -> Vec<(Uuid, Money)> {
        match self.kind {
            TransactionKind::Expense { .. } => vec![(self.account_id, -self.amount)],
            TransactionKind::Income { .. } => vec![(self.account_id, self.amount)],
            TransactionKind::Transfer {
                destination_account_id,
                ..
            } => vec![
                (self.account_id, -self.amount),
                (destination_account_id, self.amount),
            ],
        }
    }
}

impl From<&Transaction> for Effect {
    fn from(tx: &Transaction) -> Self {
        Self {
            account_id: tx.account_id,
            kind: tx.kind,
            amount: tx.amount,
        }
    }
}

/// Which half of a posting a delta belongs to.
///
/// Revert deltas touch accounts a stored transaction already references, so a
/// missing account there is a data-integrity problem rather than a bad
/// request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Revert,
    Apply,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Delta {
    pub(crate) account_id: Uuid,
    pub(crate) amount: Money,
    pub(crate) phase: Phase,
}

/// A transaction lifecycle event, reduced to its balance effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Posting {
    Create { new: Effect },
    Delete { old: Effect },
    Update { old: Effect, new: Effect },
}

impl Posting {
    /// Revert deltas of the old footprint, then apply deltas of the new one.
    pub(crate) fn deltas(&self) -> Vec<Delta> {
        let revert = |effect: &Effect| {
            effect
                .deltas()
                .into_iter()
                .map(|(account_id, amount)| Delta {
                    account_id,
                    amount: -amount,
                    phase: Phase::Revert,
                })
                .collect::<Vec<_>>()
        };
        let apply = |effect: &Effect| {
            effect
                .deltas()
                .into_iter()
                .map(|(account_id, amount)| Delta {
                    account_id,
                    amount,
                    phase: Phase::Apply,
                })
                .collect::<Vec<_>>()
        };

        match self {
            Self::Create { new } => apply(new),
            Self::Delete { old } => revert(old),
            Self::Update { old, new } => {
                let mut deltas = revert(old);
                deltas.extend(apply(new));
                deltas
            }
        }
    }

    /// Net change per account, in first-touch order.
    #[cfg(test)]
    fn net(&self) -> Vec<(Uuid, Money)> {
        let mut net: Vec<(Uuid, Money)> = Vec::new();
        for delta in self.deltas() {
            match net.iter_mut().find(|(id, _)| *id == delta.account_id) {
                Some((_, total)) => *total += delta.amount,
                None => net.push((delta.account_id, delta.amount)),
            }
        }
        net
    }
}
