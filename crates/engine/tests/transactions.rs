use std::sync::Arc;

use engine::{
    AccountDeletionPolicy, Engine, EngineError, ErrorKind, Money, Transaction, TransactionCmd,
    TransactionKind, TransactionListFilter, TransactionType,
};
use uuid::Uuid;

mod common;

use common::{
    balance, day, engine_with_db, engine_with_file_db, execute, fresh_engine, memory_db, money,
};

#[tokio::test]
async fn expense_updated_to_income_then_deleted() {
    let engine = fresh_engine().await;
    let a = engine.new_account("alice", "Cash", money("100.00")).await.unwrap();
    let groceries = Uuid::new_v4();

    let tx_id = engine
        .create_transaction(
            "alice",
            TransactionCmd::expense(a, money("30.00"), day(1)).sub_category_id(groceries),
        )
        .await
        .unwrap();
    assert_eq!(balance(&engine, a, "alice").await, money("70.00"));

    engine
        .update_transaction(
            tx_id,
            "alice",
            TransactionCmd::income(a, money("20.00"), day(2)).sub_category_id(groceries),
        )
        .await
        .unwrap();
    assert_eq!(balance(&engine, a, "alice").await, money("120.00"));

    let tx = engine.transaction(tx_id, "alice").await.unwrap();
    assert_eq!(
        tx.kind,
        TransactionKind::Income {
            sub_category_id: groceries
        }
    );
    assert_eq!(tx.amount, money("20.00"));
    assert_eq!(tx.occurred_at, day(2));
    assert!(tx.updated_at >= tx.created_at);

    engine.delete_transaction(tx_id, "alice").await.unwrap();
    assert_eq!(balance(&engine, a, "alice").await, money("100.00"));

    let err = engine.transaction(tx_id, "alice").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn transfer_moves_money_and_delete_restores_both() {
    let engine = fresh_engine().await;
    let a = engine.new_account("alice", "Bank", money("100.00")).await.unwrap();
    let b = engine.new_account("alice", "Savings", Money::ZERO).await.unwrap();

    let tx_id = engine
        .create_transaction(
            "alice",
            TransactionCmd::transfer(a, b, money("50.00"), day(1)),
        )
        .await
        .unwrap();
    assert_eq!(balance(&engine, a, "alice").await, money("50.00"));
    assert_eq!(balance(&engine, b, "alice").await, money("50.00"));

    engine.delete_transaction(tx_id, "alice").await.unwrap();
    assert_eq!(balance(&engine, a, "alice").await, money("100.00"));
    assert_eq!(balance(&engine, b, "alice").await, Money::ZERO);
}

#[tokio::test]
async fn update_can_move_a_transaction_between_accounts() {
    let engine = fresh_engine().await;
    let a = engine.new_account("alice", "A", money("100.00")).await.unwrap();
    let b = engine.new_account("alice", "B", money("10.00")).await.unwrap();
    let c = engine.new_account("alice", "C", Money::ZERO).await.unwrap();

    let tx_id = engine
        .create_transaction(
            "alice",
            TransactionCmd::expense(a, money("40.00"), day(1)).sub_category_id(Uuid::new_v4()),
        )
        .await
        .unwrap();

    engine
        .update_transaction(
            tx_id,
            "alice",
            TransactionCmd::transfer(b, c, money("5.00"), day(1)),
        )
        .await
        .unwrap();

    assert_eq!(balance(&engine, a, "alice").await, money("100.00"));
    assert_eq!(balance(&engine, b, "alice").await, money("5.00"));
    assert_eq!(balance(&engine, c, "alice").await, money("5.00"));
}

#[tokio::test]
async fn update_matches_direct_create() {
    let engine = fresh_engine().await;
    let a = engine.new_account("alice", "A", money("100.00")).await.unwrap();
    let b = engine.new_account("alice", "B", money("100.00")).await.unwrap();
    let sub = Uuid::new_v4();

    let tx_id = engine
        .create_transaction(
            "alice",
            TransactionCmd::expense(a, money("12.34"), day(1)).sub_category_id(sub),
        )
        .await
        .unwrap();
    engine
        .update_transaction(
            tx_id,
            "alice",
            TransactionCmd::expense(a, money("56.78"), day(1)).sub_category_id(sub),
        )
        .await
        .unwrap();

    engine
        .create_transaction(
            "alice",
            TransactionCmd::expense(b, money("56.78"), day(1)).sub_category_id(sub),
        )
        .await
        .unwrap();

    assert_eq!(
        balance(&engine, a, "alice").await,
        balance(&engine, b, "alice").await
    );
}

#[tokio::test]
async fn invalid_commands_never_reach_the_store() {
    // No migrations: any store access would fail with a storage error.
    let db = memory_db().await;
    let engine = Engine::builder().database(db).build().await.unwrap();
    let a = Uuid::new_v4();

    let cases = [
        TransactionCmd::expense(a, money("0"), day(1)).sub_category_id(Uuid::new_v4()),
        TransactionCmd::income(a, money("10"), day(1)),
        TransactionCmd::new(a, TransactionType::Transfer, money("10"), day(1)),
        TransactionCmd::transfer(a, a, money("10"), day(1)),
    ];
    for cmd in cases {
        let err = engine.create_transaction("alice", cmd.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");

        let err = engine
            .update_transaction(Uuid::new_v4(), "alice", cmd)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    }
}

#[tokio::test]
async fn foreign_accounts_and_transactions_are_not_found() {
    let engine = fresh_engine().await;
    let alice = engine.new_account("alice", "Cash", money("100.00")).await.unwrap();
    let bob = engine.new_account("bob", "Cash", money("100.00")).await.unwrap();

    let err = engine
        .create_transaction(
            "bob",
            TransactionCmd::expense(alice, money("1.00"), day(1)).sub_category_id(Uuid::new_v4()),
        )
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound(format!("account {alice}")));

    // Transfer into someone else's account leaves the source untouched.
    let err = engine
        .create_transaction("bob", TransactionCmd::transfer(bob, alice, money("1.00"), day(1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(balance(&engine, bob, "bob").await, money("100.00"));

    let tx_id = engine
        .create_transaction(
            "alice",
            TransactionCmd::income(alice, money("1.00"), day(1)).sub_category_id(Uuid::new_v4()),
        )
        .await
        .unwrap();
    let err = engine.delete_transaction(tx_id, "bob").await.unwrap_err();
    assert_eq!(err, EngineError::NotFound(format!("transaction {tx_id}")));
    let err = engine.transaction(tx_id, "bob").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(balance(&engine, alice, "alice").await, money("101.00"));
}

#[tokio::test]
async fn failed_apply_rolls_back_the_revert() {
    let engine = fresh_engine().await;
    let a = engine.new_account("alice", "Cash", money("100.00")).await.unwrap();
    let sub = Uuid::new_v4();
    let tx_id = engine
        .create_transaction(
            "alice",
            TransactionCmd::expense(a, money("30.00"), day(1)).sub_category_id(sub),
        )
        .await
        .unwrap();
    let before = engine.transaction(tx_id, "alice").await.unwrap();

    let missing = Uuid::new_v4();
    let err = engine
        .update_transaction(
            tx_id,
            "alice",
            TransactionCmd::transfer(a, missing, money("10.00"), day(2)),
        )
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound(format!("account {missing}")));

    assert_eq!(balance(&engine, a, "alice").await, money("70.00"));
    assert_eq!(engine.transaction(tx_id, "alice").await.unwrap(), before);
}

#[tokio::test]
async fn create_failing_on_destination_writes_nothing() {
    let engine = fresh_engine().await;
    let a = engine.new_account("alice", "Cash", money("100.00")).await.unwrap();

    let err = engine
        .create_transaction(
            "alice",
            TransactionCmd::transfer(a, Uuid::new_v4(), money("10.00"), day(1)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(balance(&engine, a, "alice").await, money("100.00"));
    let listed = engine
        .list_transactions("alice", &TransactionListFilter::default())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn reversal_against_vanished_account_is_an_integrity_fault() {
    let (engine, db) = engine_with_db(AccountDeletionPolicy::Restrict).await;
    let a = engine.new_account("alice", "A", money("100.00")).await.unwrap();
    let b = engine.new_account("alice", "B", Money::ZERO).await.unwrap();
    let tx_id = engine
        .create_transaction("alice", TransactionCmd::transfer(a, b, money("25.00"), day(1)))
        .await
        .unwrap();

    // Remove B behind the engine's back.
    execute(&db, "PRAGMA foreign_keys = OFF", vec![]).await;
    execute(
        &db,
        "DELETE FROM accounts WHERE id = ?",
        vec![b.to_string().into()],
    )
    .await;

    let err = engine.delete_transaction(tx_id, "alice").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);

    let err = engine
        .update_transaction(
            tx_id,
            "alice",
            TransactionCmd::income(a, money("1.00"), day(1)).sub_category_id(Uuid::new_v4()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);

    // Nothing moved on the surviving account and the record is still there.
    assert_eq!(balance(&engine, a, "alice").await, money("75.00"));
    assert!(engine.transaction(tx_id, "alice").await.is_ok());
}

#[tokio::test]
async fn list_filters_and_ordering() {
    let engine = fresh_engine().await;
    let a = engine.new_account("alice", "A", money("100.00")).await.unwrap();
    let b = engine.new_account("alice", "B", Money::ZERO).await.unwrap();
    let sub = Uuid::new_v4();

    let expense = engine
        .create_transaction(
            "alice",
            TransactionCmd::expense(a, money("1.00"), day(1))
                .sub_category_id(sub)
                .note("  coffee  "),
        )
        .await
        .unwrap();
    let transfer = engine
        .create_transaction("alice", TransactionCmd::transfer(a, b, money("2.00"), day(2)))
        .await
        .unwrap();
    let income = engine
        .create_transaction(
            "alice",
            TransactionCmd::income(b, money("3.00"), day(3)).sub_category_id(sub),
        )
        .await
        .unwrap();
    engine
        .create_transaction(
            "alice",
            TransactionCmd::income(a, money("4.00"), day(4))
                .sub_category_id(sub)
                .note("   "),
        )
        .await
        .unwrap();

    let ids = |txs: Vec<Transaction>| txs.into_iter().map(|tx| tx.id).collect::<Vec<_>>();

    let all = engine
        .list_transactions("alice", &TransactionListFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].occurred_at >= w[1].occurred_at));
    assert_eq!(all[3].note.as_deref(), Some("coffee"));
    assert_eq!(all[0].note, None);

    let on_b = engine
        .list_transactions(
            "alice",
            &TransactionListFilter {
                account_id: Some(b),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(on_b), vec![income, transfer]);

    let windowed = engine
        .list_transactions(
            "alice",
            &TransactionListFilter {
                from: Some(day(1)),
                to: Some(day(3)),
                kinds: Some(vec![TransactionType::Expense, TransactionType::Transfer]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(windowed), vec![transfer, expense]);

    let limited = engine
        .list_transactions(
            "alice",
            &TransactionListFilter {
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].occurred_at, day(4));

    let other = engine
        .list_transactions("bob", &TransactionListFilter::default())
        .await
        .unwrap();
    assert!(other.is_empty());

    let err = engine
        .list_transactions(
            "alice",
            &TransactionListFilter {
                from: Some(day(3)),
                to: Some(day(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn transaction_serializes_with_flat_type_tag() {
    let engine = fresh_engine().await;
    let a = engine.new_account("alice", "A", money("100.00")).await.unwrap();
    let b = engine.new_account("alice", "B", Money::ZERO).await.unwrap();
    let tx_id = engine
        .create_transaction("alice", TransactionCmd::transfer(a, b, money("50.00"), day(1)))
        .await
        .unwrap();

    let tx = engine.transaction(tx_id, "alice").await.unwrap();
    let value = serde_json::to_value(&tx).unwrap();
    assert_eq!(value["type"], "transfer");
    assert_eq!(value["amount"], "50.00");
    assert_eq!(value["destination_account_id"], b.to_string());
}

/// Mixed creates, updates and deletes from many tasks on one account must
/// leave the balance equal to the opening balance plus every surviving
/// transaction's effect.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_writers_never_lose_updates() {
    const TASKS: i64 = 60;

    let (engine, _db) = engine_with_db(AccountDeletionPolicy::Restrict).await;
    let engine = Arc::new(engine);
    let main = engine.new_account("alice", "Main", money("1000.00")).await.unwrap();
    let side = engine.new_account("alice", "Side", money("1000.00")).await.unwrap();
    let sub = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..TASKS {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let cents = 100 + i;
            let cmd = match i % 3 {
                0 => TransactionCmd::expense(main, Money::new(cents), day(1)).sub_category_id(sub),
                1 => TransactionCmd::income(main, Money::new(cents), day(1)).sub_category_id(sub),
                _ => TransactionCmd::transfer(main, side, Money::new(cents), day(1)),
            };
            let tx_id = engine.create_transaction("alice", cmd).await.unwrap();

            // Net effect on `main` contributed by this task.
            match i % 4 {
                0 => {
                    engine.delete_transaction(tx_id, "alice").await.unwrap();
                    (0, 0)
                }
                1 => {
                    engine
                        .update_transaction(
                            tx_id,
                            "alice",
                            TransactionCmd::income(main, Money::new(cents * 2), day(2))
                                .sub_category_id(sub),
                        )
                        .await
                        .unwrap();
                    (cents * 2, 0)
                }
                _ => match i % 3 {
                    0 => (-cents, 0),
                    1 => (cents, 0),
                    _ => (-cents, cents),
                },
            }
        }));
    }

    let (mut main_net, mut side_net) = (0i64, 0i64);
    for handle in handles {
        let (m, s) = handle.await.unwrap();
        main_net += m;
        side_net += s;
    }

    assert_eq!(
        balance(&engine, main, "alice").await,
        money("1000.00") + Money::new(main_net)
    );
    assert_eq!(
        balance(&engine, side, "alice").await,
        money("1000.00") + Money::new(side_net)
    );
    assert!(engine.recompute_balances("alice").await.unwrap().is_empty());
}

/// Same workload as above, but over a file database with a pool of eight
/// connections, where SQLite itself reports lock contention. Whatever the
/// engine commits must add up exactly; an operation that gives up must do so
/// with a storage fault and leave nothing behind.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn pooled_file_db_writers_never_lose_updates() {
    const TASKS: i64 = 64;

    let (engine, path) = engine_with_file_db(8, engine::DEFAULT_RETRY_ATTEMPTS).await;
    let engine = Arc::new(engine);
    let main = engine.new_account("alice", "Main", money("1000.00")).await.unwrap();
    let side = engine.new_account("alice", "Side", money("1000.00")).await.unwrap();
    let sub = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..TASKS {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let mut failures = Vec::new();
            let cents = 100 + i;
            let (cmd, created) = match i % 3 {
                0 => (
                    TransactionCmd::expense(main, Money::new(cents), day(1)).sub_category_id(sub),
                    (-cents, 0),
                ),
                1 => (
                    TransactionCmd::income(main, Money::new(cents), day(1)).sub_category_id(sub),
                    (cents, 0),
                ),
                _ => (
                    TransactionCmd::transfer(main, side, Money::new(cents), day(1)),
                    (-cents, cents),
                ),
            };

            let tx_id = match engine.create_transaction("alice", cmd).await {
                Ok(id) => id,
                Err(err) => {
                    failures.push(err);
                    return ((0, 0), failures);
                }
            };

            // Net effect on (`main`, `side`) of what actually committed.
            let net = if i % 2 == 0 {
                match engine.delete_transaction(tx_id, "alice").await {
                    Ok(()) => (0, 0),
                    Err(err) => {
                        failures.push(err);
                        created
                    }
                }
            } else {
                let cmd = TransactionCmd::income(main, Money::new(cents * 2), day(2))
                    .sub_category_id(sub);
                match engine.update_transaction(tx_id, "alice", cmd).await {
                    Ok(()) => (cents * 2, 0),
                    Err(err) => {
                        failures.push(err);
                        created
                    }
                }
            };
            (net, failures)
        }));
    }

    let (mut main_net, mut side_net) = (0i64, 0i64);
    let mut failures = Vec::new();
    for handle in handles {
        let ((m, s), errs) = handle.await.unwrap();
        main_net += m;
        side_net += s;
        failures.extend(errs);
    }

    for err in &failures {
        assert_eq!(err.kind(), ErrorKind::Storage, "unexpected failure: {err}");
    }
    assert!(
        failures.len() < TASKS as usize,
        "every task gave up: {failures:?}"
    );

    assert_eq!(
        balance(&engine, main, "alice").await,
        money("1000.00") + Money::new(main_net)
    );
    assert_eq!(
        balance(&engine, side, "alice").await,
        money("1000.00") + Money::new(side_net)
    );
    assert!(engine.recompute_balances("alice").await.unwrap().is_empty());

    drop(engine);
    let _ = std::fs::remove_file(path);
}
