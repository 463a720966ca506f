#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{AccountDeletionPolicy, Engine, Money};
use migration::MigratorTrait;
use uuid::Uuid;

/// One shared in-memory database: every pooled connection to
/// `sqlite::memory:` would otherwise see its own empty schema.
pub async fn memory_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    Database::connect(options).await.unwrap()
}

pub async fn engine_with_db(policy: AccountDeletionPolicy) -> (Engine, DatabaseConnection) {
    let db = memory_db().await;
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .account_deletion(policy)
        .build()
        .await
        .unwrap();
    (engine, db)
}

/// A fresh SQLite file under `target/test_dbs` and its connection URL.
pub fn test_db_path() -> (PathBuf, String) {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();
    let path = root.join(format!("engine_{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}?mode=rwc", path.display());
    (path, url)
}

/// Engine over a migrated file database served by a pool of `connections`,
/// so units really run side by side.
pub async fn engine_with_file_db(connections: u32, retry_attempts: u32) -> (Engine, PathBuf) {
    let (path, url) = test_db_path();
    let mut options = ConnectOptions::new(url);
    options
        .max_connections(connections)
        .min_connections(connections)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .retry_attempts(retry_attempts)
        .build()
        .await
        .unwrap();
    (engine, path)
}

pub async fn fresh_engine() -> Engine {
    engine_with_db(AccountDeletionPolicy::Restrict).await.0
}

pub fn money(raw: &str) -> Money {
    raw.parse().unwrap()
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, d, 12, 0, 0).unwrap()
}

pub async fn balance(engine: &Engine, account_id: Uuid, user_id: &str) -> Money {
    engine.account(account_id, user_id).await.unwrap().balance
}

pub async fn execute(db: &DatabaseConnection, sql: &str, values: Vec<sea_orm::Value>) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(backend, sql, values))
        .await
        .unwrap();
}
