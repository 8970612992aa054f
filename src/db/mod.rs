use std::path::Path;

use log::info;
use sqlx::{SqlitePool, sqlite::*};

use crate::config::DatabaseOptions;
use crate::error::Result;

mod embedding;
pub mod model;
mod repository;

pub use embedding::*;
pub use model::*;
pub use repository::*;

pub type Database = SqlitePool;

/// 打开数据库连接池，不执行迁移
pub async fn connect(filename: impl AsRef<Path>, opts: &DatabaseOptions) -> Result<Database> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let journal_mode = if opts.no_wal { SqliteJournalMode::Delete } else { SqliteJournalMode::Wal };
    let options = SqliteConnectOptions::new()
        .journal_mode(journal_mode)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(opts.max_connections)
        .acquire_timeout(opts.acquire_timeout())
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// 打开数据库连接池并执行迁移
pub async fn init_db(filename: impl AsRef<Path>, opts: &DatabaseOptions) -> Result<Database> {
    let pool = connect(filename, opts).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// 健康检查
pub async fn ping(pool: &Database) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
