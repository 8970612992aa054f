use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Sqlite};
use uuid::Uuid;

use super::Database;
use crate::error::{Error, Result};

/// 可由 [`Repository`] 持久化的实体
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
    /// 写入前的边界检查
    fn validate(&self) -> Result<()>;

    /// 写入前设置时间戳
    fn stamp(&mut self, now: DateTime<Utc>);

    /// 按 [`EntityDescriptor::columns`] 的顺序绑定所有列
    fn bind<'q>(
        &'q self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>>;
}

/// 实体的表结构描述，同时作为实体类型的标记
///
/// 主键列固定为 `columns[0]`。
pub struct EntityDescriptor<E> {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    /// upsert 时不会被覆盖的列
    pub insert_only: &'static [&'static str],
    _entity: PhantomData<fn() -> E>,
}

impl<E> EntityDescriptor<E> {
    pub const fn new(
        table: &'static str,
        columns: &'static [&'static str],
        insert_only: &'static [&'static str],
    ) -> Self {
        Self { table, columns, insert_only, _entity: PhantomData }
    }

    pub fn key(&self) -> &'static str {
        self.columns[0]
    }

    fn column_list(&self) -> String {
        self.columns.join(", ")
    }

    fn select_sql(&self) -> String {
        format!("SELECT {} FROM {}", self.column_list(), self.table)
    }

    fn upsert_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        let updates = self
            .columns
            .iter()
            .filter(|c| !self.insert_only.contains(c))
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders}) \
             ON CONFLICT({key}) DO UPDATE SET {updates} \
             RETURNING {columns}",
            table = self.table,
            columns = self.column_list(),
            key = self.key(),
        )
    }

    fn insert_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", self.table, self.column_list(), placeholders)
    }
}

/// 通用实体仓库
///
/// 每个操作都从连接池中取出连接，语句执行结束（包括出错）后立即归还，
/// 多语句操作使用事务，未提交的事务在 drop 时回滚。
pub struct Repository<E: 'static> {
    pool: Database,
    entity: &'static EntityDescriptor<E>,
}

impl<E: Entity> Repository<E> {
    /// 创建仓库并校验表结构，校验失败则不会返回仓库实例
    pub async fn new(pool: Database, entity: &'static EntityDescriptor<E>) -> Result<Self> {
        let repo = Self { pool, entity };
        repo.verify_schema().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &Database {
        &self.pool
    }

    /// 读取一条记录，确认表和列都存在且能被解码
    async fn verify_schema(&self) -> Result<()> {
        let table = self.entity.table;
        debug!("正在校验 \"{}\" 表结构", table);
        let sql = format!("{} LIMIT 1", self.entity.select_sql());
        sqlx::query_as::<_, E>(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| Error::SchemaVerification { table, source })?;
        info!("\"{}\" 表结构校验完成", table);
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<E>> {
        let sql = format!("{} WHERE {} = ?", self.entity.select_sql(), self.entity.key());
        let record = sqlx::query_as::<_, E>(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(record)
    }

    /// 按插入顺序分页列出记录
    pub async fn list(&self, offset: usize, limit: usize) -> Result<Vec<E>> {
        let sql = format!("{} ORDER BY rowid LIMIT ? OFFSET ?", self.entity.select_sql());
        let records = sqlx::query_as::<_, E>(&sql)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// 插入或整体替换一条记录，返回写入后的记录
    ///
    /// `insert_only` 中的列（如创建时间）在替换时保留原值。
    pub async fn save(&self, mut record: E) -> Result<E> {
        record.validate()?;
        record.stamp(Utc::now());
        let sql = self.entity.upsert_sql();
        let saved = record.bind(sqlx::query(&sql)).fetch_one(&self.pool).await?;
        Ok(E::from_row(&saved)?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", self.entity.table, self.entity.key());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// 在一个事务中插入一批记录，任意一条失败则整批回滚
    pub async fn insert_batch(&self, records: &mut [E]) -> Result<()> {
        for record in records.iter() {
            record.validate()?;
        }

        let now = Utc::now();
        let sql = self.entity.insert_sql();
        let mut tx = self.pool.begin().await?;
        for record in records.iter_mut() {
            record.stamp(now);
            record.bind(sqlx::query(&sql)).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
