use chrono::Utc;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::db::TaskRecord;
use crate::error::Result;

// 所有状态更新都带有 `status IN ('PENDING', 'STARTED')` 条件，终态不会被覆盖

/// 创建一条 PENDING 状态的任务
pub async fn create<'c, E>(executor: E, task_id: Uuid) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO task (task_id, status, created_at, updated_at)
        VALUES (?, 'PENDING', ?, ?)
        "#,
    )
    .bind(task_id)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

/// 标记任务已开始执行，返回是否更新成功
pub async fn mark_started<'c, E>(executor: E, task_id: Uuid) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE task SET status = 'STARTED', updated_at = ?
        WHERE task_id = ? AND status IN ('PENDING', 'STARTED')
        "#,
    )
    .bind(Utc::now())
    .bind(task_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// 第一阶段完成，任务保持 STARTED 状态
pub async fn advance<'c, E>(executor: E, task_id: Uuid) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    mark_started(executor, task_id).await
}

/// 任务成功完成并写入结果
pub async fn succeed<'c, E>(executor: E, task_id: Uuid, result: &[String]) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = serde_json::to_string(result)?;
    let result = sqlx::query(
        r#"
        UPDATE task SET status = 'SUCCESS', result = ?, error = NULL, updated_at = ?
        WHERE task_id = ? AND status IN ('PENDING', 'STARTED')
        "#,
    )
    .bind(result)
    .bind(Utc::now())
    .bind(task_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// 任务失败，不保留任何中间结果
pub async fn fail<'c, E>(executor: E, task_id: Uuid, error: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE task SET status = 'FAILURE', result = NULL, error = ?, updated_at = ?
        WHERE task_id = ? AND status IN ('PENDING', 'STARTED')
        "#,
    )
    .bind(error)
    .bind(Utc::now())
    .bind(task_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get<'c, E>(executor: E, task_id: Uuid) -> Result<Option<TaskRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let record = sqlx::query_as::<_, TaskRecord>(
        r#"
        SELECT task_id, status, result, error, created_at, updated_at
        FROM task WHERE task_id = ?
        "#,
    )
    .bind(task_id)
    .fetch_optional(executor)
    .await?;
    Ok(record)
}
