use std::time::Duration;

use chrono::Utc;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::db::{QueueMessage, StagePayload};
use crate::error::Result;

/// 添加一条阶段消息
pub async fn enqueue<'c, E>(executor: E, task_id: Uuid, payload: &StagePayload) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let stage = payload.stage().as_i64();
    let payload = serde_json::to_string(payload)?;
    let (seq,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO task_queue (task_id, stage, payload)
        VALUES (?, ?, ?)
        RETURNING seq
        "#,
    )
    .bind(task_id)
    .bind(stage)
    .bind(payload)
    .fetch_one(executor)
    .await?;
    Ok(seq)
}

/// 领取最早的一条未被领取或租约已过期的消息
///
/// 领取与设置租约在同一条语句中完成，worker 崩溃后消息会在租约到期后被重新投递。
pub async fn claim<'c, E>(executor: E, lease: Duration) -> Result<Option<QueueMessage>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let now = Utc::now().timestamp_millis();
    let lease_until = now + lease.as_millis() as i64;
    let message = sqlx::query_as::<_, QueueMessage>(
        r#"
        UPDATE task_queue
        SET lease_until = ?, attempts = attempts + 1
        WHERE seq = (
            SELECT seq FROM task_queue
            WHERE lease_until IS NULL OR lease_until < ?
            ORDER BY seq ASC LIMIT 1
        )
        RETURNING seq, task_id, payload, attempts
        "#,
    )
    .bind(lease_until)
    .bind(now)
    .fetch_optional(executor)
    .await?;
    Ok(message)
}

/// 确认消息已处理完成
pub async fn ack<'c, E>(executor: E, seq: i64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("DELETE FROM task_queue WHERE seq = ?").bind(seq).execute(executor).await?;
    Ok(())
}

/// 队列中剩余的消息数量，包括已领取未确认的
pub async fn count<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM task_queue").fetch_one(executor).await?;
    Ok(count)
}
