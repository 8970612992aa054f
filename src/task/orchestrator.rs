use std::time::Duration;

use log::info;
use serde::Serialize;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use super::{queue, store};
use crate::db::{Database, StagePayload, TaskStatus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::storage::validate_blob_name;

/// 提交后立即返回的任务句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskHandle {
    pub task_id: Uuid,
}

/// 对外可见的任务状态，`result` 仅在 SUCCESS 时存在
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub result: Option<Vec<String>>,
}

/// 负责提交任务链和查询任务状态，不执行任何阶段
#[derive(Clone)]
pub struct Orchestrator {
    pool: Database,
    k: usize,
}

impl Orchestrator {
    pub fn new(pool: Database, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::validation("k must be positive"));
        }
        Ok(Self { pool, k })
    }

    /// 提交一条检索任务链
    ///
    /// 图片名称不合法时直接拒绝，不会写入任何数据。任务记录和第一阶段消息在同一个事务中写入，
    /// 调用方不等待任何阶段执行。
    pub async fn submit(&self, image: &str) -> Result<TaskHandle> {
        validate_blob_name(image)?;

        let task_id = Uuid::new_v4();
        let payload = StagePayload::ComputeEmbedding { image: image.to_string(), k: self.k };

        let mut tx = self.pool.begin().await?;
        store::create(&mut *tx, task_id).await?;
        queue::enqueue(&mut *tx, task_id, &payload).await?;
        tx.commit().await?;

        metrics::inc_task_submitted();
        info!("已提交任务 {}: {}", task_id, image);
        Ok(TaskHandle { task_id })
    }

    /// 查询任务状态，可重复调用
    pub async fn get_status(&self, task_id: Uuid) -> Result<TaskState> {
        let task = store::get(&self.pool, task_id).await?.ok_or(Error::UnknownTask(task_id))?;
        let result = match task.status {
            TaskStatus::Success => Some(task.result.unwrap_or_default()),
            _ => None,
        };
        Ok(TaskState { status: task.status, result })
    }

    /// 轮询直到任务进入终态，超时后返回最后一次查询到的状态
    pub async fn wait(
        &self,
        task_id: Uuid,
        interval: Duration,
        timeout: Duration,
    ) -> Result<TaskState> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.get_status(task_id).await?;
            if state.status.is_terminal() || Instant::now() >= deadline {
                return Ok(state);
            }
            sleep(interval).await;
        }
    }
}
