use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::stages::Stages;
use super::{queue, store};
use crate::config::WorkerOptions;
use crate::db::{Database, QueueMessage, StagePayload};
use crate::error::Result;
use crate::metrics;

/// 从队列领取消息并执行对应阶段
///
/// worker 与提交方之间只通过数据库中的队列和任务表通信。
pub struct Worker {
    pool: Database,
    stages: Stages,
    opts: WorkerOptions,
}

impl Worker {
    pub fn new(pool: Database, stages: Stages, opts: &WorkerOptions) -> Self {
        Self { pool, stages, opts: opts.clone() }
    }

    /// 处理一条消息，队列为空时返回 `false`
    pub async fn run_once(&self) -> Result<bool> {
        let Some(message) = queue::claim(&self.pool, self.opts.lease()).await? else {
            return Ok(false);
        };
        let task_id = message.task_id;
        if message.attempts > 1 {
            warn!("任务 {} 的消息 {} 被重新投递，第 {} 次", task_id, message.seq, message.attempts);
        }

        match store::get(&self.pool, task_id).await? {
            Some(task) if !task.status.is_terminal() => {}
            Some(task) => {
                debug!("任务 {} 已处于 {} 状态，跳过", task_id, task.status);
                queue::ack(&self.pool, message.seq).await?;
                return Ok(true);
            }
            None => {
                warn!("任务 {} 不存在，丢弃消息 {}", task_id, message.seq);
                queue::ack(&self.pool, message.seq).await?;
                return Ok(true);
            }
        }

        // 无法解析的消息重新投递也不会成功，直接结束任务
        let payload = match message.decode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("任务 {} 的消息 {} 无法解析: {}", task_id, message.seq, e);
                let mut tx = self.pool.begin().await?;
                store::fail(&mut *tx, task_id, &e.to_string()).await?;
                queue::ack(&mut *tx, message.seq).await?;
                tx.commit().await?;
                return Ok(true);
            }
        };

        self.execute(&message, payload).await?;
        Ok(true)
    }

    async fn execute(&self, message: &QueueMessage, payload: StagePayload) -> Result<()> {
        let task_id = message.task_id;
        let stage = payload.stage();
        let start = Instant::now();

        match payload {
            StagePayload::ComputeEmbedding { image, k } => {
                store::mark_started(&self.pool, task_id).await?;
                info!("任务 {} 开始计算向量: {}", task_id, image);

                let result = self.stages.compute_embedding(&image).await;
                metrics::observe_stage(stage.name(), result.is_ok(), start.elapsed().as_secs_f64());

                let mut tx = self.pool.begin().await?;
                match result {
                    Ok(embedding) => {
                        let next = StagePayload::RetrieveSimilar { embedding, k };
                        queue::enqueue(&mut *tx, task_id, &next).await?;
                        store::advance(&mut *tx, task_id).await?;
                        debug!("任务 {} 进入检索阶段", task_id);
                    }
                    Err(e) => {
                        error!("任务 {} 计算向量失败: {}", task_id, e);
                        store::fail(&mut *tx, task_id, &e.to_string()).await?;
                    }
                }
                queue::ack(&mut *tx, message.seq).await?;
                tx.commit().await?;
            }
            StagePayload::RetrieveSimilar { embedding, k } => {
                let result = self.stages.retrieve_similar(&embedding, k).await;
                metrics::observe_stage(stage.name(), result.is_ok(), start.elapsed().as_secs_f64());

                let mut tx = self.pool.begin().await?;
                match result {
                    Ok(urls) => {
                        store::succeed(&mut *tx, task_id, &urls).await?;
                        info!("任务 {} 完成，结果: {:?}", task_id, urls);
                    }
                    Err(e) => {
                        error!("任务 {} 检索失败: {}", task_id, e);
                        store::fail(&mut *tx, task_id, &e.to_string()).await?;
                    }
                }
                queue::ack(&mut *tx, message.seq).await?;
                tx.commit().await?;
            }
        }
        Ok(())
    }

    /// 持续处理消息直到收到停止信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.opts.poll_interval();
        while !*shutdown.borrow() {
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                // 消息保持租约状态，到期后重新投递
                Err(e) => error!("处理消息失败: {}", e),
            }
            tokio::select! {
                _ = sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("worker 已停止");
    }
}

/// 启动 `opts.concurrency` 个 worker
pub fn spawn_workers(worker: Arc<Worker>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let n = worker.opts.concurrency.max(1);
    info!("启动 {} 个 worker", n);
    (0..n)
        .map(|_| {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        })
        .collect()
}
