use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::sync::watch;

use crate::cli::SubCommandExtend;
use crate::config::{DEFAULT_K, EmbeddingOptions, Opts, StorageOptions, WorkerOptions};
use crate::pipeline::Pipeline;
use crate::task::spawn_workers;

#[derive(Parser, Debug, Clone)]
pub struct WorkerCommand {
    #[command(flatten)]
    pub embedding: EmbeddingOptions,
    #[command(flatten)]
    pub storage: StorageOptions,
    #[command(flatten)]
    pub worker: WorkerOptions,
}

impl SubCommandExtend for WorkerCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        // k 由提交方决定，worker 只读取消息中的值
        let pipeline = Pipeline::open(&opts.conf_dir, &opts.database, DEFAULT_K).await?;
        let blobs = Pipeline::blob_store(&self.storage)?;
        let embedder = Pipeline::embedder(&self.embedding)?;
        let worker = Arc::new(pipeline.worker(blobs, embedder, &self.worker));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = spawn_workers(worker, shutdown_rx);

        tokio::signal::ctrl_c().await?;
        info!("收到退出信号，等待 worker 停止");
        let _ = shutdown_tx.send(true);
        for handle in handles {
            handle.await?;
        }
        Ok(())
    }
}
