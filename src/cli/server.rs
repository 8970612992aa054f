use std::sync::Arc;

use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::cli::SubCommandExtend;
use crate::config::{EmbeddingOptions, SearchOptions, StorageOptions, WorkerOptions};
use crate::pipeline::Pipeline;
use crate::task::spawn_workers;
use crate::{Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    #[command(flatten)]
    pub embedding: EmbeddingOptions,
    #[command(flatten)]
    pub storage: StorageOptions,
    #[command(flatten)]
    pub worker: WorkerOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 不在服务进程内启动 worker，任务交由独立的 worker 进程执行
    #[arg(long)]
    pub no_worker: bool,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = Pipeline::open(&opts.conf_dir, &opts.database, self.search.k).await?;

        let blobs = Pipeline::blob_store(&self.storage)?;
        let embedder = Pipeline::embedder(&self.embedding)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = if self.no_worker {
            vec![]
        } else {
            let worker = pipeline.worker(blobs.clone(), embedder.clone(), &self.worker);
            spawn_workers(Arc::new(worker), shutdown_rx)
        };

        // 创建应用状态，上传的图片与 worker 共用同一个存储
        let state = server::AppState::new(
            pipeline.orchestrator.clone(),
            pipeline.pool.clone(),
            blobs,
            embedder,
        );

        // 创建应用
        let app = server::create_app(state);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;

        info!("等待 worker 停止");
        let _ = shutdown_tx.send(true);
        for handle in handles {
            handle.await?;
        }

        Ok(())
    }
}
