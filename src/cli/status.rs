use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use uuid::Uuid;

use crate::cli::SubCommandExtend;
use crate::config::{DEFAULT_K, Opts};
use crate::pipeline::Pipeline;

#[derive(Parser, Debug, Clone)]
pub struct StatusCommand {
    /// 任务 ID
    pub task_id: Uuid,
    /// 等待任务结束的最长时间，单位为秒，0 表示只查询一次
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    pub wait: u64,
}

impl SubCommandExtend for StatusCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let pipeline = Pipeline::open(&opts.conf_dir, &opts.database, DEFAULT_K).await?;
        let state = pipeline
            .orchestrator
            .wait(self.task_id, Duration::from_millis(500), Duration::from_secs(self.wait))
            .await?;
        println!("{}", serde_json::to_string_pretty(&state)?);
        Ok(())
    }
}
