use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use regex::Regex;
use tasks::*;

mod tasks;

use crate::cli::SubCommandExtend;
use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_K, EmbeddingOptions, Opts};
use crate::embedding::HttpEmbeddingService;
use crate::pipeline::Pipeline;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub embedding: EmbeddingOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png")]
    pub suffix: String,
    /// 图片来源地址模板，`{name}` 会被替换为文件名中第一个下划线之后、扩展名之前的部分
    #[arg(
        long,
        value_name = "TEMPLATE",
        default_value = "https://digi.ub.uni-heidelberg.de/diglit/{name}/0001/_image"
    )]
    pub url_template: String,
    /// 每批写入数据库的记录数
    #[arg(long, value_name = "SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// 同时请求向量计算服务的数量
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub concurrency: usize,
    /// 如果图片地址已存在，是否覆盖旧的向量
    #[arg(long)]
    pub overwrite: bool,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let re_suf = format!("(?i)^({})$", self.suffix.replace(',', "|"));
        let re_suf = Regex::new(&re_suf)?;

        let pipeline = Pipeline::open(&opts.conf_dir, &opts.database, DEFAULT_K).await?;
        let repo = pipeline.repository.clone();
        let embedder = Arc::new(HttpEmbeddingService::new(&self.embedding)?);

        let pb = ProgressBar::no_length().with_style(pb_style());

        let (t1, rx) = task_scan(self.path.clone(), re_suf, self.url_template.clone(), pb.clone());
        let (t2, rx) = task_filter(rx, repo.clone(), self.overwrite, pb.clone());
        let (t3, rx) = task_embed(rx, embedder, self.concurrency.max(1), pb.clone());
        let t4 = task_insert(rx, repo, self.batch_size.max(1), pb.clone());

        // 等待所有任务完成
        let (_, _, _, report) = tokio::try_join!(t1, t2, t3, t4)?;

        pb.finish_with_message("图片添加完成");
        info!(
            "共写入 {} 条记录，成功 {} 批，失败 {} 批",
            report.inserted, report.batches, report.failed_batches
        );

        Ok(())
    }
}
