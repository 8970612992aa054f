use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::cli::SubCommandExtend;
use crate::config::{EmbeddingOptions, Opts, SearchOptions};
use crate::embedding::{EmbeddingService, HttpEmbeddingService};
use crate::pipeline::Pipeline;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub embedding: EmbeddingOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的图片路径
    pub image: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let pipeline = Pipeline::open(&opts.conf_dir, &opts.database, self.search.k).await?;
        let embedder = HttpEmbeddingService::new(&self.embedding)?;

        let data = tokio::fs::read(&self.image).await?;
        let embedding = embedder.embed(data).await?;
        let result = pipeline.repository.k_nearest_scored(&embedding, self.search.k).await?;

        print_result(&result, self)
    }
}

fn print_result(result: &[(f32, String)], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for (k, v) in result {
                println!("{:.4}\t{}", k, v);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
