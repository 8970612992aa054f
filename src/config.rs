use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

/// 向量维度
pub const EMBEDDING_DIM: usize = 128;
/// 批量写入时每批的记录数
pub const DEFAULT_BATCH_SIZE: usize = 30;
/// 默认只返回最相似的一张图片
pub const DEFAULT_K: usize = 1;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs =
        ProjectDirs::from("", "papyrus", "papyrus-search").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap_or(".")
}

#[derive(Parser, Debug, Clone)]
pub struct DatabaseOptions {
    /// 连接池最大连接数
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub max_connections: u32,
    /// 获取连接的超时时间，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub acquire_timeout: u64,
    /// 关闭 WAL 模式
    #[arg(long)]
    pub no_wal: bool,
}

impl DatabaseOptions {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout)
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self { max_connections: 8, acquire_timeout: 30, no_wal: false }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct EmbeddingOptions {
    /// 向量计算服务地址
    #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:8001")]
    pub inference_url: String,
    /// 请求超时时间，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub inference_timeout: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct StorageOptions {
    /// 图片存储目录，提交的任务通过文件名引用其中的图片
    #[arg(long, value_name = "DIR", default_value = "images")]
    pub blob_dir: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct WorkerOptions {
    /// 并发执行任务的 worker 数量
    #[arg(long, value_name = "N", default_value_t = num_cpus::get())]
    pub concurrency: usize,
    /// 队列为空时的轮询间隔，单位为毫秒
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub poll_interval: u64,
    /// 任务租约时长，超时未确认的消息会被重新投递，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub lease: u64,
}

impl WorkerOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease)
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { concurrency: 1, poll_interval: 200, lease: 300 }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 返回的最相似图片数量
    #[arg(short, value_name = "K", default_value_t = DEFAULT_K)]
    pub k: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "papyrus-search", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 配置文件目录，数据库文件保存在此处
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
    #[command(flatten)]
    pub database: DatabaseOptions,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 批量计算图片向量并写入数据库
    Add(AddCommand),
    /// 从数据库中搜索与本地图片最相似的图片
    Search(SearchCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
    /// 仅启动任务 worker
    Worker(WorkerCommand),
    /// 查询任务状态
    Status(StatusCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("papyrus.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
