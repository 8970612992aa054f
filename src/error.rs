use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 启动时表结构校验失败，仓库不可用
    #[error("schema verification failed for the \"{table}\" repository: {source}")]
    SchemaVerification {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// 输入不合法，在入队或查询之前拒绝
    #[error("validation error: {0}")]
    Validation(String),
    /// 向量计算服务调用失败
    #[error("embedding service error: {0}")]
    EmbeddingService(String),
    #[error("unknown task: {0}")]
    UnknownTask(Uuid),
    #[error("blob store error: {0}")]
    Blob(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::EmbeddingService(err.to_string())
    }
}
