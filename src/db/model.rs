use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Row, Sqlite};
use uuid::Uuid;

use super::repository::{Entity, EntityDescriptor};
use crate::config::EMBEDDING_DIM;
use crate::error::{Error, Result};

/// 图片向量记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// 记录 ID，创建后不可变
    pub id: Uuid,
    /// 图片来源地址
    pub url: String,
    /// 128 维向量
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    /// 创建一条新记录，时间戳会在写入时由仓库重新设置
    pub fn new(url: impl Into<String>, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(), url: url.into(), embedding, created_at: now, modified_at: now }
    }
}

pub static EMBEDDING_ENTITY: EntityDescriptor<EmbeddingRecord> = EntityDescriptor::new(
    "papyrus_embedding",
    &["id", "url", "embedding", "created_at", "modified_at"],
    &["id", "created_at"],
);

impl Entity for EmbeddingRecord {
    fn validate(&self) -> Result<()> {
        check_dimension(&self.embedding)
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.modified_at = now;
    }

    fn bind<'q>(
        &'q self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        query
            .bind(self.id)
            .bind(self.url.as_str())
            .bind(encode_vector(&self.embedding))
            .bind(self.created_at)
            .bind(self.modified_at)
    }
}

impl<'r> FromRow<'r, SqliteRow> for EmbeddingRecord {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let blob: Vec<u8> = row.try_get("embedding")?;
        let embedding = decode_vector(&blob).map_err(|e| sqlx::Error::ColumnDecode {
            index: "embedding".to_string(),
            source: e.into(),
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            embedding,
            created_at: row.try_get("created_at")?,
            modified_at: row.try_get("modified_at")?,
        })
    }
}

/// 检查向量维度和取值
pub fn check_dimension(vector: &[f32]) -> Result<()> {
    if vector.len() != EMBEDDING_DIM {
        return Err(Error::validation(format!(
            "embedding must have {} dimensions, got {}",
            EMBEDDING_DIM,
            vector.len()
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(Error::validation("embedding contains NaN or infinite values"));
    }
    Ok(())
}

/// 将向量编码为小端序字节
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut buf = vec![0u8; vector.len() * 4];
    LittleEndian::write_f32_into(vector, &mut buf);
    buf
}

/// 从小端序字节解码向量
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, String> {
    if bytes.len() != EMBEDDING_DIM * 4 {
        return Err(format!("expected {} bytes, got {}", EMBEDDING_DIM * 4, bytes.len()));
    }
    let mut vector = vec![0f32; EMBEDDING_DIM];
    LittleEndian::read_f32_into(bytes, &mut vector);
    Ok(vector)
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "STARTED" => Ok(Self::Started),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            _ => Err(format!("unknown task status: {s}")),
        }
    }
}

/// 任务记录
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub status: TaskStatus,
    /// 仅在 SUCCESS 时存在
    pub result: Option<Vec<String>>,
    /// 失败原因，仅在 FAILURE 时存在
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for TaskRecord {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let status = status.parse::<TaskStatus>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: e.into(),
        })?;
        let result: Option<String> = row.try_get("result")?;
        let result = result
            .map(|s| serde_json::from_str::<Vec<String>>(&s))
            .transpose()
            .map_err(|e| sqlx::Error::ColumnDecode { index: "result".to_string(), source: e.into() })?;
        Ok(Self {
            task_id: row.try_get("task_id")?,
            status,
            result,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// 任务链中的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// 计算图片向量
    ComputeEmbedding,
    /// 检索相似图片
    RetrieveSimilar,
}

impl Stage {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::ComputeEmbedding => 1,
            Self::RetrieveSimilar => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ComputeEmbedding => "compute_embedding",
            Self::RetrieveSimilar => "retrieve_similar",
        }
    }
}

/// 阶段输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    /// `k` 原样传递给第二阶段
    ComputeEmbedding { image: String, k: usize },
    RetrieveSimilar { embedding: Vec<f32>, k: usize },
}

impl StagePayload {
    pub fn stage(&self) -> Stage {
        match self {
            Self::ComputeEmbedding { .. } => Stage::ComputeEmbedding,
            Self::RetrieveSimilar { .. } => Stage::RetrieveSimilar,
        }
    }
}

/// 队列中的一条消息，`payload` 保留原始 JSON，由 worker 解码
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub seq: i64,
    pub task_id: Uuid,
    pub payload: String,
    /// 已投递次数，包含本次
    pub attempts: i64,
}

impl QueueMessage {
    pub fn decode(&self) -> Result<StagePayload> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

impl<'r> FromRow<'r, SqliteRow> for QueueMessage {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            seq: row.try_get("seq")?,
            task_id: row.try_get("task_id")?,
            payload: row.try_get("payload")?,
            attempts: row.try_get("attempts")?,
        })
    }
}
