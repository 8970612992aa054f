use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::TaskStatus;

/// 提交检索任务的参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// 已上传到对象存储的图片名称
    pub image: String,
}

/// 上传图片并提交检索任务的参数
#[derive(TryFromMultipart)]
pub struct UploadRequest {
    pub image: Bytes,
}

/// 上传表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct UploadForm {
    /// 待检索的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image: String,
}

/// 提交响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    /// 任务 ID，用于之后查询结果
    pub task_id: Uuid,
    /// 初始状态
    pub status: TaskStatus,
}

/// 任务状态响应
#[derive(Debug, Serialize, ToSchema)]
pub struct RetrieveResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    /// 未完成时为空列表，成功时为相似图片地址，失败时不返回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<String>>,
}

/// 健康检查响应，每项为 `true` 表示可用
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub storage: bool,
    pub database: bool,
    pub inference: bool,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.storage && self.database && self.inference
    }
}
