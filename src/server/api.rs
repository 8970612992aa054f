use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum_typed_multipart::TypedMultipart;
use log::{info, warn};
use uuid::Uuid;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::db::{TaskStatus, ping};
use crate::{Error, metrics};

/// 提交检索任务，立即返回任务 ID
#[utoipa::path(
    post,
    path = "/papyrus/submit",
    request_body = SubmitRequest,
    responses(
        (status = 200, body = SubmitResponse),
        (status = 400, description = "图片名称不合法"),
    )
)]
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>> {
    let handle = state.orchestrator.submit(&data.image).await?;
    Ok(Json(SubmitResponse { task_id: handle.task_id, status: TaskStatus::Pending }))
}

/// 上传图片并提交检索任务
///
/// 图片以随机生成的名称写入存储后再提交，与 `/papyrus/submit` 返回相同的响应。
#[utoipa::path(
    post,
    path = "/papyrus/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = SubmitResponse),
        (status = 400, description = "图片为空"),
    )
)]
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<UploadRequest>,
) -> Result<Json<SubmitResponse>> {
    if data.image.is_empty() {
        return Err(Error::validation("image is empty").into());
    }
    let name = format!("{}.jpg", Uuid::new_v4());
    state.blobs.put(&name, &data.image).await?;
    info!("已保存上传图片: {} ({} bytes)", name, data.image.len());

    let handle = state.orchestrator.submit(&name).await?;
    Ok(Json(SubmitResponse { task_id: handle.task_id, status: TaskStatus::Pending }))
}

/// 查询任务状态和结果
#[utoipa::path(
    get,
    path = "/papyrus/result/{task_id}",
    params(("task_id" = Uuid, Path, description = "任务 ID")),
    responses(
        (status = 200, body = RetrieveResponse),
        (status = 404, description = "任务不存在"),
    )
)]
pub async fn result_handler(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<RetrieveResponse>> {
    let task = state.orchestrator.get_status(task_id).await?;
    let result = match task.status {
        TaskStatus::Pending | TaskStatus::Started => Some(vec![]),
        TaskStatus::Success => task.result,
        TaskStatus::Failure => {
            info!("任务 {} 已失败", task_id);
            None
        }
    };
    Ok(Json(RetrieveResponse { task_id, status: task.status, result }))
}

/// 健康检查
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, body = HealthResponse),
        (status = 503, body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (storage, database, inference) =
        tokio::join!(state.blobs.ping(), ping(&state.db), state.embedder.ping());
    for (name, result) in [("storage", &storage), ("database", &database), ("inference", &inference)] {
        if let Err(e) = result {
            warn!("健康检查失败 {}: {}", name, e);
        }
    }

    let health = HealthResponse {
        storage: storage.is_ok(),
        database: database.is_ok(),
        inference: inference.is_ok(),
    };
    let status = if health.is_ok() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(health))
}

/// Prometheus 指标
pub async fn metrics_handler() -> String {
    metrics::gather_text()
}
