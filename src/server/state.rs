use std::sync::Arc;

use crate::db::Database;
use crate::embedding::EmbeddingService;
use crate::storage::BlobStore;
use crate::task::Orchestrator;

/// 应用状态
pub struct AppState {
    /// 任务提交与状态查询
    pub orchestrator: Orchestrator,
    /// 数据库连接，用于健康检查
    pub db: Database,
    /// 上传图片的存储
    pub blobs: Arc<dyn BlobStore>,
    /// 向量计算服务，仅用于健康检查
    pub embedder: Arc<dyn EmbeddingService>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        orchestrator: Orchestrator,
        db: Database,
        blobs: Arc<dyn BlobStore>,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Arc<Self> {
        Arc::new(AppState { orchestrator, db, blobs, embedder })
    }
}
