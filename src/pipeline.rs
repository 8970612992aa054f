use std::sync::Arc;

use crate::config::{ConfDir, DatabaseOptions, EmbeddingOptions, StorageOptions, WorkerOptions};
use crate::db::{Database, EmbeddingRepository, init_db};
use crate::embedding::{EmbeddingService, HttpEmbeddingService};
use crate::error::Result;
use crate::storage::{BlobStore, LocalBlobStore};
use crate::task::{Orchestrator, Stages, Worker};

/// 进程启动时构建的全部组件
pub struct Pipeline {
    pub pool: Database,
    pub repository: Arc<EmbeddingRepository>,
    pub orchestrator: Orchestrator,
}

impl Pipeline {
    /// 打开数据库并校验表结构，校验失败时返回错误，不提供任何服务
    pub async fn open(conf_dir: &ConfDir, database: &DatabaseOptions, k: usize) -> Result<Self> {
        std::fs::create_dir_all(conf_dir.path())?;
        let pool = init_db(conf_dir.database(), database).await?;
        Self::from_pool(pool, k).await
    }

    pub async fn from_pool(pool: Database, k: usize) -> Result<Self> {
        let repository = Arc::new(EmbeddingRepository::new(pool.clone()).await?);
        let orchestrator = Orchestrator::new(pool.clone(), k)?;
        Ok(Self { pool, repository, orchestrator })
    }

    /// 本地图片目录，不存在时自动创建
    pub fn blob_store(storage: &StorageOptions) -> Result<Arc<dyn BlobStore>> {
        let store = LocalBlobStore::new(storage);
        std::fs::create_dir_all(store.root())?;
        Ok(Arc::new(store))
    }

    pub fn embedder(embedding: &EmbeddingOptions) -> Result<Arc<dyn EmbeddingService>> {
        Ok(Arc::new(HttpEmbeddingService::new(embedding)?))
    }

    pub fn worker(
        &self,
        blobs: Arc<dyn BlobStore>,
        embedder: Arc<dyn EmbeddingService>,
        opts: &WorkerOptions,
    ) -> Worker {
        let stages = Stages::new(blobs, embedder, self.repository.clone());
        Worker::new(self.pool.clone(), stages, opts)
    }
}
