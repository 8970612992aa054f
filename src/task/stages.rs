use std::sync::Arc;

use log::debug;

use crate::db::{NeighborSearch, check_dimension};
use crate::embedding::EmbeddingService;
use crate::error::{Error, Result};
use crate::storage::BlobStore;

/// 任务链的两个阶段，均为无副作用的读取和计算，可安全重复执行
#[derive(Clone)]
pub struct Stages {
    blobs: Arc<dyn BlobStore>,
    embedder: Arc<dyn EmbeddingService>,
    search: Arc<dyn NeighborSearch>,
}

impl Stages {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        embedder: Arc<dyn EmbeddingService>,
        search: Arc<dyn NeighborSearch>,
    ) -> Self {
        Self { blobs, embedder, search }
    }

    /// 从对象存储读取图片并计算向量
    pub async fn compute_embedding(&self, image: &str) -> Result<Vec<f32>> {
        let data = self.blobs.get(image).await?;
        debug!("图片 {} 大小 {} 字节", image, data.len());
        let embedding = self.embedder.embed(data).await?;
        check_dimension(&embedding).map_err(|e| Error::EmbeddingService(e.to_string()))?;
        Ok(embedding)
    }

    /// 检索最相似的 `k` 张图片
    pub async fn retrieve_similar(&self, embedding: &[f32], k: usize) -> Result<Vec<String>> {
        if k == 0 {
            return Err(Error::validation("k must be positive"));
        }
        self.search.get_k_nearest(embedding, k).await
    }
}
