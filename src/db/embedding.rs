use std::ops::AddAssign;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use log::{debug, error, info};
use uuid::Uuid;

use super::model::{EMBEDDING_ENTITY, EmbeddingRecord, check_dimension, decode_vector, encode_vector};
use super::repository::Repository;
use super::Database;
use crate::error::{Error, Result};
use crate::metrics;
use crate::utils::cosine_similarity;

/// 相似向量检索
#[async_trait]
pub trait NeighborSearch: Send + Sync {
    /// 按余弦相似度降序返回最多 `k` 个 url
    async fn get_k_nearest(&self, query: &[f32], k: usize) -> Result<Vec<String>>;
}

/// 批量写入的统计结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkInsertReport {
    /// 成功写入的记录数
    pub inserted: usize,
    /// 成功提交的批次数
    pub batches: usize,
    /// 失败并回滚的批次数
    pub failed_batches: usize,
}

impl AddAssign for BulkInsertReport {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
    }
}

/// 图片向量仓库
pub struct EmbeddingRepository {
    inner: Repository<EmbeddingRecord>,
}

struct Scored {
    score: f32,
    id: Uuid,
    url: String,
}

impl EmbeddingRepository {
    pub async fn new(pool: Database) -> Result<Self> {
        let inner = Repository::new(pool, &EMBEDDING_ENTITY).await?;
        Ok(Self { inner })
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<EmbeddingRecord>> {
        self.inner.get(id).await
    }

    pub async fn list(&self, offset: usize, limit: usize) -> Result<Vec<EmbeddingRecord>> {
        self.inner.list(offset, limit).await
    }

    pub async fn save(&self, record: EmbeddingRecord) -> Result<EmbeddingRecord> {
        self.inner.save(record).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<u64> {
        self.inner.delete(id).await
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM papyrus_embedding")
            .fetch_one(self.inner.pool())
            .await?;
        Ok(count)
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<EmbeddingRecord>> {
        let record = sqlx::query_as::<_, EmbeddingRecord>(
            r#"
            SELECT id, url, embedding, created_at, modified_at
            FROM papyrus_embedding WHERE url = ? ORDER BY rowid LIMIT 1
            "#,
        )
        .bind(url)
        .fetch_optional(self.inner.pool())
        .await?;
        Ok(record)
    }

    /// 更新向量，记录不存在时返回 `None`
    pub async fn update_embedding(
        &self,
        id: Uuid,
        embedding: &[f32],
    ) -> Result<Option<EmbeddingRecord>> {
        check_dimension(embedding)?;
        let record = sqlx::query_as::<_, EmbeddingRecord>(
            r#"
            UPDATE papyrus_embedding SET embedding = ?, modified_at = ?
            WHERE id = ?
            RETURNING id, url, embedding, created_at, modified_at
            "#,
        )
        .bind(encode_vector(embedding))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.inner.pool())
        .await?;
        Ok(record)
    }

    pub async fn delete_by_url(&self, url: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM papyrus_embedding WHERE url = ?")
            .bind(url)
            .execute(self.inner.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// 在一个事务中写入所有记录
    pub async fn bulk_insert(&self, mut records: Vec<EmbeddingRecord>) -> Result<usize> {
        self.inner.insert_batch(&mut records).await?;
        Ok(records.len())
    }

    /// 按 `batch_size` 分批写入
    ///
    /// 所有记录先统一校验，校验失败时不会写入任何数据。某一批写入失败只回滚该批，
    /// 其余批次照常写入，失败的批次不会重试。
    pub async fn bulk_insert_chunked(
        &self,
        records: Vec<EmbeddingRecord>,
        batch_size: usize,
    ) -> Result<BulkInsertReport> {
        if batch_size == 0 {
            return Err(Error::validation("batch size must be positive"));
        }
        for record in &records {
            check_dimension(&record.embedding)?;
        }

        let mut report = BulkInsertReport::default();
        let mut records = records;
        for (i, batch) in records.chunks_mut(batch_size).enumerate() {
            match self.inner.insert_batch(batch).await {
                Ok(()) => {
                    debug!("批次 {} 写入 {} 条记录", i, batch.len());
                    report.inserted += batch.len();
                    report.batches += 1;
                }
                Err(e) => {
                    error!("批次 {} 写入失败: {}", i, e);
                    report.failed_batches += 1;
                }
            }
        }
        Ok(report)
    }

    /// 按余弦相似度降序返回最多 `k` 条 `(相似度, url)`
    ///
    /// 相似度完全相同时按 id 升序排列。
    pub async fn k_nearest_scored(&self, query: &[f32], k: usize) -> Result<Vec<(f32, String)>> {
        check_dimension(query)?;
        if k == 0 {
            return Err(Error::validation("k must be positive"));
        }

        let start = Instant::now();
        let mut rows = sqlx::query_as::<_, (Uuid, String, Vec<u8>)>(
            "SELECT id, url, embedding FROM papyrus_embedding",
        )
        .fetch(self.inner.pool());

        let mut scored = vec![];
        while let Some((id, url, blob)) = rows.try_next().await? {
            let embedding = decode_vector(&blob).map_err(|e| sqlx::Error::ColumnDecode {
                index: "embedding".to_string(),
                source: e.into(),
            })?;
            let score = cosine_similarity(query, &embedding);
            scored.push(Scored { score, id, url });
        }
        drop(rows);

        scored.sort_unstable_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(k);

        metrics::observe_knn_duration(start.elapsed().as_secs_f64());
        for item in &scored {
            debug!("URL: {}, 相似度: {:.4}", item.url, item.score);
        }
        info!("检索完成，返回 {} 条结果", scored.len());

        Ok(scored.into_iter().map(|s| (s.score, s.url)).collect())
    }
}

#[async_trait]
impl NeighborSearch for EmbeddingRepository {
    async fn get_k_nearest(&self, query: &[f32], k: usize) -> Result<Vec<String>> {
        let result = self.k_nearest_scored(query, k).await?;
        Ok(result.into_iter().map(|(_, url)| url).collect())
    }
}
