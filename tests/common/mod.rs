#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use papyrus_search::config::{DatabaseOptions, EMBEDDING_DIM};
use papyrus_search::db::{Database, EmbeddingRepository, NeighborSearch, init_db};
use papyrus_search::embedding::EmbeddingService;
use papyrus_search::storage::BlobStore;
use papyrus_search::{Error, Result};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub async fn setup_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let pool = init_db(dir.path().join("test.db"), &DatabaseOptions::default()).await.unwrap();
    (dir, pool)
}

pub async fn setup_repo() -> (TempDir, Database, EmbeddingRepository) {
    let (dir, pool) = setup_db().await;
    let repo = EmbeddingRepository::new(pool.clone()).await.unwrap();
    (dir, pool, repo)
}

/// 用给定的前几维构造 128 维向量，其余补 0
pub fn padded(head: &[f32]) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[..head.len()].copy_from_slice(head);
    v
}

pub fn random_vector() -> Vec<f32> {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..EMBEDDING_DIM).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// 内存中的对象存储
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: std::sync::Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn with(name: &str, data: &[u8]) -> Self {
        let store = Self::default();
        store.blobs.lock().unwrap().insert(name.to_string(), data.to_vec());
        store
    }

    pub fn names(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Blob(format!("blob not found: {name}")))
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        self.blobs.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(())
    }
}

/// 返回固定向量或固定错误的向量服务
pub struct FakeEmbedder {
    response: Option<Vec<f32>>,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn ok(embedding: Vec<f32>) -> Self {
        Self { response: Some(embedding), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { response: None, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    async fn embed(&self, _image: Vec<u8>) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .clone()
            .ok_or_else(|| Error::EmbeddingService("503 Service Unavailable".to_string()))
    }
}

/// 记录调用次数的相似检索，`inner` 为空时总是失败
pub struct CountingSearch {
    inner: Option<Arc<EmbeddingRepository>>,
    pub calls: AtomicUsize,
}

impl CountingSearch {
    pub fn new(inner: Arc<EmbeddingRepository>) -> Self {
        Self { inner: Some(inner), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { inner: None, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NeighborSearch for CountingSearch {
    async fn get_k_nearest(&self, query: &[f32], k: usize) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.inner {
            Some(repo) => repo.get_k_nearest(query, k).await,
            None => Err(Error::Database(sqlx::Error::PoolTimedOut)),
        }
    }
}

/// 在随机端口上启动服务，返回基础地址
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

/// 模拟模型服务的 `/predict` 接口
///
/// 图片内容中的 `IMG:<d>` 决定返回的向量：数字 d 返回第 d 维为 1 的向量，
/// `x` 返回维度错误的向量，找不到标记时返回 500。
pub fn predict_router() -> Router {
    Router::new().route("/predict", post(predict)).route("/health", get(|| async { "ok" }))
}

async fn predict(body: Bytes) -> Response {
    let marker = body.windows(4).position(|w| w == b"IMG:").and_then(|i| body.get(i + 4));
    match marker {
        Some(b'x') => Json(json!({ "embedding": [0.1, 0.2, 0.3] })).into_response(),
        Some(d) if d.is_ascii_digit() => {
            let mut embedding = vec![0.0f32; EMBEDDING_DIM];
            embedding[(d - b'0') as usize] = 1.0;
            Json(json!({ "embedding": embedding })).into_response()
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "cannot decode image").into_response(),
    }
}
