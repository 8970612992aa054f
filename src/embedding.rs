use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::{EMBEDDING_DIM, EmbeddingOptions};
use crate::error::{Error, Result};

/// 向量计算服务：输入图片字节，返回固定维度的向量
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, image: Vec<u8>) -> Result<Vec<f32>>;

    /// 健康检查，默认总是可用
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    embedding: Vec<f32>,
}

/// 通过 HTTP 调用模型服务的 `/predict` 接口
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
}

impl HttpEmbeddingService {
    pub fn new(opts: &EmbeddingOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(opts.inference_timeout))
            .build()?;
        let base_url = opts.inference_url.trim_end_matches('/').to_string();
        let endpoint = format!("{base_url}/predict");
        Ok(Self { client, base_url, endpoint })
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, image: Vec<u8>) -> Result<Vec<f32>> {
        let part = Part::bytes(image).file_name("image.jpg").mime_str("image/jpeg")?;
        let form = Form::new().part("request", part);

        debug!("请求向量计算服务: {}", self.endpoint);
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("向量计算服务返回错误 {}: {}", status, body);
            return Err(Error::EmbeddingService(format!("{status}: {body}")));
        }

        let PredictResponse { embedding } = response.json().await?;
        if embedding.len() != EMBEDDING_DIM {
            return Err(Error::EmbeddingService(format!(
                "expected {} dimensions, got {}",
                EMBEDDING_DIM,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    /// 模型服务的 `/health` 返回 2xx 即视为可用
    async fn ping(&self) -> Result<()> {
        let response = self.client.get(format!("{}/health", self.base_url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::EmbeddingService(format!("health check returned {status}")));
        }
        Ok(())
    }
}
