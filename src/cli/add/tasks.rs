use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use indicatif::ProgressBar;
use log::{info, warn};
use regex::Regex;
use tokio::sync::mpsc::{Receiver, channel};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use crate::db::{BulkInsertReport, EmbeddingRecord, EmbeddingRepository};
use crate::embedding::EmbeddingService;
use crate::utils::url_from_filename;

/// 待处理的图片文件
pub struct ImageFile {
    pub path: PathBuf,
    pub url: String,
}

pub fn task_scan(
    path: PathBuf,
    regex_suf: Regex,
    url_template: String,
    pb: ProgressBar,
) -> (JoinHandle<()>, Receiver<ImageFile>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = tokio::spawn(async move {
        info!("开始扫描目录: {}", path.display());
        let entries = WalkDir::new(&path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|ext| regex_suf.is_match(&ext.to_string_lossy()))
            })
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();
        info!("扫描完成，共 {} 张图片", entries.len());
        pb.set_length(entries.len() as u64);

        for path in entries {
            let filename = path.file_name().map(|s| s.to_string_lossy().to_string());
            let Some(url) = filename.as_deref().and_then(|f| url_from_filename(f, &url_template))
            else {
                pb.println(format!("无法从文件名生成地址，跳过: {}", path.display()));
                pb.inc(1);
                continue;
            };
            if tx.send(ImageFile { path, url }).await.is_err() {
                break;
            }
        }
    });
    (t, rx)
}

/// 过滤已经添加过的图片，`overwrite` 为真时保留以便更新向量
pub fn task_filter(
    mut lrx: Receiver<ImageFile>,
    repo: Arc<EmbeddingRepository>,
    overwrite: bool,
    pb: ProgressBar,
) -> (JoinHandle<()>, Receiver<ImageFile>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = tokio::spawn(async move {
        while let Some(file) = lrx.recv().await {
            let exists = match repo.get_by_url(&file.url).await {
                Ok(record) => record.is_some(),
                Err(e) => {
                    pb.println(format!("查询失败 {}: {}", file.url, e));
                    pb.inc(1);
                    continue;
                }
            };
            if exists && !overwrite {
                pb.set_message(format!("跳过已添加图片: {}", file.url));
                pb.inc(1);
                continue;
            }
            if tx.send(file).await.is_err() {
                break;
            }
        }
    });
    (t, rx)
}

pub fn task_embed(
    mut lrx: Receiver<ImageFile>,
    embedder: Arc<dyn EmbeddingService>,
    concurrency: usize,
    pb: ProgressBar,
) -> (JoinHandle<()>, Receiver<EmbeddingRecord>) {
    let (tx, rx) = channel(concurrency * 2);
    let t = tokio::spawn(async move {
        let mut buffer = vec![];
        // NOTE: 每次最多同时发出 concurrency 个请求，全部完成后再读取下一批
        while lrx.recv_many(&mut buffer, concurrency).await != 0 {
            let results = join_all(buffer.drain(..).map(|file| {
                let embedder = embedder.clone();
                async move {
                    let data = tokio::fs::read(&file.path).await?;
                    let embedding = embedder.embed(data).await?;
                    Ok::<_, crate::Error>(EmbeddingRecord::new(file.url, embedding))
                }
            }))
            .await;
            for result in results {
                match result {
                    Ok(record) => {
                        if tx.send(record).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        pb.println(format!("计算向量失败: {}", e));
                        pb.inc(1);
                    }
                }
            }
        }
    });
    (t, rx)
}

/// 按批写入数据库，返回写入统计
pub fn task_insert(
    mut lrx: Receiver<EmbeddingRecord>,
    repo: Arc<EmbeddingRepository>,
    batch_size: usize,
    pb: ProgressBar,
) -> JoinHandle<BulkInsertReport> {
    tokio::spawn(async move {
        let mut report = BulkInsertReport::default();
        let mut seen = HashSet::new();
        let mut batch = Vec::with_capacity(batch_size);

        while let Some(record) = lrx.recv().await {
            if !seen.insert(record.url.clone()) {
                pb.set_message(format!("重复的图片地址: {}", record.url));
                pb.inc(1);
                continue;
            }

            // overwrite 模式下已存在的地址直接更新向量
            match repo.get_by_url(&record.url).await {
                Ok(Some(existing)) => {
                    if let Err(e) = repo.update_embedding(existing.id, &record.embedding).await {
                        warn!("更新向量失败 {}: {}", record.url, e);
                    } else {
                        pb.set_message(format!("更新图片向量: {}", record.url));
                    }
                    pb.inc(1);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("查询失败 {}: {}", record.url, e);
                    pb.inc(1);
                    continue;
                }
            }

            batch.push(record);
            if batch.len() == batch_size {
                flush(&repo, &mut batch, batch_size, &mut report, &pb).await;
            }
        }

        if !batch.is_empty() {
            flush(&repo, &mut batch, batch_size, &mut report, &pb).await;
        }
        report
    })
}

async fn flush(
    repo: &EmbeddingRepository,
    batch: &mut Vec<EmbeddingRecord>,
    batch_size: usize,
    report: &mut BulkInsertReport,
    pb: &ProgressBar,
) {
    let records = std::mem::take(batch);
    let n = records.len();
    match repo.bulk_insert_chunked(records, batch_size).await {
        Ok(r) => {
            if r.failed_batches > 0 {
                pb.println(format!("批量写入失败，丢弃 {} 条记录", n - r.inserted));
            }
            *report += r;
            pb.set_message(format!("已写入 {} 条记录", report.inserted));
        }
        // 校验失败，整批都没有写入
        Err(e) => {
            pb.println(format!("批量写入失败，丢弃 {} 条记录: {}", n, e));
            report.failed_batches += 1;
        }
    }
    pb.inc(n as u64);
}
