use std::collections::HashMap;

use papyrus_search::Error;
use papyrus_search::config::{DatabaseOptions, EMBEDDING_DIM};
use papyrus_search::db::{
    BulkInsertReport, EmbeddingRecord, EmbeddingRepository, NeighborSearch, connect,
};
use papyrus_search::utils::cosine_similarity;
use rstest::*;
use tempfile::TempDir;
use uuid::Uuid;

mod common;

use common::*;

#[tokio::test]
async fn test_k_nearest_scenario() {
    let (_dir, _pool, repo) = setup_repo().await;
    repo.save(EmbeddingRecord::new("a", padded(&[1.0, 0.0]))).await.unwrap();
    repo.save(EmbeddingRecord::new("b", padded(&[0.0, 1.0]))).await.unwrap();
    repo.save(EmbeddingRecord::new("c", padded(&[0.9, 0.1]))).await.unwrap();

    let result = repo.get_k_nearest(&padded(&[1.0, 0.0]), 2).await.unwrap();
    assert_eq!(result, vec!["a".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_k_nearest_sorted_by_similarity() {
    let (_dir, _pool, repo) = setup_repo().await;
    let mut vectors = HashMap::new();
    let records = (0..50)
        .map(|i| {
            let v = random_vector();
            vectors.insert(format!("url-{i}"), v.clone());
            EmbeddingRecord::new(format!("url-{i}"), v)
        })
        .collect::<Vec<_>>();
    repo.bulk_insert(records).await.unwrap();

    let query = random_vector();
    let result = repo.get_k_nearest(&query, 10).await.unwrap();
    assert_eq!(result.len(), 10);

    let scores =
        result.iter().map(|url| cosine_similarity(&query, &vectors[url])).collect::<Vec<_>>();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");

    let best = vectors.values().map(|v| cosine_similarity(&query, v)).fold(f32::MIN, f32::max);
    assert_eq!(scores[0], best);
}

#[tokio::test]
async fn test_k_nearest_returns_all_when_fewer_than_k() {
    let (_dir, _pool, repo) = setup_repo().await;
    repo.save(EmbeddingRecord::new("a", padded(&[1.0]))).await.unwrap();
    repo.save(EmbeddingRecord::new("b", padded(&[0.0, 1.0]))).await.unwrap();

    let result = repo.get_k_nearest(&padded(&[0.0, 1.0]), 5).await.unwrap();
    assert_eq!(result, vec!["b".to_string(), "a".to_string()]);

    let (_dir, _pool, empty) = setup_repo().await;
    assert!(empty.get_k_nearest(&padded(&[1.0]), 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_k_nearest_tie_broken_by_id() {
    let (_dir, _pool, repo) = setup_repo().await;
    let mut a = EmbeddingRecord::new("a", padded(&[1.0, 1.0]));
    let mut b = EmbeddingRecord::new("b", padded(&[1.0, 1.0]));
    a.id = Uuid::from_u128(2);
    b.id = Uuid::from_u128(1);
    repo.save(a).await.unwrap();
    repo.save(b).await.unwrap();

    let result = repo.get_k_nearest(&padded(&[1.0, 1.0]), 2).await.unwrap();
    assert_eq!(result, vec!["b".to_string(), "a".to_string()]);
}

#[rstest]
#[case(0)]
#[case(127)]
#[case(129)]
#[tokio::test]
async fn test_k_nearest_rejects_wrong_dimension(#[case] len: usize) {
    let (_dir, _pool, repo) = setup_repo().await;
    let result = repo.get_k_nearest(&vec![0.5; len], 1).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_k_nearest_rejects_zero_k() {
    let (_dir, _pool, repo) = setup_repo().await;
    let result = repo.get_k_nearest(&padded(&[1.0]), 0).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(EMBEDDING_DIM - 1)]
#[case(EMBEDDING_DIM + 1)]
#[tokio::test]
async fn test_write_rejects_wrong_dimension(#[case] len: usize) {
    let (_dir, _pool, repo) = setup_repo().await;

    let result = repo.save(EmbeddingRecord::new("a", vec![0.1; len])).await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let result = repo.bulk_insert(vec![EmbeddingRecord::new("b", vec![0.1; len])]).await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let records = vec![
        EmbeddingRecord::new("c", padded(&[1.0])),
        EmbeddingRecord::new("d", vec![0.1; len]),
    ];
    let result = repo.bulk_insert_chunked(records, 1).await;
    assert!(matches!(result, Err(Error::Validation(_))));

    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_save_and_get() {
    let (_dir, _pool, repo) = setup_repo().await;
    let record = EmbeddingRecord::new("a", padded(&[0.1, 0.2, 0.3]));
    let saved = repo.save(record.clone()).await.unwrap();

    assert_eq!(saved.id, record.id);
    assert_eq!(saved.url, record.url);
    assert_eq!(saved.embedding, record.embedding);

    let fetched = repo.get(record.id).await.unwrap().unwrap();
    assert_eq!(fetched, saved);
    assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_replaces_existing_record() {
    let (_dir, _pool, repo) = setup_repo().await;
    let first = repo.save(EmbeddingRecord::new("a", padded(&[1.0]))).await.unwrap();

    let mut replacement = first.clone();
    replacement.url = "b".to_string();
    replacement.embedding = padded(&[0.0, 1.0]);
    let second = repo.save(replacement).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.url, "b");
    assert_eq!(second.embedding, padded(&[0.0, 1.0]));
    assert_eq!(second.created_at, first.created_at);
    assert!(second.modified_at >= first.modified_at);
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_embedding() {
    let (_dir, _pool, repo) = setup_repo().await;
    let saved = repo.save(EmbeddingRecord::new("a", padded(&[1.0]))).await.unwrap();

    let updated = repo.update_embedding(saved.id, &padded(&[0.0, 0.0, 1.0])).await.unwrap().unwrap();
    assert_eq!(updated.id, saved.id);
    assert_eq!(updated.embedding, padded(&[0.0, 0.0, 1.0]));
    assert_eq!(updated.created_at, saved.created_at);
    assert!(updated.modified_at >= saved.modified_at);

    let again = repo.update_embedding(saved.id, &padded(&[0.5])).await.unwrap().unwrap();
    assert!(again.modified_at >= updated.modified_at);

    assert!(repo.update_embedding(Uuid::new_v4(), &padded(&[1.0])).await.unwrap().is_none());
    assert!(matches!(
        repo.update_embedding(saved.id, &[1.0; 3]).await,
        Err(Error::Validation(_))
    ));
    // 校验失败不会修改记录
    assert_eq!(repo.get(saved.id).await.unwrap().unwrap().embedding, padded(&[0.5]));
}

#[tokio::test]
async fn test_url_lookup_and_delete() {
    let (_dir, _pool, repo) = setup_repo().await;
    let a = repo.save(EmbeddingRecord::new("a", padded(&[1.0]))).await.unwrap();
    let b = repo.save(EmbeddingRecord::new("b", padded(&[0.0, 1.0]))).await.unwrap();

    assert_eq!(repo.get_by_url("a").await.unwrap().unwrap().id, a.id);
    assert!(repo.get_by_url("missing").await.unwrap().is_none());

    assert_eq!(repo.delete_by_url("a").await.unwrap(), 1);
    assert!(repo.get_by_url("a").await.unwrap().is_none());
    assert_eq!(repo.delete_by_url("a").await.unwrap(), 0);

    assert_eq!(repo.delete(b.id).await.unwrap(), 1);
    assert!(repo.get(b.id).await.unwrap().is_none());
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_is_stable() {
    let (_dir, _pool, repo) = setup_repo().await;
    let records = (0..7).map(|i| EmbeddingRecord::new(format!("u{i}"), padded(&[i as f32]))).collect();
    repo.bulk_insert(records).await.unwrap();

    let all = repo.list(0, 100).await.unwrap();
    assert_eq!(all.len(), 7);
    let page = repo.list(2, 3).await.unwrap();
    assert_eq!(page, all[2..5].to_vec());
    assert_eq!(repo.list(0, 100).await.unwrap(), all);
    assert!(repo.list(7, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bulk_insert_in_batches() {
    let (_dir, _pool, repo) = setup_repo().await;
    let records = (0..65).map(|i| EmbeddingRecord::new(format!("u{i}"), random_vector())).collect();

    let report = repo.bulk_insert_chunked(records, 30).await.unwrap();
    assert_eq!(report, BulkInsertReport { inserted: 65, batches: 3, failed_batches: 0 });
    assert_eq!(repo.count().await.unwrap(), 65);
}

#[tokio::test]
async fn test_bulk_insert_failed_batch_is_isolated() {
    let (_dir, _pool, repo) = setup_repo().await;
    let mut records = (0..65)
        .map(|i| EmbeddingRecord::new(format!("u{i}"), random_vector()))
        .collect::<Vec<_>>();
    // 第二批中出现重复主键
    records[40].id = records[35].id;

    let report = repo.bulk_insert_chunked(records, 30).await.unwrap();
    assert_eq!(report, BulkInsertReport { inserted: 35, batches: 2, failed_batches: 1 });
    assert_eq!(repo.count().await.unwrap(), 35);
    assert!(repo.get_by_url("u35").await.unwrap().is_none());
    assert!(repo.get_by_url("u64").await.unwrap().is_some());
}

#[tokio::test]
async fn test_bulk_insert_reports_accumulate() {
    let (_dir, _pool, repo) = setup_repo().await;
    let mut report = BulkInsertReport::default();

    // 与 add 命令一样，每次写入一批并累加统计
    for chunk in 0..3 {
        let records =
            (0..4).map(|i| EmbeddingRecord::new(format!("u{chunk}-{i}"), random_vector())).collect();
        report += repo.bulk_insert_chunked(records, 4).await.unwrap();
    }
    let mut duplicated = vec![EmbeddingRecord::new("dup", random_vector())];
    duplicated.push(EmbeddingRecord { url: "dup2".to_string(), ..duplicated[0].clone() });
    report += repo.bulk_insert_chunked(duplicated, 4).await.unwrap();

    assert_eq!(report, BulkInsertReport { inserted: 12, batches: 3, failed_batches: 1 });
    assert_eq!(repo.count().await.unwrap(), 12);
}

#[tokio::test]
async fn test_schema_verification_missing_table() {
    let dir = TempDir::new().unwrap();
    let pool = connect(dir.path().join("empty.db"), &DatabaseOptions::default()).await.unwrap();

    let result = EmbeddingRepository::new(pool).await;
    assert!(matches!(result, Err(Error::SchemaVerification { table: "papyrus_embedding", .. })));
}

#[tokio::test]
async fn test_schema_verification_missing_column() {
    let dir = TempDir::new().unwrap();
    let pool = connect(dir.path().join("broken.db"), &DatabaseOptions::default()).await.unwrap();
    sqlx::query("CREATE TABLE papyrus_embedding (id BLOB PRIMARY KEY, url TEXT)")
        .execute(&pool)
        .await
        .unwrap();

    let result = EmbeddingRepository::new(pool).await;
    assert!(matches!(result, Err(Error::SchemaVerification { .. })));
}
