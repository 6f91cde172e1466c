//! Memory service behaviour against a local SQLite store.

use evolution_memory::{
    MemoryCapturePolicy, MemoryError, MemoryService, MemoryServiceConfig, Recall,
    SqliteVectorStore, VectorStore,
};
use evolution_test_utils::{FailingEmbedder, HashingEmbedder, UnavailableStore};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn service_with(store: Arc<dyn VectorStore>, config: MemoryServiceConfig) -> MemoryService {
    MemoryService::new(Arc::new(HashingEmbedder::new(128)), store, config).expect("service")
}

fn in_memory_service() -> (MemoryService, Arc<SqliteVectorStore>) {
    let store = Arc::new(SqliteVectorStore::open_in_memory().expect("store"));
    (
        service_with(store.clone(), MemoryServiceConfig::default()),
        store,
    )
}

#[tokio::test]
async fn saved_memory_outranks_unrelated_control() {
    let (service, _) = in_memory_service();
    service
        .save_memory("The production server runs Ubuntu 22.04")
        .await
        .expect("save target");
    service
        .save_memory("Lunch on Friday is pizza")
        .await
        .expect("save control");

    let recall = service
        .recall_memory("which Ubuntu release does the production server run", None)
        .await
        .expect("recall");
    let results = recall.results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record.content, "The production server runs Ubuntu 22.04");
    assert_eq!(results[0].rank, 1);
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn recall_scores_are_non_increasing_and_bounded() {
    let (service, _) = in_memory_service();
    for content in [
        "postgres runs on port 5432",
        "postgres backups run nightly",
        "the office plant needs water",
        "nginx proxies to postgres",
    ] {
        service.save_memory(content).await.expect("save");
    }
    let recall = service
        .recall_memory("postgres port", Some(10))
        .await
        .expect("recall");
    let scores: Vec<f32> = recall.results().iter().map(|result| result.score).collect();
    assert!(!scores.is_empty());
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
    assert!(scores.iter().all(|score| (0.0..=1.0).contains(score)));
    let ranks: Vec<usize> = recall.results().iter().map(|result| result.rank).collect();
    assert_eq!(ranks, (1..=scores.len()).collect::<Vec<_>>());
}

#[tokio::test]
async fn empty_store_yields_sentinel_not_error() {
    let (service, _) = in_memory_service();
    let recall = service.recall_memory("anything", None).await.expect("recall");
    assert_eq!(recall, Recall::Empty);
    assert_eq!(
        service.recall_memory("anything", Some(0)).await.expect("recall"),
        Recall::Empty
    );
}

#[tokio::test]
async fn collection_setup_is_idempotent() {
    let (service, store) = in_memory_service();
    service.ensure_collection().await.expect("first");
    service.ensure_collection().await.expect("second");
    service.save_memory("one").await.expect("save");
    service.save_memory("two").await.expect("save");
    assert_eq!(store.count(service.collection()).await.expect("count"), 2);
}

#[tokio::test]
async fn limit_truncates_results() {
    let (service, _) = in_memory_service();
    for idx in 0..4 {
        service
            .save_memory(&format!("shared fact number {idx}"))
            .await
            .expect("save");
    }
    let recall = service.recall_memory("shared fact", Some(2)).await.expect("recall");
    assert_eq!(recall.results().len(), 2);
}

#[tokio::test]
async fn capture_policy_rejects_denied_content() {
    let store = Arc::new(SqliteVectorStore::open_in_memory().expect("store"));
    let config = MemoryServiceConfig {
        capture: MemoryCapturePolicy {
            deny_patterns: vec!["(?i)password".to_string()],
            ..MemoryCapturePolicy::default()
        },
        ..MemoryServiceConfig::default()
    };
    let service = service_with(store.clone(), config);
    let err = service.save_memory("my Password is hunter2").await.unwrap_err();
    assert!(matches!(err, MemoryError::Rejected));
    assert_eq!(store.count("memories").await.expect("count"), 0);
}

#[tokio::test]
async fn provider_failures_surface_as_errors() {
    let service = MemoryService::new(
        Arc::new(FailingEmbedder::new(8)),
        Arc::new(SqliteVectorStore::open_in_memory().expect("store")),
        MemoryServiceConfig::default(),
    )
    .expect("service");
    assert!(matches!(
        service.save_memory("fact").await.unwrap_err(),
        MemoryError::Embedding(_)
    ));

    let service = service_with(Arc::new(UnavailableStore), MemoryServiceConfig::default());
    assert!(matches!(
        service.recall_memory("fact", None).await.unwrap_err(),
        MemoryError::Store(_)
    ));
}
