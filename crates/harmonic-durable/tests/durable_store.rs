//! Durable store behavior over both engines

use harmonic_durable::{
    DurableError, DurableStore, ExportDocument, MemoryBackend, MessageOrder, SqliteBackend,
    StorageBackend, StoreStats,
};
use harmonic_model::{DocumentPatch, DocumentType, Timestamp, MILLIS_PER_DAY};
use harmonic_test_utils::{document, durable_store, manual_clock, message_at, project, EPOCH};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn engines() -> Vec<(&'static str, Arc<dyn StorageBackend>)> {
    vec![
        ("memory", Arc::new(MemoryBackend::new())),
        ("sqlite", Arc::new(SqliteBackend::in_memory())),
    ]
}

#[tokio::test]
async fn upsert_is_idempotent() {
    for (engine, backend) in engines() {
        let store = durable_store(backend, manual_clock()).await;
        let doc = document("d1", "Gears", "notes", &["astro"]);

        store.save_document(&doc).await.unwrap();
        store.save_document(&doc).await.unwrap();

        let all = store.get_documents().await.unwrap();
        assert_eq!(all, vec![doc], "engine {engine}");
    }
}

#[tokio::test]
async fn upsert_replaces_by_id() {
    for (engine, backend) in engines() {
        let store = durable_store(backend, manual_clock()).await;
        let mut doc = document("d1", "Gears", "notes", &["astro"]);
        store.save_document(&doc).await.unwrap();

        doc.apply(DocumentPatch::new().tags(["moon"]), EPOCH.offset(10));
        store.save_document(&doc).await.unwrap();

        assert!(store.get_documents_by_tag("astro").await.unwrap().is_empty(), "engine {engine}");
        let by_moon = store.get_documents_by_tag("moon").await.unwrap();
        assert_eq!(by_moon.len(), 1, "engine {engine}");
        assert_eq!(by_moon[0].version, 2);
    }
}

#[tokio::test]
async fn most_recent_messages_newest_first() {
    for (engine, backend) in engines() {
        let store = durable_store(backend, manual_clock()).await;
        for (id, ts) in [("m1", 1_000), ("m2", 2_000), ("m3", 3_000)] {
            store.save_message(&message_at(id, id, ts)).await.unwrap();
        }

        let latest: Vec<i64> = store
            .get_messages(2)
            .await
            .unwrap()
            .iter()
            .map(|m| m.timestamp.as_millis())
            .collect();
        assert_eq!(latest, vec![3_000, 2_000], "engine {engine}");

        let chronological: Vec<String> = store
            .get_messages_ordered(2, MessageOrder::Chronological)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(chronological, vec!["m2", "m3"], "engine {engine}");

        assert_eq!(store.get_all_messages().await.unwrap().len(), 3);
    }
}

#[tokio::test]
async fn search_by_text_and_tags() {
    for (engine, backend) in engines() {
        let store = durable_store(backend, manual_clock()).await;
        let docs = [
            document("d1", "Mercury retrograde", "orbit", &["planets"]),
            document("d2", "Venus", "Retrograde loops", &["planets", "venus"]),
        ];
        for doc in &docs {
            store.save_document(doc).await.unwrap();
        }
        store.save_document(&document("d3", "Tides", "moon pull", &["moon"])).await.unwrap();

        let mut hits: Vec<String> = store
            .search_documents::<&str>("RETROGRADE", &[])
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id.to_string())
            .collect();
        hits.sort();
        assert_eq!(hits, vec!["d1", "d2"], "engine {engine}");

        let hits = store.search_documents("retrograde", &["venus", "moon"]).await.unwrap();
        assert_eq!(hits.len(), 1, "engine {engine}");
        assert_eq!(hits[0].id.as_str(), "d2");

        let hits = store.search_documents("", &["moon"]).await.unwrap();
        assert_eq!(hits.len(), 1, "engine {engine}");
    }
}

#[tokio::test]
async fn documents_by_type_and_delete() {
    for (engine, backend) in engines() {
        let store = durable_store(backend, manual_clock()).await;
        let mut api = document("d1", "Endpoints", "GET /charts", &[]);
        api.doc_type = DocumentType::Api;
        store.save_document(&api).await.unwrap();
        store.save_document(&document("d2", "Notes", "", &[])).await.unwrap();

        let apis = store.get_documents_by_type(DocumentType::Api).await.unwrap();
        assert_eq!(apis, vec![api.clone()], "engine {engine}");

        assert!(store.delete_document(&api.id).await.unwrap());
        assert!(!store.delete_document(&api.id).await.unwrap());
        assert_eq!(store.get_document(&api.id).await.unwrap(), None);
    }
}

#[tokio::test]
async fn projects_most_recent_first() {
    for (engine, backend) in engines() {
        let store = durable_store(backend, manual_clock()).await;
        store.save_project(&project("p1", "old", 10)).await.unwrap();
        store.save_project(&project("p2", "new", 30)).await.unwrap();
        store.save_project(&project("p3", "mid", 20)).await.unwrap();

        let names: Vec<String> = store
            .get_projects()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["new", "mid", "old"], "engine {engine}");
    }
}

#[tokio::test]
async fn analytics_window_and_pruning() {
    for (engine, backend) in engines() {
        let clock = manual_clock();
        let store = durable_store(backend, Arc::clone(&clock)).await;

        store.log_event("navigation", json!({"page": "chat"})).await.unwrap();
        store.save_message(&message_at("m-old", "old", EPOCH.as_millis())).await.unwrap();
        clock.advance_days(10);
        let recent = store.log_event("search", json!({"term": "moon"})).await.unwrap();
        store.save_message(&message_at("m-new", "new", clock_now(&clock))).await.unwrap();

        let week = store.get_analytics(7).await.unwrap();
        assert_eq!(week, vec![recent], "engine {engine}");
        assert_eq!(store.get_analytics(30).await.unwrap().len(), 2);

        let report = store.clear_old_data(7).await.unwrap();
        assert_eq!((report.messages, report.events), (1, 1), "engine {engine}");
        assert_eq!(store.get_all_messages().await.unwrap().len(), 1);

        let report = store.clear_old_data(0).await.unwrap();
        assert_eq!((report.messages, report.events), (1, 1), "engine {engine}");
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
    }
}

fn clock_now(clock: &harmonic_model::ManualClock) -> i64 {
    use harmonic_model::Clock;
    clock.now().as_millis()
}

#[tokio::test]
async fn pruning_cutoff_is_exclusive() {
    let clock = manual_clock();
    let store = durable_store(Arc::new(MemoryBackend::new()), Arc::clone(&clock)).await;
    let cutoff = EPOCH.as_millis() - MILLIS_PER_DAY;
    store.save_message(&message_at("at", "at cutoff", cutoff)).await.unwrap();
    store.save_message(&message_at("before", "before cutoff", cutoff - 1)).await.unwrap();

    let report = store.clear_old_data(1).await.unwrap();
    assert_eq!(report.messages, 1);
    let left = store.get_all_messages().await.unwrap();
    assert_eq!(left[0].id.as_str(), "at");
}

#[tokio::test]
async fn init_required_and_idempotent() {
    let store = DurableStore::in_memory();
    let err = store.save_document(&document("d1", "t", "c", &[])).await.unwrap_err();
    assert!(matches!(err, DurableError::NotInitialized));

    store.init().await.unwrap();
    store.init().await.unwrap();
    store.save_document(&document("d1", "t", "c", &[])).await.unwrap();
    assert_eq!(store.stats().await.unwrap().total_documents, 1);
}

#[tokio::test]
async fn export_round_trip_is_lossless() {
    let source = durable_store(Arc::new(MemoryBackend::new()), manual_clock()).await;
    source.save_message(&message_at("m1", "hello", 1_700_000_000_123)).await.unwrap();
    let mut doc = document("d1", "Gears", "notes", &["b", "a"]);
    doc.apply(DocumentPatch::new().content("more notes"), EPOCH.offset(5));
    source.save_document(&doc).await.unwrap();
    source.save_project(&project("p1", "dash", 42)).await.unwrap();
    source
        .log_event("metric", json!({"page": "docs", "msi": 985.690_694_632_869_5}))
        .await
        .unwrap();

    let export = source.export_data().await.unwrap();
    assert_eq!(export.version, "1.0");
    assert_eq!(export.data.stats.total(), 4);

    let json = export.to_json().unwrap();
    let parsed = ExportDocument::from_json(&json).unwrap();
    assert_eq!(parsed, export);

    let target = durable_store(Arc::new(SqliteBackend::in_memory()), manual_clock()).await;
    let imported = target.import_data(&parsed).await.unwrap();
    assert_eq!(imported, export.data.stats);

    let again = target.export_data().await.unwrap();
    assert_eq!(again.data, export.data);
    assert_eq!(again.data.messages[0].timestamp, Timestamp::from_millis(1_700_000_000_123));
    assert_eq!(again.data.documents[0].tags.iter().collect::<Vec<_>>(), vec!["b", "a"]);
    assert_eq!(again.data.analytics[0].data["msi"].as_f64(), Some(985.690_694_632_869_5));
}

#[tokio::test]
async fn event_payload_floats_read_back_exactly() {
    let values = [985.690_694_632_869_5, 0.1, 1.0 / 3.0, 123.456_789_012_345_68, 6.02e23];
    for (engine, backend) in engines() {
        let store = durable_store(backend, manual_clock()).await;
        for v in values {
            store.log_event("metric", json!({ "v": v })).await.unwrap();
        }
        let mut read: Vec<f64> = store
            .get_analytics(1)
            .await
            .unwrap()
            .iter()
            .filter_map(|e| e.data["v"].as_f64())
            .collect();
        read.sort_by(f64::total_cmp);
        let mut expected = values.to_vec();
        expected.sort_by(f64::total_cmp);
        assert_eq!(read, expected, "engine {engine}");
    }
}

#[tokio::test]
async fn clear_all_empties_every_collection() {
    let store = durable_store(Arc::new(SqliteBackend::in_memory()), manual_clock()).await;
    store.save_message(&message_at("m1", "x", 1)).await.unwrap();
    store.save_project(&project("p1", "x", 1)).await.unwrap();

    let removed = store.clear_all().await.unwrap();
    assert_eq!(removed.total(), 2);
    assert_eq!(store.stats().await.unwrap().total(), 0);
}

#[tokio::test]
async fn sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    {
        let store = durable_store(Arc::new(SqliteBackend::file(&path)), manual_clock()).await;
        store.save_document(&document("d1", "Persisted", "body", &["keep"])).await.unwrap();
        store.close().await.unwrap();
    }

    let store = durable_store(Arc::new(SqliteBackend::file(&path)), manual_clock()).await;
    let docs = store.get_documents_by_tag("keep").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].title, "Persisted");
}

mod properties {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn recent_messages_are_newest_first_on_both_engines(
            times in proptest::collection::btree_set(0_i64..10_000, 0..24),
            limit in 0_usize..30,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let times: BTreeSet<i64> = times;
            let expected: Vec<i64> = times.iter().rev().take(limit).copied().collect();

            for (engine, backend) in engines() {
                let got: Vec<i64> = runtime.block_on(async {
                    let store = durable_store(backend, manual_clock()).await;
                    for t in &times {
                        store.save_message(&message_at(&format!("m{t}"), "x", *t)).await.unwrap();
                    }
                    store
                        .get_messages(limit)
                        .await
                        .unwrap()
                        .iter()
                        .map(|m| m.timestamp.as_millis())
                        .collect()
                });
                prop_assert_eq!(&got, &expected, "engine {}", engine);
            }
        }
    }
}
