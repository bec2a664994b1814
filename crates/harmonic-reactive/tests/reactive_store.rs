//! Reactive store actions, persistence policies and lifecycle

use harmonic_durable::{DurableStore, MemoryBackend};
use harmonic_model::{
    DocumentId, DocumentPatch, DocumentType, ManualClock, NewDocument, NewMessage, NewProject,
    ProjectId, ProjectPatch,
};
use harmonic_reactive::{
    ActionKind, FeatureFlags, Mutation, Page, PersistencePolicies, PersistencePolicy,
    ReactiveConfig, ReactiveStore, NAVIGATION_EVENT,
};
use harmonic_test_utils::{document, durable_store, manual_clock, message_at, Fault, FaultyBackend};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Fixture {
    store: ReactiveStore,
    backend: Arc<FaultyBackend>,
    clock: Arc<ManualClock>,
}

async fn fixture(policies: PersistencePolicies) -> Fixture {
    let backend = Arc::new(FaultyBackend::new());
    let clock = manual_clock();
    let durable = Arc::new(durable_store(backend.clone(), Arc::clone(&clock)).await);
    let store = ReactiveStore::new(
        durable,
        ReactiveConfig {
            policies,
            ..ReactiveConfig::default()
        },
    )
    .unwrap();
    Fixture { store, backend, clock }
}

fn markdown(title: &str, content: &str) -> NewDocument {
    NewDocument::new(title, content, DocumentType::Markdown)
}

#[tokio::test]
async fn add_then_update_document() {
    let f = fixture(PersistencePolicies::default()).await;

    let doc = f
        .store
        .add_document(markdown("T1", "C1").with_tags(["x"]));
    let state = f.store.snapshot();
    assert_eq!(state.documents.len(), 1);
    assert_eq!(state.documents[0].version, 1);
    assert_eq!(state.documents[0].created_at, state.documents[0].updated_at);

    let outcome = f.store.update_document(&doc.id, DocumentPatch::new().title("T1-edited"));
    assert_eq!(outcome, Mutation::Applied);
    let state = f.store.snapshot();
    let edited = state.document(&doc.id).unwrap();
    assert_eq!(edited.title, "T1-edited");
    assert_eq!(edited.version, 2);
    assert!(edited.updated_at > edited.created_at);

    f.store.flush().await.unwrap();
    let stored = f.store.durable().get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(&stored, edited);
}

#[tokio::test]
async fn versions_grow_by_one_per_update() {
    let f = fixture(PersistencePolicies::default()).await;
    let doc = f.store.add_document(markdown("Gears", ""));

    let mut last = f.store.snapshot().document(&doc.id).unwrap().updated_at;
    for n in 1..=5_u64 {
        if n % 2 == 0 {
            f.clock.advance(250);
        }
        let _ = f.store.update_document(&doc.id, DocumentPatch::new().content(format!("rev {n}")));
        let state = f.store.snapshot();
        let current = state.document(&doc.id).unwrap();
        assert_eq!(current.version, 1 + n);
        assert!(current.updated_at >= last);
        last = current.updated_at;
    }
}

#[tokio::test]
async fn unknown_ids_are_silent_no_ops() {
    let f = fixture(PersistencePolicies::default()).await;
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    f.store.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let ghost = DocumentId::new("ghost");
    let outcome = f.store.update_document(&ghost, DocumentPatch::new().title("x"));
    assert_eq!(outcome, Mutation::NotFound);
    assert_eq!(f.store.delete_document(&ghost), Mutation::NotFound);
    assert_eq!(f.store.select_project(&ProjectId::new("ghost")), Mutation::NotFound);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deleting_selected_document_clears_selection() {
    let f = fixture(PersistencePolicies::default()).await;
    let keep = f.store.add_document(markdown("Keep", ""));
    let gone = f.store.add_document(markdown("Gone", ""));
    f.store.set_selected_document(Some(gone.id.clone()));
    assert_eq!(f.store.snapshot().selected_document().unwrap().id, gone.id);

    let _ = f.store.delete_document(&gone.id);
    let state = f.store.snapshot();
    assert_eq!(state.selected_document, None);
    assert!(state.document(&gone.id).is_none());
    assert!(state.document(&keep.id).is_some());

    f.store.flush().await.unwrap();
    assert_eq!(f.store.durable().get_document(&gone.id).await.unwrap(), None);
}

#[tokio::test]
async fn filtered_documents_follow_search_term() {
    let f = fixture(PersistencePolicies::default()).await;
    f.store.add_document(markdown("Mercury", "innermost").with_tags(["planet"]));
    f.store.add_document(markdown("Tides", "lunar pull").with_tags(["Moon"]));

    assert_eq!(f.store.filtered_documents().len(), 2);
    f.store.set_search_term("MOON");
    let hits = f.store.filtered_documents();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Tides");
    f.store.set_search_term("");
    assert_eq!(f.store.filtered_documents().len(), 2);
}

#[tokio::test]
async fn failed_document_add_is_rolled_back() {
    let f = fixture(PersistencePolicies::default()).await;
    let mut failures = f.store.subscribe_failures();
    f.backend.fail(Fault::Put);

    let doc = f.store.add_document(markdown("Doomed", ""));
    assert!(f.store.snapshot().document(&doc.id).is_some());

    f.store.flush().await.unwrap();
    assert!(f.store.snapshot().documents.is_empty());

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.action, ActionKind::AddDocument);
    assert_eq!(failure.id.as_deref(), Some(doc.id.as_str()));
    assert!(failure.rolled_back);
}

#[tokio::test]
async fn failed_update_delete_and_message_are_kept() {
    let f = fixture(PersistencePolicies::default()).await;
    let updated = f.store.add_document(markdown("Updated", ""));
    let deleted = f.store.add_document(markdown("Deleted", ""));
    f.store.flush().await.unwrap();

    f.backend.fail_writes();
    let mut failures = f.store.subscribe_failures();

    let _ = f.store.update_document(&updated.id, DocumentPatch::new().title("Edited"));
    let _ = f.store.delete_document(&deleted.id);
    let message = f.store.add_message(NewMessage::user("hello"));
    let after_sync_part = f.store.snapshot();

    f.store.flush().await.unwrap();
    assert_eq!(*f.store.snapshot(), *after_sync_part);
    assert_eq!(after_sync_part.document(&updated.id).unwrap().title, "Edited");
    assert!(after_sync_part.document(&deleted.id).is_none());
    assert_eq!(after_sync_part.messages, vec![message]);

    let mut actions = Vec::new();
    for _ in 0..3 {
        let failure = failures.recv().await.unwrap();
        assert!(!failure.rolled_back);
        actions.push(failure.action);
    }
    assert_eq!(
        actions,
        vec![ActionKind::UpdateDocument, ActionKind::DeleteDocument, ActionKind::AddMessage]
    );
    assert_eq!(f.backend.injected_failures(), 3);
}

#[tokio::test]
async fn rollback_policy_compensates_every_family() {
    let f = fixture(PersistencePolicies::uniform(PersistencePolicy::OptimisticWithRollback)).await;
    let doc = f.store.add_document(markdown("Stable", ""));
    let other = f.store.add_document(markdown("Other", ""));
    let project = f.store.add_project(NewProject::new("dash"));
    f.store.add_message(NewMessage::user("one"));
    f.store.flush().await.unwrap();
    let before = f.store.snapshot();

    f.backend.fail_writes();
    f.clock.advance(1_000);
    let _ = f.store.update_document(&doc.id, DocumentPatch::new().title("Broken"));
    let _ = f.store.delete_document(&other.id);
    let _ = f.store.update_project(&project.id, ProjectPatch::new().name("renamed"));
    let _ = f.store.clear_messages();
    let lost = f.store.add_message(NewMessage::user("two"));
    f.store.flush().await.unwrap();

    let after = f.store.snapshot();
    assert_eq!(after.documents, before.documents);
    assert_eq!(after.projects, before.projects);
    assert_eq!(after.messages, before.messages);
    assert!(after.messages.iter().all(|m| m.id != lost.id));
}

#[tokio::test]
async fn superseded_update_is_not_rolled_back() {
    let policies = PersistencePolicies::default()
        .with(ActionKind::UpdateDocument, PersistencePolicy::OptimisticWithRollback);
    let f = fixture(policies).await;
    let doc = f.store.add_document(markdown("v1", ""));
    f.store.flush().await.unwrap();

    f.backend.fail(Fault::Put);
    let _ = f.store.update_document(&doc.id, DocumentPatch::new().title("v2"));
    let _ = f.store.update_document(&doc.id, DocumentPatch::new().title("v3"));
    f.store.flush().await.unwrap();

    // First rollback is superseded by v3; the second one undoes v3 only.
    let state = f.store.snapshot();
    let current = state.document(&doc.id).unwrap();
    assert_eq!(current.title, "v2");
    assert_eq!(current.version, 2);
}

#[tokio::test]
async fn same_id_writes_land_in_call_order() {
    let f = fixture(PersistencePolicies::default()).await;
    let doc = f.store.add_document(markdown("a", ""));
    for title in ["b", "c", "d"] {
        let _ = f.store.update_document(&doc.id, DocumentPatch::new().title(title));
    }
    f.store.flush().await.unwrap();

    let stored = f.store.durable().get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "d");
    assert_eq!(stored.version, 4);
}

#[tokio::test]
async fn write_from_subscriber_lands_after_triggering_write() {
    let Fixture { store, .. } = fixture(PersistencePolicies::default()).await;
    let store = Arc::new(store);
    let doc = store.add_document(markdown("v1", ""));

    let handle = Arc::downgrade(&store);
    let target = doc.id.clone();
    store.subscribe(move |state| {
        let Some(store) = handle.upgrade() else {
            return;
        };
        if state.document(&target).is_some_and(|d| d.version == 2) {
            let _ = store.update_document(&target, DocumentPatch::new().title("v3"));
        }
    });

    assert!(store.update_document(&doc.id, DocumentPatch::new().title("v2")).is_applied());
    store.flush().await.unwrap();

    let state = store.snapshot();
    let in_memory = state.document(&doc.id).unwrap();
    let stored = store.durable().get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(in_memory.title, "v3");
    assert_eq!(in_memory.version, 3);
    assert_eq!(&stored, in_memory);
}

#[tokio::test]
async fn subscribers_see_every_change() {
    let f = fixture(PersistencePolicies::default()).await;
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = f.store.subscribe(move |state| sink.lock().push(state.current_page));

    f.store.set_current_page(Page::Chat);
    f.store.set_current_page(Page::Documentation);
    assert!(f.store.unsubscribe(id));
    f.store.set_current_page(Page::Settings);

    assert_eq!(*seen.lock(), vec![Page::Chat, Page::Documentation]);
    assert!(!f.store.unsubscribe(id));
}

#[tokio::test]
async fn navigation_events_follow_feature_flag() {
    let f = fixture(PersistencePolicies::default()).await;
    f.store.set_current_page(Page::Chat);
    f.store.set_feature_flags(FeatureFlags {
        navigation_analytics: true,
    });
    f.store.set_current_page(Page::Projects);
    f.store.flush().await.unwrap();

    let events = f.store.durable().get_analytics(1).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, NAVIGATION_EVENT);
    assert_eq!(events[0].data, json!({"page": "projects"}));
}

#[tokio::test]
async fn project_selection_bumps_activity() {
    let f = fixture(PersistencePolicies::default()).await;
    let project = f.store.add_project(NewProject::new("dash"));
    f.clock.advance(5_000);

    assert!(f.store.select_project(&project.id).is_applied());
    let state = f.store.snapshot();
    assert_eq!(state.selected_project().unwrap().id, project.id);
    assert!(state.selected_project().unwrap().last_active > project.last_active);

    assert!(f.store.delete_project(&project.id).is_applied());
    assert_eq!(f.store.snapshot().selected_project, None);
}

#[tokio::test]
async fn initialize_hydrates_recent_rows_chronologically() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = manual_clock();
    let durable = Arc::new(durable_store(backend, Arc::clone(&clock)).await);
    for (id, ts) in [("m1", 1_000), ("m2", 2_000), ("m3", 3_000)] {
        durable.save_message(&message_at(id, id, ts)).await.unwrap();
    }
    durable.save_document(&document("d1", "Saved", "", &[])).await.unwrap();

    let store = ReactiveStore::new(Arc::clone(&durable), ReactiveConfig::default()).unwrap();
    let session = store.add_document(markdown("Session", ""));
    store.initialize(2).await.unwrap();

    let state = store.snapshot();
    assert!(state.hydrated);
    let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m3"]);
    assert_eq!(state.documents.len(), 2);
    assert!(state.document(&session.id).is_some());
}

#[tokio::test]
async fn dispose_flushes_and_stops_persisting() {
    let f = fixture(PersistencePolicies::default()).await;
    let durable = Arc::clone(f.store.durable());
    f.store.add_message(NewMessage::user("kept"));
    f.store.dispose().await.unwrap();
    f.store.dispose().await.unwrap();

    assert_eq!(durable.get_messages(10).await.unwrap().len(), 1);
    f.store.add_message(NewMessage::user("memory only"));
    assert_eq!(f.store.snapshot().messages.len(), 2);
    assert!(f.store.flush().await.is_err());
    assert_eq!(durable.get_messages(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn mirrors_into_plain_memory_store() {
    let durable = Arc::new(DurableStore::in_memory());
    durable.init().await.unwrap();
    let store = ReactiveStore::new(Arc::clone(&durable), ReactiveConfig::default()).unwrap();
    store.add_message(NewMessage::user("hi"));
    store.flush().await.unwrap();
    assert_eq!(durable.stats().await.unwrap().total_messages, 1);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn versions_and_update_times_only_move_forward(
            ticks in proptest::collection::vec(0_i64..5, 1..20),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let history: Vec<(u64, i64)> = runtime.block_on(async {
                let f = fixture(PersistencePolicies::default()).await;
                let doc = f.store.add_document(markdown("T", "C"));
                let mut history = vec![(doc.version, doc.updated_at.as_millis())];
                for (n, tick) in ticks.iter().enumerate() {
                    f.clock.advance(*tick);
                    let patch = DocumentPatch::new().content(format!("rev {n}"));
                    assert!(f.store.update_document(&doc.id, patch).is_applied());
                    let state = f.store.snapshot();
                    let current = state.document(&doc.id).unwrap();
                    history.push((current.version, current.updated_at.as_millis()));
                }
                f.store.dispose().await.unwrap();
                history
            });

            for pair in history.windows(2) {
                prop_assert_eq!(pair[1].0, pair[0].0 + 1);
                prop_assert!(pair[1].1 > pair[0].1);
            }
        }
    }
}
