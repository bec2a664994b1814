//! Testing utilities for the Harmonic workspace
//!
//! Shared fixtures and a fault-injecting storage backend.

#![allow(missing_docs)]

use async_trait::async_trait;
use harmonic_durable::{
    Collection, CollectionSchema, Direction, DurableStore, KeyRange, MemoryBackend, StorageBackend,
    StorageError,
};
use harmonic_model::{
    Document, DocumentId, DocumentType, ManualClock, Message, MessageId, NewDocument, NewMessage,
    NewProject, Project, ProjectId, Timestamp,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 2023-11-14T22:13:20Z, a fixed instant for clock fixtures
pub const EPOCH: Timestamp = Timestamp::from_millis(1_700_000_000_000);

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(EPOCH))
}

pub fn message_at(id: &str, content: &str, millis: i64) -> Message {
    Message::create(
        MessageId::new(id),
        NewMessage::user(content),
        Timestamp::from_millis(millis),
    )
}

pub fn document(id: &str, title: &str, content: &str, tags: &[&str]) -> Document {
    Document::create(
        DocumentId::new(id),
        NewDocument::new(title, content, DocumentType::Markdown).with_tags(tags.iter().copied()),
        EPOCH,
    )
}

pub fn project(id: &str, name: &str, last_active: i64) -> Project {
    Project::create(
        ProjectId::new(id),
        NewProject::new(name),
        Timestamp::from_millis(last_active),
    )
}

/// Durable store over `backend`, already initialized
pub async fn durable_store(
    backend: Arc<dyn StorageBackend>,
    clock: Arc<ManualClock>,
) -> DurableStore {
    let store = DurableStore::with_clock(backend, clock);
    store.init().await.unwrap();
    store
}

/// Backend call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Put,
    Delete,
    Clear,
}

/// In-memory backend whose writes can be switched to fail
#[derive(Debug, Default)]
pub struct FaultyBackend {
    inner: MemoryBackend,
    faults: Mutex<HashSet<Fault>>,
    injected: AtomicUsize,
}

impl FaultyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fault: Fault) {
        self.faults.lock().insert(fault);
    }

    pub fn fail_writes(&self) {
        self.faults.lock().extend([Fault::Put, Fault::Delete, Fault::Clear]);
    }

    pub fn heal(&self) {
        self.faults.lock().clear();
    }

    /// Number of calls that failed because of an injected fault
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn check(&self, fault: Fault) -> Result<(), StorageError> {
        if self.faults.lock().contains(&fault) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::QuotaExceeded(format!("injected {fault:?} fault")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for FaultyBackend {
    async fn open(&self, schema: &[CollectionSchema]) -> Result<(), StorageError> {
        self.inner.open(schema).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.inner.close().await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(collection, id).await
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, StorageError> {
        self.inner.get_all(collection).await
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<(), StorageError> {
        self.check(Fault::Put)?;
        self.inner.put(collection, id, record).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StorageError> {
        self.check(Fault::Delete)?;
        self.inner.delete(collection, id).await
    }

    async fn clear(&self, collection: Collection) -> Result<usize, StorageError> {
        self.check(Fault::Clear)?;
        self.inner.clear(collection).await
    }

    async fn count(&self, collection: Collection) -> Result<usize, StorageError> {
        self.inner.count(collection).await
    }

    async fn query_index(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StorageError> {
        self.inner.query_index(collection, index, range, direction, limit).await
    }

    async fn delete_index_range(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
    ) -> Result<usize, StorageError> {
        self.check(Fault::Delete)?;
        self.inner.delete_index_range(collection, index, range).await
    }
}
