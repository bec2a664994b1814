//! The durable store: typed operations over a storage backend
//!
//! Every method except [`DurableStore::init`] fails with
//! [`DurableError::NotInitialized`] until `init()` has resolved. Each call
//! is its own short-lived transaction; read-modify-write sequences across
//! calls are not atomic.

use crate::backend::{MemoryBackend, StorageBackend};
use crate::error::{DurableError, DurableResult};
use crate::export::{ClearReport, ExportData, ExportDocument, StoreStats};
use crate::schema::{default_schema, index, Collection, CollectionSchema, Direction, KeyRange};
use harmonic_model::{
    AnalyticsEvent, Clock, Document, DocumentId, DocumentType, Message, Project, ProjectId,
    SystemClock,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Order of a message read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageOrder {
    /// Oldest first
    Chronological,
    /// Newest first
    #[default]
    TimestampDesc,
}

/// Durable local store over four collections
pub struct DurableStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    schema: Vec<CollectionSchema>,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("clock", &self.clock)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl DurableStore {
    /// Create a store over `backend` using the system clock
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    /// Create a store over `backend` with an explicit clock
    #[must_use]
    pub fn with_clock(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            schema: default_schema(),
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a store over a fresh in-process backend
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Clock used for generated timestamps
    #[inline]
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Check whether `init()` has completed
    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Open the backend and create collections and indexes
    ///
    /// Idempotent: concurrent or repeated calls open the backend once.
    pub async fn init(&self) -> DurableResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }
        self.backend.open(&self.schema).await?;
        self.initialized.store(true, Ordering::Release);
        tracing::info!(collections = self.schema.len(), "durable store initialized");
        Ok(())
    }

    /// Close the backend; the store returns to the uninitialized state
    pub async fn close(&self) -> DurableResult<()> {
        let _guard = self.init_lock.lock().await;
        if self.initialized.swap(false, Ordering::AcqRel) {
            self.backend.close().await?;
            tracing::info!("durable store closed");
        }
        Ok(())
    }

    fn ensure_init(&self) -> DurableResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(DurableError::NotInitialized)
        }
    }

    async fn put<T: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        entity: &T,
    ) -> DurableResult<()> {
        self.ensure_init()?;
        let record = serde_json::to_value(entity)?;
        self.backend.put(collection, id, record).await?;
        tracing::debug!(%collection, id, "record saved");
        Ok(())
    }

    async fn scan<T: DeserializeOwned>(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> DurableResult<Vec<T>> {
        self.ensure_init()?;
        let rows = self
            .backend
            .query_index(collection, index, range, direction, limit)
            .await?;
        decode_all(rows)
    }

    async fn all<T: DeserializeOwned>(&self, collection: Collection) -> DurableResult<Vec<T>> {
        self.ensure_init()?;
        decode_all(self.backend.get_all(collection).await?)
    }

    // Messages

    /// Upsert a message by id
    pub async fn save_message(&self, message: &Message) -> DurableResult<()> {
        self.put(Collection::Messages, message.id.as_str(), message).await
    }

    /// The `limit` most recent messages, newest first
    pub async fn get_messages(&self, limit: usize) -> DurableResult<Vec<Message>> {
        self.get_messages_ordered(limit, MessageOrder::TimestampDesc).await
    }

    /// The `limit` most recent messages in the requested order
    pub async fn get_messages_ordered(
        &self,
        limit: usize,
        order: MessageOrder,
    ) -> DurableResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .scan(
                Collection::Messages,
                index::TIMESTAMP,
                KeyRange::all(),
                Direction::Descending,
                Some(limit),
            )
            .await?;
        if order == MessageOrder::Chronological {
            messages.reverse();
        }
        tracing::debug!(count = messages.len(), limit, ?order, "loaded messages");
        Ok(messages)
    }

    /// Every message, oldest first
    pub async fn get_all_messages(&self) -> DurableResult<Vec<Message>> {
        self.scan(
            Collection::Messages,
            index::TIMESTAMP,
            KeyRange::all(),
            Direction::Ascending,
            None,
        )
        .await
    }

    /// Remove every message, returning how many were removed
    pub async fn clear_messages(&self) -> DurableResult<usize> {
        self.ensure_init()?;
        let removed = self.backend.clear(Collection::Messages).await?;
        tracing::info!(removed, "messages cleared");
        Ok(removed)
    }

    // Documents

    /// Upsert a document by id
    pub async fn save_document(&self, document: &Document) -> DurableResult<()> {
        self.put(Collection::Documents, document.id.as_str(), document).await
    }

    /// Every document, in no particular order
    pub async fn get_documents(&self) -> DurableResult<Vec<Document>> {
        self.all(Collection::Documents).await
    }

    /// One document by id
    pub async fn get_document(&self, id: &DocumentId) -> DurableResult<Option<Document>> {
        self.ensure_init()?;
        self.backend
            .get(Collection::Documents, id.as_str())
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(DurableError::from)
    }

    /// Documents of one type, oldest id first
    pub async fn get_documents_by_type(
        &self,
        doc_type: DocumentType,
    ) -> DurableResult<Vec<Document>> {
        self.scan(
            Collection::Documents,
            index::TYPE,
            KeyRange::only(doc_type.as_str()),
            Direction::Ascending,
            None,
        )
        .await
    }

    /// Documents carrying `tag`
    pub async fn get_documents_by_tag(&self, tag: &str) -> DurableResult<Vec<Document>> {
        self.scan(
            Collection::Documents,
            index::TAGS,
            KeyRange::only(tag),
            Direction::Ascending,
            None,
        )
        .await
    }

    /// Documents whose title or content contains `query` (case-insensitive)
    ///
    /// An empty query matches everything. When `tags` is non-empty, only
    /// documents carrying at least one of them are returned.
    pub async fn search_documents<S: AsRef<str>>(
        &self,
        query: &str,
        tags: &[S],
    ) -> DurableResult<Vec<Document>> {
        let candidates = if tags.is_empty() {
            self.get_documents().await?
        } else {
            let mut seen = HashSet::new();
            let mut found = Vec::new();
            for tag in tags {
                for doc in self.get_documents_by_tag(tag.as_ref()).await? {
                    if seen.insert(doc.id.clone()) {
                        found.push(doc);
                    }
                }
            }
            found
        };

        let results: Vec<Document> = candidates
            .into_iter()
            .filter(|d| d.text_contains(query) && (tags.is_empty() || d.has_any_tag(tags)))
            .collect();
        tracing::debug!(query, tags = tags.len(), results = results.len(), "document search");
        Ok(results)
    }

    /// Delete a document; `Ok(false)` if it did not exist
    pub async fn delete_document(&self, id: &DocumentId) -> DurableResult<bool> {
        self.ensure_init()?;
        let removed = self.backend.delete(Collection::Documents, id.as_str()).await?;
        tracing::debug!(id = %id, removed, "document deleted");
        Ok(removed)
    }

    // Projects

    /// Upsert a project by id
    pub async fn save_project(&self, project: &Project) -> DurableResult<()> {
        self.put(Collection::Projects, project.id.as_str(), project).await
    }

    /// Every project, most recently active first
    pub async fn get_projects(&self) -> DurableResult<Vec<Project>> {
        self.scan(
            Collection::Projects,
            index::LAST_ACTIVE,
            KeyRange::all(),
            Direction::Descending,
            None,
        )
        .await
    }

    /// Delete a project; `Ok(false)` if it did not exist
    pub async fn delete_project(&self, id: &ProjectId) -> DurableResult<bool> {
        self.ensure_init()?;
        let removed = self.backend.delete(Collection::Projects, id.as_str()).await?;
        tracing::debug!(id = %id, removed, "project deleted");
        Ok(removed)
    }

    // Analytics

    /// Record an event stamped with a fresh id and the current time
    pub async fn log_event(&self, event: &str, data: Value) -> DurableResult<AnalyticsEvent> {
        let entry = AnalyticsEvent::new(event, data, self.clock.now());
        self.save_event(&entry).await?;
        Ok(entry)
    }

    /// Upsert an already-stamped event
    pub async fn save_event(&self, event: &AnalyticsEvent) -> DurableResult<()> {
        self.put(Collection::Analytics, event.id.as_str(), event).await
    }

    /// Events from the last `days` days, oldest first
    pub async fn get_analytics(&self, days: u32) -> DurableResult<Vec<AnalyticsEvent>> {
        let cutoff = self.clock.now().days_before(days);
        self.scan(
            Collection::Analytics,
            index::TIMESTAMP,
            KeyRange::at_least(cutoff),
            Direction::Ascending,
            None,
        )
        .await
    }

    // Maintenance

    /// Delete messages and events older than `days_to_keep` days
    ///
    /// `0` removes every message and event.
    pub async fn clear_old_data(&self, days_to_keep: u32) -> DurableResult<ClearReport> {
        self.ensure_init()?;
        let report = if days_to_keep == 0 {
            ClearReport {
                messages: self.backend.clear(Collection::Messages).await?,
                events: self.backend.clear(Collection::Analytics).await?,
            }
        } else {
            let cutoff = self.clock.now().days_before(days_to_keep);
            ClearReport {
                messages: self
                    .backend
                    .delete_index_range(
                        Collection::Messages,
                        index::TIMESTAMP,
                        KeyRange::below(cutoff),
                    )
                    .await?,
                events: self
                    .backend
                    .delete_index_range(
                        Collection::Analytics,
                        index::TIMESTAMP,
                        KeyRange::below(cutoff),
                    )
                    .await?,
            }
        };
        tracing::info!(
            days_to_keep,
            messages = report.messages,
            events = report.events,
            "old data cleared"
        );
        Ok(report)
    }

    /// Empty all four collections, returning how many rows each held
    pub async fn clear_all(&self) -> DurableResult<StoreStats> {
        self.ensure_init()?;
        let removed = StoreStats {
            total_messages: self.backend.clear(Collection::Messages).await?,
            total_documents: self.backend.clear(Collection::Documents).await?,
            total_projects: self.backend.clear(Collection::Projects).await?,
            total_events: self.backend.clear(Collection::Analytics).await?,
        };
        tracing::warn!(removed = removed.total(), "all collections cleared");
        Ok(removed)
    }

    /// Row counts per collection
    pub async fn stats(&self) -> DurableResult<StoreStats> {
        self.ensure_init()?;
        Ok(StoreStats {
            total_messages: self.backend.count(Collection::Messages).await?,
            total_documents: self.backend.count(Collection::Documents).await?,
            total_projects: self.backend.count(Collection::Projects).await?,
            total_events: self.backend.count(Collection::Analytics).await?,
        })
    }

    /// Snapshot every collection into an export document
    pub async fn export_data(&self) -> DurableResult<ExportDocument> {
        let data = ExportData::new(
            self.all(Collection::Messages).await?,
            self.all(Collection::Documents).await?,
            self.all(Collection::Projects).await?,
            self.all(Collection::Analytics).await?,
        );
        tracing::info!(rows = data.stats.total(), "data exported");
        Ok(ExportDocument::new(data, self.clock.now()))
    }

    /// Upsert every row of an export, returning how many rows were written
    pub async fn import_data(&self, export: &ExportDocument) -> DurableResult<StoreStats> {
        export.check_version()?;
        self.ensure_init()?;

        let data = &export.data;
        for message in &data.messages {
            self.save_message(message).await?;
        }
        for document in &data.documents {
            self.save_document(document).await?;
        }
        for project in &data.projects {
            self.save_project(project).await?;
        }
        for event in &data.analytics {
            self.save_event(event).await?;
        }

        let imported = StoreStats {
            total_messages: data.messages.len(),
            total_documents: data.documents.len(),
            total_projects: data.projects.len(),
            total_events: data.analytics.len(),
        };
        tracing::info!(rows = imported.total(), "data imported");
        Ok(imported)
    }
}

fn decode_all<T: DeserializeOwned>(rows: Vec<Value>) -> DurableResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(DurableError::from))
        .collect()
}
