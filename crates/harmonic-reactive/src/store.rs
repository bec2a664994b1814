//! The reactive store: observable in-memory state with optimistic actions
//!
//! Every action updates state and hands its durable write to the
//! persistence worker under one write lock, then releases the lock and
//! notifies subscribers synchronously. Actions never fail and never wait
//! for the write.

use crate::error::{ReactiveError, ReactiveResult};
use crate::persistence::{
    run_worker, Command, Compensate, Compensation, Job, PersistOp, PersistenceFailure,
};
use crate::policy::{ActionKind, PersistencePolicies};
use crate::state::{AppState, FeatureFlags, Page, Theme};
use harmonic_durable::{DurableStore, MessageOrder};
use harmonic_model::{
    Clock, Document, DocumentId, DocumentPatch, Message, MessageId, NewDocument, NewMessage,
    NewProject, Project, ProjectId, ProjectPatch,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Name of the analytics event logged on page changes
pub const NAVIGATION_EVENT: &str = "navigation";

/// Outcome of an action addressed by id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Mutation {
    /// State changed
    Applied,
    /// No entity with that id; state unchanged
    NotFound,
}

impl Mutation {
    /// True if state changed
    #[inline]
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Handle returned by [`ReactiveStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Reactive store settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactiveConfig {
    /// Rollback policy per action family
    pub policies: PersistencePolicies,
    /// Buffered failures per lagging failure subscriber
    pub failure_channel_capacity: usize,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            policies: PersistencePolicies::default(),
            failure_channel_capacity: 64,
        }
    }
}

type Callback = Arc<dyn Fn(&AppState) + Send + Sync>;

/// State and listeners shared with the persistence worker
struct Shared {
    state: RwLock<Arc<AppState>>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    failures: broadcast::Sender<PersistenceFailure>,
}

impl Shared {
    /// Run `f` against the state; notify subscribers if it returned `Some`
    fn update<R>(&self, f: impl FnOnce(&mut AppState) -> Option<R>) -> Option<R> {
        self.update_then(f, |r| r)
    }

    /// Like [`Shared::update`], running `commit` on the result before the
    /// write lock is released
    ///
    /// Durable writes are enqueued from `commit`, so the worker sees them in
    /// the same order as the state changes, even when a subscriber or
    /// another thread acts in between.
    fn update_then<R, T>(
        &self,
        f: impl FnOnce(&mut AppState) -> Option<R>,
        commit: impl FnOnce(R) -> T,
    ) -> Option<T> {
        let (result, snapshot) = {
            let mut guard = self.state.write();
            let result = f(Arc::make_mut(&mut guard)).map(commit);
            (result, Arc::clone(&guard))
        };
        if result.is_some() {
            self.notify(&snapshot);
        }
        result
    }

    fn notify(&self, snapshot: &AppState) {
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(snapshot);
        }
    }
}

impl Compensate for Shared {
    fn compensate(&self, step: Compensation) -> bool {
        self.update(|state| undo(state, step).then_some(())).is_some()
    }

    fn report(&self, failure: PersistenceFailure) {
        // No receivers is fine.
        let _ = self.failures.send(failure);
    }
}

/// Apply an undo step; false if a newer change superseded it
fn undo(state: &mut AppState, step: Compensation) -> bool {
    match step {
        Compensation::RemoveMessage(id) => match state.messages.iter().position(|m| m.id == id) {
            Some(index) => {
                state.messages.remove(index);
                true
            }
            None => false,
        },
        Compensation::RestoreMessages(cleared) => {
            if cleared.is_empty() {
                return false;
            }
            let restored: HashSet<MessageId> = cleared.iter().map(|m| m.id.clone()).collect();
            let since = std::mem::take(&mut state.messages);
            state.messages = cleared;
            state.messages.extend(since.into_iter().filter(|m| !restored.contains(&m.id)));
            true
        }
        Compensation::RemoveDocument(id) => match state.document_index(&id) {
            Some(index) => {
                state.documents.remove(index);
                if state.selected_document.as_ref() == Some(&id) {
                    state.selected_document = None;
                }
                true
            }
            None => false,
        },
        Compensation::RestoreDocument { previous, written_version } => {
            match state.documents.iter_mut().find(|d| d.id == previous.id) {
                Some(current) if current.version == written_version => {
                    *current = previous;
                    true
                }
                _ => false,
            }
        }
        Compensation::ReinsertDocument { document, index } => {
            if state.document_index(&document.id).is_some() {
                return false;
            }
            let index = index.min(state.documents.len());
            state.documents.insert(index, document);
            true
        }
        Compensation::RemoveProject(id) => match state.project_index(&id) {
            Some(index) => {
                state.projects.remove(index);
                if state.selected_project.as_ref() == Some(&id) {
                    state.selected_project = None;
                }
                true
            }
            None => false,
        },
        Compensation::RestoreProject { previous, written } => {
            match state.projects.iter_mut().find(|p| p.id == previous.id) {
                Some(current) if *current == written => {
                    *current = previous;
                    true
                }
                _ => false,
            }
        }
        Compensation::ReinsertProject { project, index } => {
            if state.project_index(&project.id).is_some() {
                return false;
            }
            let index = index.min(state.projects.len());
            state.projects.insert(index, project);
            true
        }
    }
}

/// Observable application state mirrored into a [`DurableStore`]
pub struct ReactiveStore {
    shared: Arc<Shared>,
    durable: Arc<DurableStore>,
    clock: Arc<dyn Clock>,
    policies: PersistencePolicies,
    tx: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for ReactiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveStore")
            .field("durable", &self.durable)
            .field("policies", &self.policies)
            .field("subscribers", &self.shared.subscribers.lock().len())
            .field("running", &self.worker.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl ReactiveStore {
    /// Create a store and start its persistence worker
    ///
    /// # Errors
    /// [`ReactiveError::NoRuntime`] when called outside a Tokio runtime.
    pub fn new(durable: Arc<DurableStore>, config: ReactiveConfig) -> ReactiveResult<Self> {
        let runtime = Handle::try_current().map_err(|_| ReactiveError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (failures, _) = broadcast::channel(config.failure_channel_capacity.max(1));
        let shared = Arc::new(Shared {
            state: RwLock::new(Arc::new(AppState::default())),
            subscribers: Mutex::new(Vec::new()),
            failures,
        });
        let worker = runtime.spawn(run_worker(Arc::clone(&durable), Arc::downgrade(&shared), rx));

        Ok(Self {
            shared,
            clock: Arc::clone(durable.clock()),
            durable,
            policies: config.policies,
            tx,
            worker: Mutex::new(Some(worker)),
            next_subscription: AtomicU64::new(1),
        })
    }

    /// The durable store this store mirrors into
    #[inline]
    #[must_use]
    pub fn durable(&self) -> &Arc<DurableStore> {
        &self.durable
    }

    /// Active persistence policies
    #[inline]
    #[must_use]
    pub fn policies(&self) -> &PersistencePolicies {
        &self.policies
    }

    // Observation

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> Arc<AppState> {
        Arc::clone(&self.shared.state.read())
    }

    /// Documents matching the current search term
    #[must_use]
    pub fn filtered_documents(&self) -> Vec<Document> {
        self.snapshot().filtered_documents().into_iter().cloned().collect()
    }

    /// Call `callback` with the new state after every change
    ///
    /// Callbacks run on the thread that performed the action, after the
    /// state lock is released, so they may call actions themselves.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AppState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.shared.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Stop notifying a subscriber; false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.shared.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Receive every failed durable write from now on
    #[must_use]
    pub fn subscribe_failures(&self) -> broadcast::Receiver<PersistenceFailure> {
        self.shared.failures.subscribe()
    }

    // Navigation and preferences

    /// Switch page; logs a navigation event when the flag is on
    pub fn set_current_page(&self, page: Page) {
        self.shared.update_then(
            |s| {
                s.current_page = page;
                Some(s.feature_flags)
            },
            |flags| {
                if flags.navigation_analytics {
                    self.log_event(NAVIGATION_EVENT, json!({ "page": page.as_str() }));
                }
            },
        );
        tracing::debug!(page = page.as_str(), "page changed");
    }

    /// Replace the feature flags
    pub fn set_feature_flags(&self, flags: FeatureFlags) {
        self.shared.update(|s| {
            s.feature_flags = flags;
            Some(())
        });
    }

    /// Switch color theme
    pub fn set_theme(&self, theme: Theme) {
        self.shared.update(|s| {
            s.theme = theme;
            Some(())
        });
    }

    /// Record an analytics event (fire-and-forget)
    pub fn log_event(&self, event: impl Into<String>, data: Value) {
        self.enqueue(Job {
            action: ActionKind::LogEvent,
            op: PersistOp::LogEvent {
                event: event.into(),
                data,
            },
            rollback: None,
        });
    }

    // Messages

    /// Append a message stamped with a fresh id and the current time
    pub fn add_message(&self, input: NewMessage) -> Message {
        let message = Message::create(MessageId::generate(), input, self.clock.now());
        self.shared.update_then(
            |s| {
                s.messages.push(message.clone());
                Some(())
            },
            |()| {
                self.persist(
                    ActionKind::AddMessage,
                    PersistOp::SaveMessage(message.clone()),
                    Compensation::RemoveMessage(message.id.clone()),
                );
            },
        );
        tracing::debug!(id = %message.id, role = message.role.as_str(), "message added");
        message
    }

    /// Remove every message, returning how many were removed
    pub fn clear_messages(&self) -> usize {
        let count = self
            .shared
            .update_then(
                |s| Some(std::mem::take(&mut s.messages)),
                |cleared| {
                    let count = cleared.len();
                    self.persist(
                        ActionKind::ClearMessages,
                        PersistOp::ClearMessages,
                        Compensation::RestoreMessages(cleared),
                    );
                    count
                },
            )
            .unwrap_or_default();
        tracing::debug!(count, "messages cleared");
        count
    }

    // Documents

    /// Append a document at version 1
    pub fn add_document(&self, input: NewDocument) -> Document {
        let document = Document::create(DocumentId::generate(), input, self.clock.now());
        self.shared.update_then(
            |s| {
                s.documents.push(document.clone());
                Some(())
            },
            |()| {
                self.persist(
                    ActionKind::AddDocument,
                    PersistOp::SaveDocument(document.clone()),
                    Compensation::RemoveDocument(document.id.clone()),
                );
            },
        );
        tracing::debug!(id = %document.id, "document added");
        document
    }

    /// Merge `patch` into a document, bumping `updated_at` and the version
    ///
    /// Unknown ids are a silent no-op reported as [`Mutation::NotFound`].
    pub fn update_document(&self, id: &DocumentId, patch: DocumentPatch) -> Mutation {
        let now = self.clock.now();
        let outcome = self.shared.update_then(
            |s| {
                let document = s.documents.iter_mut().find(|d| &d.id == id)?;
                let previous = document.clone();
                document.apply(patch, now);
                Some((previous, document.clone()))
            },
            |(previous, written)| {
                let written_version = written.version;
                self.persist(
                    ActionKind::UpdateDocument,
                    PersistOp::SaveDocument(written),
                    Compensation::RestoreDocument {
                        previous,
                        written_version,
                    },
                );
                written_version
            },
        );
        let Some(version) = outcome else {
            tracing::debug!(id = %id, "update_document: no such document");
            return Mutation::NotFound;
        };
        tracing::debug!(id = %id, version, "document updated");
        Mutation::Applied
    }

    /// Remove a document, clearing the selection if it pointed at it
    pub fn delete_document(&self, id: &DocumentId) -> Mutation {
        let outcome = self.shared.update_then(
            |s| {
                let index = s.document_index(id)?;
                let document = s.documents.remove(index);
                if s.selected_document.as_ref() == Some(id) {
                    s.selected_document = None;
                }
                Some((document, index))
            },
            |(document, index)| {
                self.persist(
                    ActionKind::DeleteDocument,
                    PersistOp::DeleteDocument(id.clone()),
                    Compensation::ReinsertDocument { document, index },
                );
            },
        );
        if outcome.is_none() {
            tracing::debug!(id = %id, "delete_document: no such document");
            return Mutation::NotFound;
        }
        tracing::debug!(id = %id, "document deleted");
        Mutation::Applied
    }

    /// Select a document, or clear the selection
    pub fn set_selected_document(&self, id: Option<DocumentId>) {
        self.shared.update(|s| {
            s.selected_document = id;
            Some(())
        });
    }

    /// Set the documentation search term
    pub fn set_search_term(&self, term: impl Into<String>) {
        let term = term.into();
        self.shared.update(|s| {
            s.search_term = term;
            Some(())
        });
    }

    // Projects

    /// Append a project
    pub fn add_project(&self, input: NewProject) -> Project {
        let project = Project::create(ProjectId::generate(), input, self.clock.now());
        self.shared.update_then(
            |s| {
                s.projects.push(project.clone());
                Some(())
            },
            |()| {
                self.persist(
                    ActionKind::AddProject,
                    PersistOp::SaveProject(project.clone()),
                    Compensation::RemoveProject(project.id.clone()),
                );
            },
        );
        tracing::debug!(id = %project.id, name = %project.name, "project added");
        project
    }

    /// Merge `patch` into a project and bump its activity
    pub fn update_project(&self, id: &ProjectId, patch: ProjectPatch) -> Mutation {
        let now = self.clock.now();
        self.touch_project(id, "update_project", |project, _| project.apply(patch, now))
    }

    /// Select a project and bump its activity
    pub fn select_project(&self, id: &ProjectId) -> Mutation {
        let now = self.clock.now();
        self.touch_project(id, "select_project", |project, selected| {
            project.touch(now);
            *selected = Some(project.id.clone());
        })
    }

    fn touch_project(
        &self,
        id: &ProjectId,
        action: &'static str,
        f: impl FnOnce(&mut Project, &mut Option<ProjectId>),
    ) -> Mutation {
        let outcome = self.shared.update_then(
            |s| {
                let index = s.project_index(id)?;
                let previous = s.projects[index].clone();
                f(&mut s.projects[index], &mut s.selected_project);
                Some((previous, s.projects[index].clone()))
            },
            |(previous, written)| {
                let last_active = written.last_active;
                self.persist(
                    ActionKind::UpdateProject,
                    PersistOp::SaveProject(written.clone()),
                    Compensation::RestoreProject { previous, written },
                );
                last_active
            },
        );
        let Some(last_active) = outcome else {
            tracing::debug!(id = %id, action, "no such project");
            return Mutation::NotFound;
        };
        tracing::debug!(id = %id, action, %last_active, "project touched");
        Mutation::Applied
    }

    /// Remove a project, clearing the selection if it pointed at it
    pub fn delete_project(&self, id: &ProjectId) -> Mutation {
        let outcome = self.shared.update_then(
            |s| {
                let index = s.project_index(id)?;
                let project = s.projects.remove(index);
                if s.selected_project.as_ref() == Some(id) {
                    s.selected_project = None;
                }
                Some((project, index))
            },
            |(project, index)| {
                self.persist(
                    ActionKind::DeleteProject,
                    PersistOp::DeleteProject(id.clone()),
                    Compensation::ReinsertProject { project, index },
                );
            },
        );
        if outcome.is_none() {
            tracing::debug!(id = %id, "delete_project: no such project");
            return Mutation::NotFound;
        }
        Mutation::Applied
    }

    // Lifecycle

    /// Load recent durable rows into state
    ///
    /// Pending writes are flushed first. Loaded rows take their durable
    /// position; rows changed in this session keep their in-memory version,
    /// and rows only present in memory are kept after the loaded ones.
    pub async fn initialize(&self, message_limit: usize) -> ReactiveResult<()> {
        self.durable.init().await?;
        self.flush().await?;

        let messages = self
            .durable
            .get_messages_ordered(message_limit, MessageOrder::Chronological)
            .await?;
        let mut documents = self.durable.get_documents().await?;
        documents.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        let projects = self.durable.get_projects().await?;

        let counts = (messages.len(), documents.len(), projects.len());
        self.shared.update(|s| {
            let session = std::mem::take(&mut s.messages);
            s.messages = merge_hydrated(messages, session, |m| m.id.clone());
            let session = std::mem::take(&mut s.documents);
            s.documents = merge_hydrated(documents, session, |d| d.id.clone());
            let session = std::mem::take(&mut s.projects);
            s.projects = merge_hydrated(projects, session, |p| p.id.clone());
            s.hydrated = true;
            Some(())
        });
        tracing::info!(
            messages = counts.0,
            documents = counts.1,
            projects = counts.2,
            "reactive store hydrated"
        );
        Ok(())
    }

    /// Wait until every write issued so far has been applied
    pub async fn flush(&self) -> ReactiveResult<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .map_err(|_| ReactiveError::WorkerStopped)?;
        done.await.map_err(|_| ReactiveError::WorkerStopped)
    }

    /// Flush pending writes, stop the worker and drop subscribers
    ///
    /// Later actions still update memory but are no longer persisted.
    pub async fn dispose(&self) -> ReactiveResult<()> {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return Ok(());
        };
        let flushed = self.flush().await;
        let _ = self.tx.send(Command::Shutdown);
        worker.await.map_err(|_| ReactiveError::WorkerStopped)?;
        self.shared.subscribers.lock().clear();
        tracing::info!("reactive store disposed");
        flushed
    }

    fn persist(&self, action: ActionKind, op: PersistOp, compensation: Compensation) {
        let rollback = self
            .policies
            .for_action(action)
            .rolls_back()
            .then_some(compensation);
        self.enqueue(Job { action, op, rollback });
    }

    fn enqueue(&self, job: Job) {
        let sent = self.tx.send(Command::Persist(job));
        if let Err(mpsc::error::SendError(Command::Persist(job))) = sent {
            tracing::warn!(
                action = %job.action,
                "persistence worker stopped; change kept in memory only"
            );
            self.shared.report(PersistenceFailure {
                action: job.action,
                id: None,
                error: ReactiveError::WorkerStopped.to_string(),
                rolled_back: false,
            });
        }
    }
}

/// Loaded rows in durable order (session versions win), then session-only rows
fn merge_hydrated<T, K, F>(loaded: Vec<T>, session: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let loaded_keys: HashSet<K> = loaded.iter().map(&key).collect();
    let mut overrides = HashMap::new();
    let mut extras = Vec::new();
    for item in session {
        let k = key(&item);
        if loaded_keys.contains(&k) {
            overrides.insert(k, item);
        } else {
            extras.push(item);
        }
    }
    loaded
        .into_iter()
        .map(|item| overrides.remove(&key(&item)).unwrap_or(item))
        .chain(extras)
        .collect()
}
