//! Background mirroring of state changes into the durable store
//!
//! Actions enqueue [`Job`]s on an unbounded channel (actions are
//! synchronous and cannot await). A single worker task applies them in
//! enqueue order, so writes to the same id are last-write-wins in call
//! order. Failed jobs are logged, optionally compensated, and broadcast as
//! [`PersistenceFailure`]s.

use crate::policy::ActionKind;
use harmonic_durable::{DurableResult, DurableStore};
use harmonic_model::{Document, DocumentId, Message, MessageId, Project, ProjectId};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A failed durable write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceFailure {
    /// Action family that issued the write
    pub action: ActionKind,
    /// Entity id the write targeted, if any
    pub id: Option<String>,
    /// Rendered durable error
    pub error: String,
    /// Whether in-memory state was compensated
    pub rolled_back: bool,
}

/// Durable write issued by an action
#[derive(Debug, Clone)]
pub(crate) enum PersistOp {
    SaveMessage(Message),
    ClearMessages,
    SaveDocument(Document),
    DeleteDocument(DocumentId),
    SaveProject(Project),
    DeleteProject(ProjectId),
    LogEvent { event: String, data: Value },
}

impl PersistOp {
    fn target_id(&self) -> Option<String> {
        match self {
            Self::SaveMessage(m) => Some(m.id.to_string()),
            Self::SaveDocument(d) => Some(d.id.to_string()),
            Self::DeleteDocument(id) => Some(id.to_string()),
            Self::SaveProject(p) => Some(p.id.to_string()),
            Self::DeleteProject(id) => Some(id.to_string()),
            Self::ClearMessages | Self::LogEvent { .. } => None,
        }
    }

    async fn apply(&self, durable: &DurableStore) -> DurableResult<()> {
        match self {
            Self::SaveMessage(m) => durable.save_message(m).await,
            Self::ClearMessages => durable.clear_messages().await.map(drop),
            Self::SaveDocument(d) => durable.save_document(d).await,
            Self::DeleteDocument(id) => durable.delete_document(id).await.map(drop),
            Self::SaveProject(p) => durable.save_project(p).await,
            Self::DeleteProject(id) => durable.delete_project(id).await.map(drop),
            Self::LogEvent { event, data } => {
                durable.log_event(event, data.clone()).await.map(drop)
            }
        }
    }
}

/// Undo step for an in-memory change, applied when its write fails
#[derive(Debug, Clone)]
pub(crate) enum Compensation {
    /// Remove an added message
    RemoveMessage(MessageId),
    /// Put cleared messages back in front of any added since
    RestoreMessages(Vec<Message>),
    /// Remove an added document
    RemoveDocument(DocumentId),
    /// Restore `previous` if the document is still at `written_version`
    RestoreDocument { previous: Document, written_version: u64 },
    /// Reinsert a deleted document at its old position if still absent
    ReinsertDocument { document: Document, index: usize },
    /// Remove an added project
    RemoveProject(ProjectId),
    /// Restore `previous` if the project still equals what was written
    RestoreProject { previous: Project, written: Project },
    /// Reinsert a deleted project at its old position if still absent
    ReinsertProject { project: Project, index: usize },
}

/// One unit of work for the worker
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) action: ActionKind,
    pub(crate) op: PersistOp,
    pub(crate) rollback: Option<Compensation>,
}

#[derive(Debug)]
pub(crate) enum Command {
    Persist(Job),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Applies compensations to the state owner
pub(crate) trait Compensate: Send + Sync {
    /// Apply an undo step; returns false if it was superseded
    fn compensate(&self, step: Compensation) -> bool;

    /// Report a failure to listeners
    fn report(&self, failure: PersistenceFailure);
}

/// Worker loop: apply jobs in order until shutdown or channel close
pub(crate) async fn run_worker<C: Compensate + 'static>(
    durable: Arc<DurableStore>,
    owner: std::sync::Weak<C>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    tracing::debug!("persistence worker started");
    while let Some(command) = rx.recv().await {
        match command {
            Command::Persist(job) => {
                let Err(err) = job.op.apply(&durable).await else {
                    tracing::trace!(action = %job.action, "persisted");
                    continue;
                };
                let id = job.op.target_id();
                tracing::error!(action = %job.action, id = ?id, error = %err, "persistence failed");

                let Some(owner) = owner.upgrade() else {
                    continue;
                };
                let rolled_back = match job.rollback {
                    Some(step) => {
                        let applied = owner.compensate(step);
                        if applied {
                            tracing::warn!(
                                action = %job.action,
                                id = ?id,
                                "in-memory change rolled back"
                            );
                        } else {
                            tracing::debug!(
                                action = %job.action,
                                id = ?id,
                                "rollback superseded by a newer change"
                            );
                        }
                        applied
                    }
                    None => false,
                };
                owner.report(PersistenceFailure {
                    action: job.action,
                    id,
                    error: err.to_string(),
                    rolled_back,
                });
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => break,
        }
    }
    tracing::debug!("persistence worker stopped");
}
