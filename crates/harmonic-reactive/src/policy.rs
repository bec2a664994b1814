//! Persistence policies per action family

use serde::{Deserialize, Serialize};

/// Action families that mirror state into the durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// `add_message`
    AddMessage,
    /// `clear_messages`
    ClearMessages,
    /// `add_document`
    AddDocument,
    /// `update_document`
    UpdateDocument,
    /// `delete_document`
    DeleteDocument,
    /// `add_project`
    AddProject,
    /// `update_project` and `select_project`
    UpdateProject,
    /// `delete_project`
    DeleteProject,
    /// `log_event` and navigation events
    LogEvent,
}

impl ActionKind {
    /// Log name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddMessage => "add_message",
            Self::ClearMessages => "clear_messages",
            Self::AddDocument => "add_document",
            Self::UpdateDocument => "update_document",
            Self::DeleteDocument => "delete_document",
            Self::AddProject => "add_project",
            Self::UpdateProject => "update_project",
            Self::DeleteProject => "delete_project",
            Self::LogEvent => "log_event",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to in-memory state when its durable write fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Keep the in-memory change; log and report the failure
    #[default]
    OptimisticNoRollback,
    /// Undo the in-memory change, unless it was superseded since
    OptimisticWithRollback,
}

impl PersistencePolicy {
    /// True if failures are compensated
    #[inline]
    #[must_use]
    pub fn rolls_back(self) -> bool {
        matches!(self, Self::OptimisticWithRollback)
    }
}

/// Policy per action family
///
/// The default rolls back only a failed `add_document`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistencePolicies {
    /// `add_message`
    pub add_message: PersistencePolicy,
    /// `clear_messages`
    pub clear_messages: PersistencePolicy,
    /// `add_document`
    pub add_document: PersistencePolicy,
    /// `update_document`
    pub update_document: PersistencePolicy,
    /// `delete_document`
    pub delete_document: PersistencePolicy,
    /// `add_project`
    pub add_project: PersistencePolicy,
    /// `update_project` and `select_project`
    pub update_project: PersistencePolicy,
    /// `delete_project`
    pub delete_project: PersistencePolicy,
}

impl Default for PersistencePolicies {
    fn default() -> Self {
        Self {
            add_message: PersistencePolicy::OptimisticNoRollback,
            clear_messages: PersistencePolicy::OptimisticNoRollback,
            add_document: PersistencePolicy::OptimisticWithRollback,
            update_document: PersistencePolicy::OptimisticNoRollback,
            delete_document: PersistencePolicy::OptimisticNoRollback,
            add_project: PersistencePolicy::OptimisticNoRollback,
            update_project: PersistencePolicy::OptimisticNoRollback,
            delete_project: PersistencePolicy::OptimisticNoRollback,
        }
    }
}

impl PersistencePolicies {
    /// Same policy for every action family
    #[must_use]
    pub fn uniform(policy: PersistencePolicy) -> Self {
        Self {
            add_message: policy,
            clear_messages: policy,
            add_document: policy,
            update_document: policy,
            delete_document: policy,
            add_project: policy,
            update_project: policy,
            delete_project: policy,
        }
    }

    /// Policy for an action family
    ///
    /// Analytics events carry no in-memory state, so they never roll back.
    #[must_use]
    pub fn for_action(&self, action: ActionKind) -> PersistencePolicy {
        match action {
            ActionKind::AddMessage => self.add_message,
            ActionKind::ClearMessages => self.clear_messages,
            ActionKind::AddDocument => self.add_document,
            ActionKind::UpdateDocument => self.update_document,
            ActionKind::DeleteDocument => self.delete_document,
            ActionKind::AddProject => self.add_project,
            ActionKind::UpdateProject => self.update_project,
            ActionKind::DeleteProject => self.delete_project,
            ActionKind::LogEvent => PersistencePolicy::OptimisticNoRollback,
        }
    }

    /// Override the policy of one action family
    #[must_use]
    pub fn with(mut self, action: ActionKind, policy: PersistencePolicy) -> Self {
        match action {
            ActionKind::AddMessage => self.add_message = policy,
            ActionKind::ClearMessages => self.clear_messages = policy,
            ActionKind::AddDocument => self.add_document = policy,
            ActionKind::UpdateDocument => self.update_document = policy,
            ActionKind::DeleteDocument => self.delete_document = policy,
            ActionKind::AddProject => self.add_project = policy,
            ActionKind::UpdateProject => self.update_project = policy,
            ActionKind::DeleteProject => self.delete_project = policy,
            ActionKind::LogEvent => {}
        }
        self
    }
}
