//! Error types for the explorer
//!
//! Provides the taxonomy surfaced to the host:
//! - Stale or missing references (`NotFound`)
//! - User-correctable input (`DuplicateName`, `InvalidName`, `InvalidMove`)
//! - Contention (`Busy`), retryable after the pending work settles
//! - Divergence from the remote (`Conflict`), which calls for a resync
//! - Transport failures (`NetworkFailure`), retryable

use crate::backend::BackendError;
use nebula_tree::{MoveRejection, NodeId, StoreError};
use serde::Serialize;
use std::fmt;

/// Main explorer error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExplorerError {
    /// Referenced node is absent
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// Sibling with the same name and category exists
    #[error("a sibling named '{name}' already exists")]
    DuplicateName {
        /// Colliding name
        name: String,
    },

    /// Name is empty after trimming
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Reparent rejected before any network call
    #[error("cannot move {id} under {target}: {reason}")]
    InvalidMove {
        /// Node being moved
        id: NodeId,
        /// Requested parent
        target: NodeId,
        /// Why the move is invalid
        reason: MoveRejection,
    },

    /// Node is part of a connection's fixed schema
    #[error("node {0} is protected")]
    Protected(NodeId),

    /// Node already has a pending operation or load
    #[error("node {0} is busy")]
    Busy(NodeId),

    /// Remote state diverged from local assumptions
    #[error("conflict{}: {reason}", at_node(.id))]
    Conflict {
        /// Node the conflict was detected on
        id: Option<NodeId>,
        /// What diverged
        reason: ConflictReason,
    },

    /// Transient transport failure
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Node cannot hold children
    #[error("node {0} is not a container")]
    NotAContainer(NodeId),

    /// Node cannot be opened
    #[error("node {0} is not a leaf")]
    NotALeaf(NodeId),

    /// Parent is a lazy container that is not loaded
    #[error("children of {0} are not loaded")]
    ParentNotLoaded(NodeId),

    /// Payload breaks the fixed database schema
    #[error("{0} does not fit the fixed database schema")]
    InvalidScaffold(NodeId),

    /// Background task failed
    #[error("internal error: {0}")]
    Internal(String),
}

fn at_node(id: &Option<NodeId>) -> String {
    id.as_ref().map(|id| format!(" on {id}")).unwrap_or_default()
}

/// What a [`ExplorerError::Conflict`] detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Target vanished while the request was in flight
    NodeRemoved,
    /// Parent vanished while the request was in flight
    ParentRemoved,
    /// A newer load or operation replaced this one
    Superseded,
    /// A sibling took the name while the request was in flight
    NameTaken,
    /// Collaborator rejected or contradicted the request
    RemoteDiverged(String),
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeRemoved => f.write_str("node was removed"),
            Self::ParentRemoved => f.write_str("parent was removed"),
            Self::Superseded => f.write_str("superseded by a newer request"),
            Self::NameTaken => f.write_str("name was taken meanwhile"),
            Self::RemoteDiverged(detail) => write!(f, "remote diverged ({detail})"),
        }
    }
}

/// Coarse error classification for hosts and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`ExplorerError::NotFound`]
    NotFound,
    /// See [`ExplorerError::DuplicateName`]
    DuplicateName,
    /// See [`ExplorerError::InvalidName`]
    InvalidName,
    /// See [`ExplorerError::InvalidMove`]
    InvalidMove,
    /// See [`ExplorerError::Protected`]
    Protected,
    /// See [`ExplorerError::Busy`]
    Busy,
    /// See [`ExplorerError::Conflict`]
    Conflict,
    /// See [`ExplorerError::NetworkFailure`]
    NetworkFailure,
    /// See [`ExplorerError::NotAContainer`]
    NotAContainer,
    /// See [`ExplorerError::NotALeaf`]
    NotALeaf,
    /// See [`ExplorerError::ParentNotLoaded`]
    ParentNotLoaded,
    /// See [`ExplorerError::InvalidScaffold`]
    InvalidScaffold,
    /// See [`ExplorerError::Internal`]
    Internal,
}

impl ExplorerError {
    /// Classification of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateName { .. } => ErrorKind::DuplicateName,
            Self::InvalidName(_) => ErrorKind::InvalidName,
            Self::InvalidMove { .. } => ErrorKind::InvalidMove,
            Self::Protected(_) => ErrorKind::Protected,
            Self::Busy(_) => ErrorKind::Busy,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NetworkFailure(_) => ErrorKind::NetworkFailure,
            Self::NotAContainer(_) => ErrorKind::NotAContainer,
            Self::NotALeaf(_) => ErrorKind::NotALeaf,
            Self::ParentNotLoaded(_) => ErrorKind::ParentNotLoaded,
            Self::InvalidScaffold(_) => ErrorKind::InvalidScaffold,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if repeating the request later may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::Busy(_))
    }

    /// Check if local state should be refetched
    #[inline]
    #[must_use]
    pub fn needs_resync(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Conflict detected on `id`
    #[inline]
    pub fn conflict(id: &NodeId, reason: ConflictReason) -> Self {
        Self::Conflict {
            id: Some(id.clone()),
            reason,
        }
    }

    /// Map a collaborator failure for a request about `target`
    ///
    /// Transport errors stay retryable; a missing or refusing remote means
    /// local state no longer matches it.
    #[must_use]
    pub fn from_remote(err: BackendError, target: Option<&NodeId>) -> Self {
        match err {
            BackendError::Network(detail) => Self::NetworkFailure(detail),
            BackendError::Timeout => Self::NetworkFailure("request timed out".to_string()),
            BackendError::DuplicateName(name) => Self::DuplicateName { name },
            BackendError::NotFound(id) => Self::Conflict {
                id: Some(id),
                reason: ConflictReason::NodeRemoved,
            },
            BackendError::Rejected(detail) => Self::Conflict {
                id: target.cloned(),
                reason: ConflictReason::RemoteDiverged(detail),
            },
        }
    }

    /// Map a store error raised while applying a confirmed remote result
    ///
    /// The request was valid when issued, so any structural refusal now
    /// means the two sides diverged.
    #[must_use]
    pub fn on_apply(err: StoreError, target: &NodeId) -> Self {
        let reason = match err {
            StoreError::NotFound(ref missing) if missing == target => ConflictReason::NodeRemoved,
            StoreError::NotFound(_) => ConflictReason::ParentRemoved,
            StoreError::DuplicateName { .. } => ConflictReason::NameTaken,
            other => ConflictReason::RemoteDiverged(other.to_string()),
        };
        Self::conflict(target, reason)
    }
}

impl From<StoreError> for ExplorerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::DuplicateName { name, .. } => Self::DuplicateName { name },
            StoreError::DuplicateId(id) => Self::conflict(
                &id,
                ConflictReason::RemoteDiverged("id already present".to_string()),
            ),
            StoreError::InvalidMove {
                id,
                reason: MoveRejection::Protected,
                ..
            } => Self::Protected(id),
            StoreError::InvalidMove { id, target, reason } => Self::InvalidMove { id, target, reason },
            StoreError::NotAContainer(id) => Self::NotAContainer(id),
            StoreError::ParentNotLoaded(id) => Self::ParentNotLoaded(id),
            StoreError::InvalidScaffold(id) => Self::InvalidScaffold(id),
        }
    }
}
