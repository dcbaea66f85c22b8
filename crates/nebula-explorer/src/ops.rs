//! Pending operation state machine
//!
//! Every mutation is tracked as a [`PendingOp`] moving through
//! `Requested → Committing → {Applied | RolledBack}`. Illegal transitions
//! are reported as errors, never silently accepted. Settled operations
//! land in a bounded [`Journal`].

use crate::error::ErrorKind;
use nebula_tree::{Namespace, NodeId};
use serde::Serialize;
use std::collections::VecDeque;

/// Mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Create a node
    Create,
    /// Rename a node
    Rename,
    /// Delete a subtree
    Delete,
    /// Reparent a node
    Move,
    /// Duplicate a node
    Copy,
}

impl OpKind {
    /// Lowercase label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Rename => "rename",
            OpKind::Delete => "delete",
            OpKind::Move => "move",
            OpKind::Copy => "copy",
        }
    }
}

/// Lifecycle phase of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpPhase {
    /// Accepted, local validation in progress
    Requested,
    /// Waiting on the collaborator
    Committing,
    /// Remote confirmed and store updated
    Applied,
    /// Rejected, failed or diverged; store holds its prior state
    RolledBack,
}

impl OpPhase {
    /// Whether the operation has settled
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, OpPhase::Applied | OpPhase::RolledBack)
    }
}

/// Phase change outside the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal operation transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    /// Current phase
    pub from: OpPhase,
    /// Requested phase
    pub to: OpPhase,
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: OpPhase) -> Vec<OpPhase> {
    use OpPhase::{Applied, Committing, Requested, RolledBack};
    match from {
        Requested => vec![Committing, RolledBack],
        Committing => vec![Applied, RolledBack],
        Applied | RolledBack => vec![],
    }
}

/// Validates a phase change
///
/// # Errors
/// `IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: OpPhase, to: OpPhase) -> Result<(), IllegalTransition> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

/// In-flight operation on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOp {
    kind: OpKind,
    target: NodeId,
    namespace: Namespace,
    generation: u64,
    phase: OpPhase,
}

impl PendingOp {
    /// New operation in `Requested`
    #[must_use]
    pub fn new(kind: OpKind, target: NodeId, namespace: Namespace, generation: u64) -> Self {
        Self {
            kind,
            target,
            namespace,
            generation,
            phase: OpPhase::Requested,
        }
    }

    /// Operation kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Locked node (the draft id for creates)
    #[inline]
    #[must_use]
    pub fn target(&self) -> &NodeId {
        &self.target
    }

    /// Namespace of the target
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Generation stamp
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> OpPhase {
        self.phase
    }

    /// Move to the next phase
    ///
    /// # Errors
    /// `IllegalTransition` if the table forbids it; the phase is unchanged
    pub fn advance(&mut self, to: OpPhase) -> Result<(), IllegalTransition> {
        validate_transition(self.phase, to)?;
        self.phase = to;
        Ok(())
    }

    /// Journal entry for a settled operation
    #[must_use]
    pub fn record(&self, error: Option<ErrorKind>) -> OpRecord {
        OpRecord {
            generation: self.generation,
            kind: self.kind,
            target: self.target.clone(),
            namespace: self.namespace,
            outcome: self.phase,
            error,
        }
    }
}

/// Settled operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpRecord {
    /// Generation stamp
    pub generation: u64,
    /// Operation kind
    pub kind: OpKind,
    /// Target node
    pub target: NodeId,
    /// Target namespace
    pub namespace: Namespace,
    /// Terminal phase
    pub outcome: OpPhase,
    /// Failure class, if rolled back
    pub error: Option<ErrorKind>,
}

/// Bounded history of settled operations, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    capacity: usize,
    entries: VecDeque<OpRecord>,
}

impl Journal {
    /// Journal keeping at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.clamp(1, 1024)),
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&mut self, record: OpRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &OpRecord> {
        self.entries.iter()
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
