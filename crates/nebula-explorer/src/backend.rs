//! Persistence collaborator interface
//!
//! The explorer never owns durable state. Every structural change is
//! confirmed by a [`ProjectBackend`] before (or, for moves, after) it is
//! reflected in the local store.

use nebula_tree::{Namespace, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

/// Node as returned by the collaborator
///
/// `children: None` is a leaf; a lazy container arrives with an empty list.
pub use nebula_tree::NewNode as RemoteNode;

/// Client-side request to create a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDraft {
    /// Provisional id; the collaborator's id replaces it
    pub id: NodeId,
    /// Requested name
    pub name: String,
    /// Requested kind
    pub kind: NodeKind,
}

impl NodeDraft {
    /// Draft with a freshly generated provisional id
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            kind,
        }
    }
}

/// Errors reported by the collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Collaborator gave up waiting
    #[error("request timed out")]
    Timeout,

    /// Remote sibling collision
    #[error("name already taken: {0}")]
    DuplicateName(String),

    /// Remote has no such node
    #[error("remote node not found: {0}")]
    NotFound(NodeId),

    /// Remote refused the request
    #[error("rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether repeating the request may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

/// Remote store of project resources
#[async_trait::async_trait]
pub trait ProjectBackend: Send + Sync {
    /// Root nodes of a namespace, with immediate children for eager containers
    async fn list_roots(&self, namespace: Namespace) -> Result<Vec<RemoteNode>, BackendError>;

    /// Children of a lazy container
    async fn fetch_children(
        &self,
        parent: &NodeId,
        namespace: Namespace,
    ) -> Result<Vec<RemoteNode>, BackendError>;

    /// Create a node; returns it with its permanent id
    async fn create_node(
        &self,
        namespace: Namespace,
        parent: Option<&NodeId>,
        draft: &NodeDraft,
    ) -> Result<RemoteNode, BackendError>;

    /// Rename a node
    async fn rename_node(&self, id: &NodeId, name: &str) -> Result<(), BackendError>;

    /// Delete a node and its subtree
    async fn delete_node(&self, id: &NodeId) -> Result<(), BackendError>;

    /// Move a node under a new parent; the remote re-validates cycles
    async fn move_node(
        &self,
        id: &NodeId,
        new_parent: &NodeId,
        namespace: Namespace,
    ) -> Result<(), BackendError>;

    /// Duplicate a node; returns the copy
    async fn copy_node(&self, id: &NodeId) -> Result<RemoteNode, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drafts_get_distinct_ids() {
        let a = NodeDraft::new("Home", NodeKind::Folder);
        let b = NodeDraft::new("Home", NodeKind::Folder);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(BackendError::Timeout.is_transient());
        assert!(BackendError::Network("reset".into()).is_transient());
        assert!(!BackendError::Rejected("cycle".into()).is_transient());
        assert!(!BackendError::NotFound(NodeId::new("x")).is_transient());
    }

    #[test]
    fn remote_node_wire_shape() {
        let json = r#"{"id":"p1","name":"Home","kind":"folder","children":[{"id":"p1_1","name":"index.tsx","kind":"frontend"}]}"#;
        let node: RemoteNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.subtree_len(), 2);
        assert_eq!(node.children.as_ref().map(Vec::len), Some(1));
    }
}
