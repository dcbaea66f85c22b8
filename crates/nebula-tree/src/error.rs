//! Store error types

use crate::types::NodeId;

/// Why a reparent was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveRejection {
    /// Target is the node itself
    SelfTarget,
    /// Target lies inside the moved subtree
    Descendant,
    /// Target belongs to another namespace
    CrossNamespace,
    /// Target cannot hold children
    NotAContainer,
    /// Target's child list is fixed at creation
    FixedSchema,
    /// Target's children have not been fetched
    NotLoaded,
    /// Node itself may not be moved
    Protected,
}

impl std::fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            MoveRejection::SelfTarget => "target is the node itself",
            MoveRejection::Descendant => "target is a descendant of the node",
            MoveRejection::CrossNamespace => "target is in another namespace",
            MoveRejection::NotAContainer => "target cannot hold children",
            MoveRejection::FixedSchema => "target has a fixed child schema",
            MoveRejection::NotLoaded => "target children are not loaded",
            MoveRejection::Protected => "node cannot be moved",
        };
        f.write_str(text)
    }
}

/// Errors returned by [`Store`](crate::Store) operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Referenced node does not exist
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// Sibling with the same name and kind category exists
    #[error("a sibling named '{name}' already exists")]
    DuplicateName {
        /// Parent of the colliding siblings (`None` at namespace root)
        parent: Option<NodeId>,
        /// Colliding name
        name: String,
    },

    /// Id is already live in the store
    #[error("node id already in use: {0}")]
    DuplicateId(NodeId),

    /// Reparent would break the forest
    #[error("cannot move {id} under {target}: {reason}")]
    InvalidMove {
        /// Node being moved
        id: NodeId,
        /// Requested new parent
        target: NodeId,
        /// Rejection reason
        reason: MoveRejection,
    },

    /// Parent is a leaf
    #[error("node cannot hold children: {0}")]
    NotAContainer(NodeId),

    /// Parent is a lazy container whose children are not fetched
    #[error("children of {0} are not loaded")]
    ParentNotLoaded(NodeId),

    /// Payload breaks the fixed database schema
    #[error("{0} does not fit the fixed database schema")]
    InvalidScaffold(NodeId),
}

/// Structural invariant broken inside a store
///
/// Returned by [`Store::validate`](crate::Store::validate); a healthy store
/// never produces one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// Child list references a missing id
    #[error("{parent} lists missing child {child}")]
    DanglingChild {
        /// Container
        parent: NodeId,
        /// Missing child
        child: NodeId,
    },

    /// Child's parent pointer disagrees with the list holding it
    #[error("{child} is listed under {listed_under} but points to {points_to:?}")]
    ParentMismatch {
        /// Child
        child: NodeId,
        /// Container listing the child
        listed_under: NodeId,
        /// Parent recorded on the child
        points_to: Option<NodeId>,
    },

    /// Node is reachable from no root
    #[error("{0} is not reachable from any root")]
    Orphan(NodeId),

    /// Node is listed more than once
    #[error("{0} is listed more than once")]
    Duplicated(NodeId),

    /// Ancestor walk revisited a node
    #[error("cycle through {0}")]
    Cycle(NodeId),

    /// Child lives in a different namespace
    #[error("{0} is linked across namespaces")]
    CrossNamespace(NodeId),

    /// Unloaded container holds children
    #[error("{0} is unloaded but has children")]
    UnloadedWithChildren(NodeId),

    /// Connection does not hold exactly the schema groups
    #[error("connection {0} lost its schema groups")]
    BrokenScaffold(NodeId),
}
