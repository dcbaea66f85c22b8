//! Tree nodes and insertion payloads

use crate::kind::NodeKind;
use crate::types::{Namespace, NodeId};
use serde::{Deserialize, Serialize};

/// Load state of a container whose children may be fetched on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadState {
    /// Leaf, or container whose children are always known
    NotLoadable,
    /// Children not fetched yet
    Unloaded,
    /// Fetch in flight
    Loading,
    /// Children fetched and merged
    Loaded,
    /// Last fetch failed; expanding again retries
    Failed,
}

impl LoadState {
    /// Whether an expand must issue a fetch
    #[inline]
    #[must_use]
    pub fn needs_fetch(self) -> bool {
        matches!(self, LoadState::Unloaded | LoadState::Failed)
    }

    /// Whether the child list is authoritative
    #[inline]
    #[must_use]
    pub fn children_known(self) -> bool {
        matches!(self, LoadState::NotLoadable | LoadState::Loaded)
    }
}

/// A node owned by the [`Store`](crate::Store)
///
/// Fields are read through accessors; only the store mutates them so the
/// parent/children links stay consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    id: NodeId,
    name: String,
    kind: NodeKind,
    namespace: Namespace,
    parent: Option<NodeId>,
    children: Option<Vec<NodeId>>,
    load_state: LoadState,
}

impl TreeNode {
    pub(crate) fn new(
        id: NodeId,
        name: String,
        kind: NodeKind,
        namespace: Namespace,
        parent: Option<NodeId>,
        load_state: LoadState,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            namespace,
            parent,
            children: kind.is_container().then(Vec::new),
            load_state,
        }
    }

    /// Node id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Owning namespace
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Parent id, `None` for roots
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    /// Ordered child ids; `None` for leaves
    #[inline]
    #[must_use]
    pub fn children(&self) -> Option<&[NodeId]> {
        self.children.as_deref()
    }

    /// Whether the node holds children
    #[inline]
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.children.is_some()
    }

    /// Load state
    #[inline]
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub(crate) fn set_load_state(&mut self, state: LoadState) {
        self.load_state = state;
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        self.children.as_mut()
    }
}

/// Payload for inserting a node, optionally with nested children
///
/// This is also the wire shape returned by the persistence collaborator.
/// `children: None` means leaf; for lazy containers an empty list means
/// "not fetched yet".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    /// Identifier
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Kind
    pub kind: NodeKind,
    /// Nested children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NewNode>>,
}

impl NewNode {
    /// Leaf payload
    #[must_use]
    pub fn leaf(id: impl Into<NodeId>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            children: None,
        }
    }

    /// Container payload with children
    #[must_use]
    pub fn container(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        kind: NodeKind,
        children: Vec<NewNode>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            children: Some(children),
        }
    }

    /// Load state this payload materializes into
    #[must_use]
    pub fn initial_load_state(&self) -> LoadState {
        if !self.kind.is_lazy() {
            return LoadState::NotLoadable;
        }
        match &self.children {
            Some(children) if !children.is_empty() => LoadState::Loaded,
            _ => LoadState::Unloaded,
        }
    }

    /// Total number of nodes in this payload, itself included
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(NewNode::subtree_len)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::DbGroupKind;

    #[test]
    fn leaf_has_no_children() {
        let node = TreeNode::new(
            "f".into(),
            "index.tsx".into(),
            NodeKind::Frontend,
            Namespace::Pages,
            None,
            LoadState::NotLoadable,
        );
        assert!(!node.is_container());
        assert!(node.children().is_none());
    }

    #[test]
    fn container_starts_empty() {
        let node = TreeNode::new(
            "d".into(),
            "Home".into(),
            NodeKind::Folder,
            Namespace::Pages,
            None,
            LoadState::NotLoadable,
        );
        assert_eq!(node.children(), Some(&[][..]));
    }

    #[test]
    fn lazy_payload_load_state() {
        let tables = NodeKind::DbGroup(DbGroupKind::Tables);
        let empty = NewNode::container("g", "Tables", tables, vec![]);
        assert_eq!(empty.initial_load_state(), LoadState::Unloaded);

        let filled = NewNode::container(
            "g",
            "Tables",
            tables,
            vec![NewNode::leaf("t", "sys_users", NodeKind::DbTable)],
        );
        assert_eq!(filled.initial_load_state(), LoadState::Loaded);

        let folder = NewNode::container("f", "Home", NodeKind::Folder, vec![]);
        assert_eq!(folder.initial_load_state(), LoadState::NotLoadable);
    }

    #[test]
    fn subtree_len_counts_nested() {
        let tree = NewNode::container(
            "a",
            "A",
            NodeKind::Folder,
            vec![
                NewNode::leaf("b", "B", NodeKind::File),
                NewNode::container("c", "C", NodeKind::Folder, vec![NewNode::leaf("d", "D", NodeKind::File)]),
            ],
        );
        assert_eq!(tree.subtree_len(), 4);
    }

    #[test]
    fn fetch_needed_only_when_unloaded_or_failed() {
        assert!(LoadState::Unloaded.needs_fetch());
        assert!(LoadState::Failed.needs_fetch());
        assert!(!LoadState::Loading.needs_fetch());
        assert!(!LoadState::Loaded.needs_fetch());
    }
}
