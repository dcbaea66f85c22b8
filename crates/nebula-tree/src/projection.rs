//! Flattened, render-ready view of a namespace
//!
//! - [`ExpansionState`] records which containers the user has opened
//! - [`project`] walks a [`FilteredForest`] and emits one [`VisibleRow`]
//!   per visible node, depth-first, honoring forced-open containers

use crate::filter::{FilteredForest, FilteredNode, SearchFilter};
use crate::kind::NodeKind;
use crate::node::LoadState;
use crate::store::Store;
use crate::types::{Namespace, NodeId};
use serde::Serialize;
use std::collections::HashSet;

/// Containers the user has expanded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    expanded: HashSet<NodeId>,
}

impl ExpansionState {
    /// Nothing expanded
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a container open; returns `false` if it already was
    pub fn expand(&mut self, id: &NodeId) -> bool {
        self.expanded.insert(id.clone())
    }

    /// Mark a container closed; returns `false` if it already was
    pub fn collapse(&mut self, id: &NodeId) -> bool {
        self.expanded.remove(id)
    }

    /// Whether a container is open
    #[inline]
    #[must_use]
    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.expanded.contains(id)
    }

    /// Keep only the containers `keep` accepts
    pub fn retain(&mut self, mut keep: impl FnMut(&NodeId) -> bool) {
        self.expanded.retain(|id| keep(id));
    }

    /// Number of expanded containers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.expanded.len()
    }

    /// Whether nothing is expanded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }
}

/// One row of the rendered tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRow {
    /// Node id
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Kind
    pub kind: NodeKind,
    /// Nesting depth, roots at zero
    pub depth: usize,
    /// Holds children
    pub is_container: bool,
    /// Children are shown below this row
    pub is_open: bool,
    /// Lazy load state
    pub load_state: LoadState,
    /// Name matched the active query
    pub matched: bool,
}

/// Flatten a namespace into visible rows
///
/// With an active query every retained node is visible; otherwise
/// `expansion` decides which containers show their children.
#[must_use]
pub fn project(
    store: &Store,
    namespace: Namespace,
    filter: &SearchFilter,
    expansion: &ExpansionState,
) -> Vec<VisibleRow> {
    let forest = filter.apply(store, namespace);
    flatten(store, &forest, expansion)
}

/// Flatten an already filtered forest
#[must_use]
pub fn flatten(store: &Store, forest: &FilteredForest, expansion: &ExpansionState) -> Vec<VisibleRow> {
    let mut rows = Vec::with_capacity(forest.len());
    for root in &forest.roots {
        emit(store, root, 0, expansion, &mut rows);
    }
    rows
}

fn emit(
    store: &Store,
    node: &FilteredNode,
    depth: usize,
    expansion: &ExpansionState,
    rows: &mut Vec<VisibleRow>,
) {
    let Some(tree_node) = store.get(&node.id) else {
        return;
    };
    let is_open = tree_node.is_container()
        && !node.pruned
        && (node.forced_open || expansion.is_expanded(&node.id));
    rows.push(VisibleRow {
        id: node.id.clone(),
        name: tree_node.name().to_string(),
        kind: tree_node.kind(),
        depth,
        is_container: tree_node.is_container(),
        is_open,
        load_state: tree_node.load_state(),
        matched: node.direct_match,
    });
    if is_open {
        for child in &node.children {
            emit(store, child, depth + 1, expansion, rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NewNode;
    use pretty_assertions::assert_eq;

    fn store() -> Store {
        let mut store = Store::new();
        store
            .insert(
                Namespace::Pages,
                None,
                NewNode::container(
                    "home",
                    "Home",
                    NodeKind::Folder,
                    vec![
                        NewNode::leaf("index", "index.tsx", NodeKind::Frontend),
                        NewNode::leaf("style", "style.css", NodeKind::File),
                    ],
                ),
            )
            .unwrap();
        store
            .insert(Namespace::Pages, None, NewNode::leaf("about", "About.tsx", NodeKind::Frontend))
            .unwrap();
        store
    }

    fn names(rows: &[VisibleRow]) -> Vec<(&str, usize)> {
        rows.iter().map(|r| (r.name.as_str(), r.depth)).collect()
    }

    #[test]
    fn collapsed_containers_hide_children() {
        let rows = project(&store(), Namespace::Pages, &SearchFilter::none(), &ExpansionState::new());
        assert_eq!(names(&rows), vec![("Home", 0), ("About.tsx", 0)]);
        assert!(!rows[0].is_open);
    }

    #[test]
    fn expanded_containers_show_children_in_order() {
        let mut expansion = ExpansionState::new();
        expansion.expand(&NodeId::new("home"));
        let rows = project(&store(), Namespace::Pages, &SearchFilter::none(), &expansion);
        assert_eq!(
            names(&rows),
            vec![("Home", 0), ("index.tsx", 1), ("style.css", 1), ("About.tsx", 0)]
        );
    }

    #[test]
    fn query_forces_ancestors_open() {
        let rows = project(
            &store(),
            Namespace::Pages,
            &SearchFilter::new("css"),
            &ExpansionState::new(),
        );
        assert_eq!(names(&rows), vec![("Home", 0), ("style.css", 1)]);
        assert!(rows[0].is_open);
        assert!(!rows[0].matched);
        assert!(rows[1].matched);
    }

    #[test]
    fn expanded_match_without_matching_children_renders_closed() {
        let mut expansion = ExpansionState::new();
        expansion.expand(&NodeId::new("home"));
        let rows = project(&store(), Namespace::Pages, &SearchFilter::new("home"), &expansion);
        assert_eq!(names(&rows), vec![("Home", 0)]);
        assert!(rows[0].matched);
        assert!(!rows[0].is_open);

        // clearing the query restores the user's expansion
        let rows = project(&store(), Namespace::Pages, &SearchFilter::none(), &expansion);
        assert!(rows[0].is_open);
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn retain_drops_rejected_ids() {
        let mut expansion = ExpansionState::new();
        expansion.expand(&NodeId::new("home"));
        expansion.expand(&NodeId::new("gone"));
        expansion.retain(|id| id.as_str() != "gone");
        assert_eq!(expansion.len(), 1);
        assert!(expansion.is_expanded(&NodeId::new("home")));
    }
}
