//! Name search over a namespace forest
//!
//! [`SearchFilter`] projects a forest onto the nodes whose names contain a
//! case-insensitive query, keeping every ancestor needed to reach a match.
//! The projection is read-only and never touches the store; containers that
//! have not been loaded contribute nothing.

use crate::store::Store;
use crate::types::{Namespace, NodeId};

/// Case-insensitive substring query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    needle: String,
}

/// Node retained by a filter pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredNode {
    /// Node id
    pub id: NodeId,
    /// Name contains the query
    pub direct_match: bool,
    /// Shown expanded regardless of view state
    pub forced_open: bool,
    /// The query left none of its children, so it renders closed
    pub pruned: bool,
    /// Retained children, in store order
    pub children: Vec<FilteredNode>,
}

/// Result of filtering one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredForest {
    /// Filtered namespace
    pub namespace: Namespace,
    /// Retained roots, in store order
    pub roots: Vec<FilteredNode>,
}

impl SearchFilter {
    /// Build a filter; whitespace-only queries are inactive
    #[must_use]
    pub fn new(query: &str) -> Self {
        Self {
            needle: query.trim().to_lowercase(),
        }
    }

    /// Filter that keeps everything
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether the filter prunes anything
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.needle.is_empty()
    }

    /// Normalized query text
    #[inline]
    #[must_use]
    pub fn query(&self) -> &str {
        &self.needle
    }

    /// Whether a name contains the query
    #[inline]
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.is_active() && name.to_lowercase().contains(&self.needle)
    }

    /// Project a namespace through the filter
    ///
    /// With an inactive filter every node is retained and nothing is forced
    /// open, so the caller's expand/collapse state decides visibility.
    #[must_use]
    pub fn apply(&self, store: &Store, namespace: Namespace) -> FilteredForest {
        let roots = store
            .roots(namespace)
            .iter()
            .filter_map(|id| self.visit(store, id))
            .collect();
        FilteredForest { namespace, roots }
    }

    fn visit(&self, store: &Store, id: &NodeId) -> Option<FilteredNode> {
        let node = store.get(id)?;
        let children: Vec<FilteredNode> = node
            .children()
            .unwrap_or(&[])
            .iter()
            .filter_map(|child| self.visit(store, child))
            .collect();

        if !self.is_active() {
            return Some(FilteredNode {
                id: id.clone(),
                direct_match: false,
                forced_open: false,
                pruned: false,
                children,
            });
        }

        let direct_match = self.matches(node.name());
        if !direct_match && children.is_empty() {
            return None;
        }
        Some(FilteredNode {
            id: id.clone(),
            direct_match,
            forced_open: !children.is_empty(),
            pruned: children.is_empty(),
            children,
        })
    }
}

impl FilteredForest {
    /// Number of retained nodes
    #[must_use]
    pub fn len(&self) -> usize {
        fn count(node: &FilteredNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        self.roots.iter().map(count).sum()
    }

    /// Whether nothing was retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Retained ids in pre-order
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        fn walk(node: &FilteredNode, out: &mut Vec<NodeId>) {
            out.push(node.id.clone());
            for child in &node.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            walk(root, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::NodeKind;
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
            .insert(
                Namespace::Pages,
                None,
                NewNode::container(
                    "login",
                    "Login",
                    NodeKind::Folder,
                    vec![NewNode::leaf("login_tsx", "Login.tsx", NodeKind::Frontend)],
                ),
            )
            .unwrap();
        store
    }

    #[test]
    fn inactive_filter_keeps_everything_closed() {
        let forest = SearchFilter::new("   ").apply(&store(), Namespace::Pages);
        assert_eq!(forest.len(), 5);
        assert!(forest.roots.iter().all(|r| !r.forced_open && !r.direct_match));
    }

    #[test]
    fn match_keeps_ancestors_and_prunes_siblings() {
        let forest = SearchFilter::new("STYLE").apply(&store(), Namespace::Pages);
        assert_eq!(forest.ids(), vec![NodeId::new("home"), NodeId::new("style")]);
        let home = &forest.roots[0];
        assert!(!home.direct_match);
        assert!(home.forced_open);
        assert!(home.children[0].direct_match);
    }

    #[test]
    fn direct_container_match_keeps_only_matching_children() {
        let forest = SearchFilter::new("login").apply(&store(), Namespace::Pages);
        assert_eq!(
            forest.ids(),
            vec![NodeId::new("login"), NodeId::new("login_tsx")]
        );
        assert!(forest.roots[0].direct_match);
        assert!(forest.roots[0].forced_open);
    }

    #[test]
    fn matched_container_without_matching_children_is_not_forced_open() {
        let forest = SearchFilter::new("home").apply(&store(), Namespace::Pages);
        assert_eq!(forest.ids(), vec![NodeId::new("home")]);
        assert!(!forest.roots[0].forced_open);
        assert!(forest.roots[0].pruned);
    }

    #[test]
    fn no_match_yields_empty_forest() {
        let forest = SearchFilter::new("zzz").apply(&store(), Namespace::Pages);
        assert!(forest.is_empty());
    }

    #[test]
    fn unloaded_groups_hide_their_contents() {
        let mut store = Store::new();
        store
            .insert(
                Namespace::Models,
                None,
                NewNode::container("db", "Main Database", NodeKind::DbConnection, vec![]),
            )
            .unwrap();
        assert!(SearchFilter::new("sys_users").apply(&store, Namespace::Models).is_empty());

        store
            .attach_children(
                &NodeId::new("db_tables"),
                vec![NewNode::leaf("t1", "sys_users", NodeKind::DbTable)],
            )
            .unwrap();
        store
            .set_load_state(&NodeId::new("db_tables"), crate::node::LoadState::Loaded)
            .unwrap();
        let forest = SearchFilter::new("sys_users").apply(&store, Namespace::Models);
        assert_eq!(
            forest.ids(),
            vec![NodeId::new("db"), NodeId::new("db_tables"), NodeId::new("t1")]
        );
    }
}
