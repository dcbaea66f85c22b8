//! Arena-backed node store
//!
//! [`Store`] owns every node of every namespace in a single arena keyed by
//! [`NodeId`]. Parent links are ids resolved through the arena, never
//! references, so a move or delete cannot leave a stale object graph.
//!
//! The store is not internally synchronized. It expects a single writer;
//! concurrent hosts wrap it in one lock.

use crate::error::{InvariantViolation, MoveRejection, StoreError};
use crate::kind::{DbGroupKind, KindCategory, NodeKind};
use crate::node::{LoadState, NewNode, TreeNode};
use crate::types::{Namespace, NodeId};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Canonical state of all namespaces
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Store {
    nodes: IndexMap<NodeId, TreeNode>,
    roots: [Vec<NodeId>; 5],
}

impl Store {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes across all namespaces
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is live
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Get a node if present
    #[inline]
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Look up a node
    ///
    /// # Errors
    /// `NotFound` if `id` is not live
    pub fn lookup(&self, id: &NodeId) -> Result<&TreeNode, StoreError> {
        self.nodes
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Root ids of a namespace, in order
    #[inline]
    #[must_use]
    pub fn roots(&self, namespace: Namespace) -> &[NodeId] {
        &self.roots[namespace.index()]
    }

    /// Ordered children of a container
    ///
    /// # Errors
    /// `NotFound` if absent, `NotAContainer` for leaves
    pub fn children(&self, id: &NodeId) -> Result<&[NodeId], StoreError> {
        self.lookup(id)?
            .children()
            .ok_or_else(|| StoreError::NotAContainer(id.clone()))
    }

    /// Ids listed at a sibling level: a container's children or a namespace's roots
    ///
    /// # Errors
    /// `NotFound` / `NotAContainer` for an invalid parent
    pub fn sibling_level(
        &self,
        namespace: Namespace,
        parent: Option<&NodeId>,
    ) -> Result<&[NodeId], StoreError> {
        match parent {
            Some(parent) => self.children(parent),
            None => Ok(self.roots(namespace)),
        }
    }

    /// Iterate nodes of one namespace in arena order
    pub fn nodes_in(&self, namespace: Namespace) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values().filter(move |n| n.namespace() == namespace)
    }

    /// Ancestor ids from namespace root down to `id`, inclusive
    ///
    /// # Errors
    /// `NotFound` if `id` is not live
    pub fn path_to(&self, id: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let mut path = vec![self.lookup(id)?.id().clone()];
        let mut cursor = self.nodes.get(id).and_then(TreeNode::parent);
        // Bounded walk: a forest never has a chain longer than its node count
        while let Some(parent) = cursor {
            if path.len() > self.nodes.len() {
                break;
            }
            path.push(parent.clone());
            cursor = self.nodes.get(parent).and_then(TreeNode::parent);
        }
        path.reverse();
        Ok(path)
    }

    /// Whether `ancestor` lies on `id`'s parent chain (strict)
    #[must_use]
    pub fn is_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut cursor = self.nodes.get(id).and_then(TreeNode::parent);
        let mut steps = 0;
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            cursor = self.nodes.get(parent).and_then(TreeNode::parent);
        }
        false
    }

    /// All descendants of `id` in pre-order, excluding `id`
    ///
    /// # Errors
    /// `NotFound` if `id` is not live
    pub fn descendants(&self, id: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let root = self.lookup(id)?;
        let mut out = Vec::new();
        let mut stack: Vec<&NodeId> = root.children().unwrap_or(&[]).iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next.clone());
            if let Some(children) = self.nodes.get(next).and_then(TreeNode::children) {
                stack.extend(children.iter().rev());
            }
        }
        Ok(out)
    }

    /// Reject a name already used by a sibling of the same category
    ///
    /// `exclude` skips the node being renamed or moved.
    ///
    /// # Errors
    /// `DuplicateName` on collision; `NotFound`/`NotAContainer` for a bad parent
    pub fn check_sibling_name(
        &self,
        namespace: Namespace,
        parent: Option<&NodeId>,
        name: &str,
        category: KindCategory,
        exclude: Option<&NodeId>,
    ) -> Result<(), StoreError> {
        let siblings = self.sibling_level(namespace, parent)?;
        let taken = siblings
            .iter()
            .filter(|sibling| Some(*sibling) != exclude)
            .filter_map(|sibling| self.nodes.get(sibling))
            .any(|sibling| sibling.name() == name && sibling.kind().category() == category);
        if taken {
            return Err(StoreError::DuplicateName {
                parent: parent.cloned(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Check that a user-created node of `kind` may live in `namespace`
    ///
    /// Schema groups only come from scaffolding a connection, and
    /// connections only live in `Models`.
    ///
    /// # Errors
    /// `InvalidScaffold` naming `id`
    pub fn check_created_kind(
        &self,
        namespace: Namespace,
        id: &NodeId,
        kind: NodeKind,
    ) -> Result<(), StoreError> {
        let allowed = match kind {
            NodeKind::DbGroup(_) => false,
            NodeKind::DbConnection => namespace == Namespace::Models,
            _ => true,
        };
        if !allowed {
            return Err(StoreError::InvalidScaffold(id.clone()));
        }
        Ok(())
    }

    /// Check that `parent` can take a new user-created child
    ///
    /// # Errors
    /// `NotFound`, `NotAContainer`, `ParentNotLoaded`, `InvalidScaffold`
    /// (fixed-schema parent) or `InvalidMove` with `CrossNamespace`
    pub fn check_insert_target(
        &self,
        namespace: Namespace,
        parent: Option<&NodeId>,
    ) -> Result<(), StoreError> {
        let Some(parent) = parent else {
            return Ok(());
        };
        let node = self.lookup(parent)?;
        if node.namespace() != namespace {
            return Err(StoreError::InvalidMove {
                id: parent.clone(),
                target: parent.clone(),
                reason: MoveRejection::CrossNamespace,
            });
        }
        if !node.is_container() {
            return Err(StoreError::NotAContainer(parent.clone()));
        }
        if node.kind().has_fixed_schema() {
            return Err(StoreError::InvalidScaffold(parent.clone()));
        }
        if !node.load_state().children_known() {
            return Err(StoreError::ParentNotLoaded(parent.clone()));
        }
        Ok(())
    }

    /// Insert a node (with any nested children) as the last child of
    /// `parent`, or as a new root of `namespace`
    ///
    /// A `DbConnection` payload without children is scaffolded with the six
    /// schema groups, each `Unloaded`.
    ///
    /// # Errors
    /// - `NotFound` if `parent` is absent
    /// - `DuplicateName` on sibling collision
    /// - `DuplicateId` if any id in the payload is live
    /// - `NotAContainer` / `ParentNotLoaded` / `InvalidScaffold` for bad targets or payloads
    pub fn insert(
        &mut self,
        namespace: Namespace,
        parent: Option<&NodeId>,
        node: NewNode,
    ) -> Result<NodeId, StoreError> {
        self.check_insert_target(namespace, parent)?;
        let node = scaffold(node)?;
        let existing = self.sibling_level(namespace, parent)?;
        self.check_payload(parent, existing, std::slice::from_ref(&node))?;

        let id = node.id.clone();
        self.materialize(namespace, parent.cloned(), node);
        self.link(namespace, parent, id.clone(), None);
        Ok(id)
    }

    /// Append fetched children to a container in the given order
    ///
    /// Used to merge lazily loaded children; the batch is validated as a
    /// whole before anything is inserted.
    ///
    /// # Errors
    /// `NotFound`, `NotAContainer`, `DuplicateId`, `DuplicateName`, `InvalidScaffold`
    pub fn attach_children(
        &mut self,
        parent: &NodeId,
        children: Vec<NewNode>,
    ) -> Result<Vec<NodeId>, StoreError> {
        let namespace = self.lookup(parent)?.namespace();
        let existing = self.children(parent)?;
        let children = children
            .into_iter()
            .map(scaffold)
            .collect::<Result<Vec<_>, _>>()?;
        self.check_payload(Some(parent), existing, &children)?;

        let mut ids = Vec::with_capacity(children.len());
        for child in children {
            let id = child.id.clone();
            self.materialize(namespace, Some(parent.clone()), child);
            self.link(namespace, Some(parent), id.clone(), None);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Replace the whole forest of a namespace
    ///
    /// Returns the ids that were removed.
    ///
    /// # Errors
    /// `DuplicateId` / `DuplicateName` / `InvalidScaffold` if the payload is
    /// invalid; the store is unchanged in that case
    pub fn replace_namespace(
        &mut self,
        namespace: Namespace,
        roots: Vec<NewNode>,
    ) -> Result<Vec<NodeId>, StoreError> {
        let roots = roots
            .into_iter()
            .map(scaffold)
            .collect::<Result<Vec<_>, _>>()?;

        let outgoing: HashSet<NodeId> = self.nodes_in(namespace).map(|n| n.id().clone()).collect();
        {
            let mut seen = HashSet::new();
            let live = |id: &NodeId| self.nodes.contains_key(id) && !outgoing.contains(id);
            self.check_level(None, &[], &roots, &mut seen, &live)?;
        }

        let mut removed = Vec::with_capacity(outgoing.len());
        for root in std::mem::take(&mut self.roots[namespace.index()]) {
            removed.extend(self.drop_subtree(&root));
        }
        for root in roots {
            let id = root.id.clone();
            self.materialize(namespace, None, root);
            self.roots[namespace.index()].push(id);
        }
        Ok(removed)
    }

    /// Remove a node and its whole subtree
    ///
    /// Returns removed ids, `id` first.
    ///
    /// # Errors
    /// `NotFound` if `id` is not live
    pub fn remove(&mut self, id: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let node = self.lookup(id)?;
        let namespace = node.namespace();
        let parent = node.parent().cloned();
        self.unlink(namespace, parent.as_ref(), id);
        Ok(self.drop_subtree(id))
    }

    /// Remove every child of a container, keeping the container
    ///
    /// # Errors
    /// `NotFound` or `NotAContainer`
    pub fn clear_children(&mut self, id: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let children = self.children(id)?.to_vec();
        if let Some(list) = self.nodes.get_mut(id).and_then(TreeNode::children_mut) {
            list.clear();
        }
        Ok(children.iter().flat_map(|child| self.drop_subtree(child)).collect())
    }

    /// Current parent and index of a node within its sibling level
    ///
    /// # Errors
    /// `NotFound` if `id` is not live
    pub fn position(&self, id: &NodeId) -> Result<(Option<NodeId>, usize), StoreError> {
        let node = self.lookup(id)?;
        let parent = node.parent().cloned();
        let index = self
            .sibling_level(node.namespace(), parent.as_ref())?
            .iter()
            .position(|sibling| sibling == id)
            .unwrap_or_default();
        Ok((parent, index))
    }

    /// Move `id` under `new_parent`, appended after existing children
    ///
    /// # Errors
    /// - `NotFound` if either id is absent
    /// - `InvalidMove` if `new_parent` is `id`, a descendant of `id`, in
    ///   another namespace, a leaf, fixed-schema or not loaded, or if `id`
    ///   is protected
    /// - `DuplicateName` on collision at the new parent
    ///
    /// On error the store is unchanged.
    pub fn reparent(&mut self, id: &NodeId, new_parent: &NodeId) -> Result<(), StoreError> {
        self.check_move(id, Some(new_parent))?;
        self.relink(id, Some(new_parent), None);
        Ok(())
    }

    /// Move `id` to an exact slot under `parent` (`None` = namespace root)
    ///
    /// Used to restore a node's prior position after a rejected move; the
    /// index is clamped to the sibling count.
    ///
    /// # Errors
    /// Same conditions as [`Store::reparent`]
    pub fn reparent_at(
        &mut self,
        id: &NodeId,
        parent: Option<&NodeId>,
        index: usize,
    ) -> Result<(), StoreError> {
        self.check_move(id, parent)?;
        self.relink(id, parent, Some(index));
        Ok(())
    }

    /// Rename a node in place
    ///
    /// # Errors
    /// `NotFound` or `DuplicateName`
    pub fn rename(&mut self, id: &NodeId, name: &str) -> Result<(), StoreError> {
        let node = self.lookup(id)?;
        self.check_sibling_name(
            node.namespace(),
            node.parent(),
            name,
            node.kind().category(),
            Some(id),
        )?;
        if let Some(node) = self.nodes.get_mut(id) {
            node.set_name(name.to_string());
        }
        Ok(())
    }

    /// Set the load state of a node
    ///
    /// # Errors
    /// `NotFound` if `id` is not live
    pub fn set_load_state(&mut self, id: &NodeId, state: LoadState) -> Result<(), StoreError> {
        self.nodes
            .get_mut(id)
            .map(|node| node.set_load_state(state))
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Verify every structural invariant
    ///
    /// # Errors
    /// The first violation found
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let mut seen: HashSet<&NodeId> = HashSet::with_capacity(self.nodes.len());

        for namespace in Namespace::ALL {
            let mut stack: Vec<&NodeId> = Vec::new();
            for root in self.roots(namespace) {
                let node = self.nodes.get(root).ok_or_else(|| InvariantViolation::Orphan(root.clone()))?;
                if node.parent().is_some() {
                    return Err(InvariantViolation::ParentMismatch {
                        child: root.clone(),
                        listed_under: root.clone(),
                        points_to: node.parent().cloned(),
                    });
                }
                if node.namespace() != namespace {
                    return Err(InvariantViolation::CrossNamespace(root.clone()));
                }
                if !seen.insert(root) {
                    return Err(InvariantViolation::Duplicated(root.clone()));
                }
                stack.push(root);
            }

            while let Some(id) = stack.pop() {
                let Some(node) = self.nodes.get(id) else { continue };
                let children = node.children().unwrap_or(&[]);
                if node.load_state() == LoadState::Unloaded && !children.is_empty() {
                    return Err(InvariantViolation::UnloadedWithChildren(id.clone()));
                }
                if node.kind() == NodeKind::DbConnection && !self.has_schema_groups(children) {
                    return Err(InvariantViolation::BrokenScaffold(id.clone()));
                }
                for child in children {
                    let child_node = self.nodes.get(child).ok_or_else(|| InvariantViolation::DanglingChild {
                        parent: id.clone(),
                        child: child.clone(),
                    })?;
                    if child_node.parent() != Some(id) {
                        return Err(InvariantViolation::ParentMismatch {
                            child: child.clone(),
                            listed_under: id.clone(),
                            points_to: child_node.parent().cloned(),
                        });
                    }
                    if child_node.namespace() != node.namespace() {
                        return Err(InvariantViolation::CrossNamespace(child.clone()));
                    }
                    if !seen.insert(child) {
                        return Err(InvariantViolation::Duplicated(child.clone()));
                    }
                    stack.push(child);
                }
            }
        }

        if let Some(orphan) = self.nodes.keys().find(|id| !seen.contains(id)) {
            return Err(InvariantViolation::Orphan(orphan.clone()));
        }
        for id in self.nodes.keys() {
            if self.is_ancestor(id, id) {
                return Err(InvariantViolation::Cycle(id.clone()));
            }
        }
        Ok(())
    }

    fn has_schema_groups(&self, children: &[NodeId]) -> bool {
        children.len() == DbGroupKind::ALL.len()
            && children.iter().zip(DbGroupKind::ALL).all(|(child, group)| {
                self.nodes
                    .get(child)
                    .is_some_and(|n| n.kind() == NodeKind::DbGroup(group))
            })
    }

    fn check_move(&self, id: &NodeId, target: Option<&NodeId>) -> Result<(), StoreError> {
        let node = self.lookup(id)?;
        let reject = |reason| {
            Err(StoreError::InvalidMove {
                id: id.clone(),
                target: target.cloned().unwrap_or_else(|| id.clone()),
                reason,
            })
        };

        if let Some(target_id) = target {
            let target = self.lookup(target_id)?;
            if target_id == id {
                return reject(MoveRejection::SelfTarget);
            }
            if node.kind().is_protected() {
                return reject(MoveRejection::Protected);
            }
            if target.namespace() != node.namespace() {
                return reject(MoveRejection::CrossNamespace);
            }
            if !target.is_container() {
                return reject(MoveRejection::NotAContainer);
            }
            if target.kind().has_fixed_schema() {
                return reject(MoveRejection::FixedSchema);
            }
            if !target.load_state().children_known() {
                return reject(MoveRejection::NotLoaded);
            }
            if self.is_ancestor(id, target_id) {
                return reject(MoveRejection::Descendant);
            }
        } else if node.kind().is_protected() {
            return reject(MoveRejection::Protected);
        }

        self.check_sibling_name(
            node.namespace(),
            target,
            node.name(),
            node.kind().category(),
            Some(id),
        )
    }

    fn check_payload(
        &self,
        parent: Option<&NodeId>,
        existing: &[NodeId],
        batch: &[NewNode],
    ) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        let live = |id: &NodeId| self.nodes.contains_key(id);
        self.check_level(parent, existing, batch, &mut seen, &live)
    }

    fn check_level<'a>(
        &self,
        parent: Option<&NodeId>,
        existing: &[NodeId],
        batch: &'a [NewNode],
        seen: &mut HashSet<&'a NodeId>,
        live: &dyn Fn(&NodeId) -> bool,
    ) -> Result<(), StoreError> {
        let mut names: HashSet<(&str, KindCategory)> = existing
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| (n.name(), n.kind().category()))
            .collect();

        for node in batch {
            if live(&node.id) || !seen.insert(&node.id) {
                return Err(StoreError::DuplicateId(node.id.clone()));
            }
            if !names.insert((node.name.as_str(), node.kind.category())) {
                return Err(StoreError::DuplicateName {
                    parent: parent.cloned(),
                    name: node.name.clone(),
                });
            }
            match &node.children {
                Some(children) if !node.kind.is_container() && !children.is_empty() => {
                    return Err(StoreError::NotAContainer(node.id.clone()));
                }
                Some(children) => {
                    self.check_level(Some(&node.id), &[], children, seen, live)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    fn materialize(&mut self, namespace: Namespace, parent: Option<NodeId>, node: NewNode) {
        let load_state = node.initial_load_state();
        let id = node.id;
        self.nodes.insert(
            id.clone(),
            TreeNode::new(id.clone(), node.name, node.kind, namespace, parent, load_state),
        );
        if !node.kind.is_container() {
            return;
        }
        for child in node.children.unwrap_or_default() {
            let child_id = child.id.clone();
            self.materialize(namespace, Some(id.clone()), child);
            if let Some(list) = self.nodes.get_mut(&id).and_then(TreeNode::children_mut) {
                list.push(child_id);
            }
        }
    }

    fn link(&mut self, namespace: Namespace, parent: Option<&NodeId>, id: NodeId, index: Option<usize>) {
        let list = match parent {
            Some(parent) => match self.nodes.get_mut(parent).and_then(TreeNode::children_mut) {
                Some(list) => list,
                None => return,
            },
            None => &mut self.roots[namespace.index()],
        };
        match index {
            Some(index) => list.insert(index.min(list.len()), id),
            None => list.push(id),
        }
    }

    fn unlink(&mut self, namespace: Namespace, parent: Option<&NodeId>, id: &NodeId) {
        let list = match parent {
            Some(parent) => self.nodes.get_mut(parent).and_then(TreeNode::children_mut),
            None => Some(&mut self.roots[namespace.index()]),
        };
        if let Some(list) = list {
            list.retain(|child| child != id);
        }
    }

    fn relink(&mut self, id: &NodeId, parent: Option<&NodeId>, index: Option<usize>) {
        let Some(node) = self.nodes.get(id) else { return };
        let namespace = node.namespace();
        let old_parent = node.parent().cloned();
        self.unlink(namespace, old_parent.as_ref(), id);
        self.link(namespace, parent, id.clone(), index);
        if let Some(node) = self.nodes.get_mut(id) {
            node.set_parent(parent.cloned());
        }
    }

    fn drop_subtree(&mut self, id: &NodeId) -> Vec<NodeId> {
        let mut removed = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.swap_remove(&next) {
                if let Some(children) = node.children() {
                    stack.extend(children.iter().rev().cloned());
                }
                removed.push(next);
            }
        }
        removed
    }
}

/// Fill in or verify the fixed schema of a database connection payload
fn scaffold(mut node: NewNode) -> Result<NewNode, StoreError> {
    if node.kind == NodeKind::DbConnection {
        let bare = node.children.as_ref().map_or(true, Vec::is_empty);
        if bare {
            let groups = DbGroupKind::ALL
                .into_iter()
                .map(|group| {
                    NewNode::container(
                        node.id.with_suffix(group.id_suffix()),
                        group.label(),
                        NodeKind::DbGroup(group),
                        Vec::new(),
                    )
                })
                .collect();
            node.children = Some(groups);
            return Ok(node);
        }
        let children = node.children.as_deref().unwrap_or_default();
        let conforms = children.len() == DbGroupKind::ALL.len()
            && children.iter().zip(DbGroupKind::ALL).all(|(child, group)| {
                child.kind == NodeKind::DbGroup(group) && child.name == group.label()
            });
        if !conforms {
            return Err(StoreError::InvalidScaffold(node.id));
        }
    }
    if let Some(children) = node.children.take() {
        node.children = Some(children.into_iter().map(scaffold).collect::<Result<_, _>>()?);
    }
    Ok(node)
}
