//! Structural mutations confirmed by the collaborator
//!
//! Each mutation:
//! 1. validates locally and registers a [`PendingOp`](crate::ops::PendingOp)
//!    on its target, failing `Busy` if one is already pending
//! 2. commits against the [`ProjectBackend`](crate::ProjectBackend) on a
//!    detached task
//! 3. re-validates preconditions against the current store before applying
//!    the remote result; divergence becomes `Conflict`
//!
//! Only moves are applied optimistically; a failed move is rolled back to
//! the node's exact prior slot.

use crate::backend::{NodeDraft, RemoteNode};
use crate::error::{ConflictReason, ExplorerError};
use crate::ops::OpKind;
use crate::workspace::{detached, Core, Workspace};
use nebula_tree::{Namespace, NodeId, TreeNode};
use std::sync::Arc;

/// Executes create, rename, delete, move and copy
#[derive(Clone)]
pub struct MutationEngine {
    ws: Arc<Workspace>,
}

/// Trim a requested name, rejecting empty results
///
/// # Errors
/// `InvalidName` if nothing remains after trimming
pub fn normalize_name(name: &str) -> Result<String, ExplorerError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ExplorerError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn unprotected<'a>(core: &'a Core, id: &NodeId) -> Result<&'a TreeNode, ExplorerError> {
    let node = core.store.lookup(id)?;
    if node.kind().is_protected() {
        return Err(ExplorerError::Protected(id.clone()));
    }
    Ok(node)
}

impl MutationEngine {
    pub(crate) fn new(ws: Arc<Workspace>) -> Self {
        Self { ws }
    }

    /// Create a node under `parent` (or as a root) from `draft`
    ///
    /// Returns the id assigned by the collaborator. The store is untouched
    /// unless the collaborator confirms.
    ///
    /// # Errors
    /// - `InvalidName`, `DuplicateName` for bad names
    /// - `NotFound`, `NotAContainer`, `ParentNotLoaded`, `InvalidScaffold`
    ///   for bad parents; `InvalidScaffold` also for schema group drafts
    /// - `NetworkFailure` / `Conflict` from the collaborator or apply step
    pub async fn create(
        &self,
        namespace: Namespace,
        parent: Option<&NodeId>,
        draft: NodeDraft,
    ) -> Result<NodeId, ExplorerError> {
        let name = normalize_name(&draft.name)?;
        let draft = NodeDraft { name, ..draft };
        let generation = {
            let mut core = self.ws.core.lock();
            let generation = core.begin(OpKind::Create, &draft.id, namespace)?;
            let checked = core
                .store
                .check_created_kind(namespace, &draft.id, draft.kind)
                .and_then(|()| core.store.check_insert_target(namespace, parent))
                .and_then(|()| {
                    core.store
                        .check_sibling_name(namespace, parent, &draft.name, draft.kind.category(), None)
                })
                .map_err(ExplorerError::from)
                .and_then(|()| core.commit(&draft.id, generation));
            if let Err(err) = checked {
                return core.settle(&draft.id, generation, Err(err));
            }
            generation
        };

        let ws = Arc::clone(&self.ws);
        let parent = parent.cloned();
        detached(async move {
            let remote = ws.backend.create_node(namespace, parent.as_ref(), &draft).await;
            let mut core = ws.core.lock();
            let outcome = remote
                .map_err(|err| ExplorerError::from_remote(err, parent.as_ref()))
                .and_then(|node| apply_create(&mut core, namespace, parent.as_ref(), node, &draft.id));
            core.settle(&draft.id, generation, outcome)
        })
        .await
    }

    /// Rename a node once the collaborator confirms
    ///
    /// Renaming to the current name succeeds without a round trip.
    ///
    /// # Errors
    /// `InvalidName`, `DuplicateName`, `NotFound`, `Protected`, `Busy`,
    /// `NetworkFailure`, `Conflict`
    pub async fn rename(&self, id: &NodeId, new_name: &str) -> Result<(), ExplorerError> {
        let name = normalize_name(new_name)?;
        let generation = {
            let mut core = self.ws.core.lock();
            let node = unprotected(&core, id)?;
            if node.name() == name {
                return Ok(());
            }
            let namespace = node.namespace();
            let generation = core.begin(OpKind::Rename, id, namespace)?;
            let checked = check_rename(&core, id, &name).and_then(|()| core.commit(id, generation));
            if let Err(err) = checked {
                return core.settle(id, generation, Err(err));
            }
            generation
        };

        let ws = Arc::clone(&self.ws);
        let target = id.clone();
        detached(async move {
            let remote = ws.backend.rename_node(&target, &name).await;
            let mut core = ws.core.lock();
            let outcome = remote
                .map_err(|err| ExplorerError::from_remote(err, Some(&target)))
                .and_then(|()| {
                    check_rename(&core, &target, &name)
                        .map_err(|err| on_reapply(err, &target))?;
                    core.store
                        .rename(&target, &name)
                        .map_err(|err| ExplorerError::on_apply(err, &target))
                });
            core.settle(&target, generation, outcome)
        })
        .await
    }

    /// Delete a node and its subtree once the collaborator confirms
    ///
    /// Returns the removed ids, `id` first. A node already gone from the
    /// store by then (for instance removed with an ancestor) counts as
    /// deleted and yields an empty list.
    ///
    /// # Errors
    /// `NotFound`, `Protected`, `Busy`, `NetworkFailure`, `Conflict`
    pub async fn delete(&self, id: &NodeId) -> Result<Vec<NodeId>, ExplorerError> {
        let generation = {
            let mut core = self.ws.core.lock();
            let namespace = unprotected(&core, id)?.namespace();
            let generation = core.begin(OpKind::Delete, id, namespace)?;
            if let Err(err) = core.commit(id, generation) {
                return core.settle(id, generation, Err(err));
            }
            generation
        };

        let ws = Arc::clone(&self.ws);
        let target = id.clone();
        detached(async move {
            let remote = ws.backend.delete_node(&target).await;
            let mut core = ws.core.lock();
            let outcome = remote
                .map_err(|err| ExplorerError::from_remote(err, Some(&target)))
                .map(|()| {
                    if !core.store.contains(&target) {
                        return Vec::new();
                    }
                    let removed = core.store.remove(&target).unwrap_or_default();
                    core.forget_removed(&removed);
                    removed
                });
            core.settle(&target, generation, outcome)
        })
        .await
    }

    /// Reparent `id` under `new_parent`
    ///
    /// The move is checked and applied locally first, then confirmed
    /// remotely. If the collaborator refuses, the node returns to its prior
    /// parent and position.
    ///
    /// # Errors
    /// - `InvalidMove`, `DuplicateName`, `NotFound`, `Protected`, `Busy`
    ///   before any network call
    /// - `NetworkFailure` / `Conflict` after rollback
    pub async fn move_node(&self, id: &NodeId, new_parent: &NodeId) -> Result<(), ExplorerError> {
        let (generation, namespace, prior) = {
            let mut core = self.ws.core.lock();
            let namespace = unprotected(&core, id)?.namespace();
            let generation = core.begin(OpKind::Move, id, namespace)?;
            let moved = core
                .store
                .position(id)
                .and_then(|prior| core.store.reparent(id, new_parent).map(|()| prior))
                .map_err(ExplorerError::from)
                .and_then(|prior| core.commit(id, generation).map(|()| prior));
            match moved {
                Ok(prior) => (generation, namespace, prior),
                Err(err) => return core.settle(id, generation, Err(err)),
            }
        };
        tracing::debug!("moved {} under {} locally, awaiting confirmation", id, new_parent);

        let ws = Arc::clone(&self.ws);
        let target = id.clone();
        let new_parent = new_parent.clone();
        detached(async move {
            let remote = ws.backend.move_node(&target, &new_parent, namespace).await;
            let mut core = ws.core.lock();
            let outcome = match remote {
                Ok(()) if core.store.contains(&target) => Ok(()),
                Ok(()) => Err(ExplorerError::conflict(&target, ConflictReason::NodeRemoved)),
                Err(err) => {
                    let err = ExplorerError::from_remote(err, Some(&target));
                    Err(rollback_move(&mut core, &target, prior).unwrap_or(err))
                }
            };
            core.settle(&target, generation, outcome)
        })
        .await
    }

    /// Duplicate a node as the last sibling of its source
    ///
    /// Returns the id of the copy.
    ///
    /// # Errors
    /// `NotFound`, `Protected`, `Busy`, `NetworkFailure`, `Conflict`
    pub async fn copy(&self, id: &NodeId) -> Result<NodeId, ExplorerError> {
        let generation = {
            let mut core = self.ws.core.lock();
            let namespace = unprotected(&core, id)?.namespace();
            let generation = core.begin(OpKind::Copy, id, namespace)?;
            if let Err(err) = core.commit(id, generation) {
                return core.settle(id, generation, Err(err));
            }
            generation
        };

        let ws = Arc::clone(&self.ws);
        let source = id.clone();
        detached(async move {
            let remote = ws.backend.copy_node(&source).await;
            let mut core = ws.core.lock();
            let outcome = remote
                .map_err(|err| ExplorerError::from_remote(err, Some(&source)))
                .and_then(|node| apply_copy(&mut core, &source, node));
            core.settle(&source, generation, outcome)
        })
        .await
    }
}

fn check_rename(core: &Core, id: &NodeId, name: &str) -> Result<(), ExplorerError> {
    let node = core.store.lookup(id)?;
    core.store.check_sibling_name(
        node.namespace(),
        node.parent(),
        name,
        node.kind().category(),
        Some(id),
    )?;
    Ok(())
}

/// Map a failed re-check after the remote already agreed
fn on_reapply(err: ExplorerError, target: &NodeId) -> ExplorerError {
    match err {
        ExplorerError::NotFound(_) => ExplorerError::conflict(target, ConflictReason::NodeRemoved),
        ExplorerError::DuplicateName { .. } => ExplorerError::conflict(target, ConflictReason::NameTaken),
        other => other,
    }
}

fn apply_create(
    core: &mut Core,
    namespace: Namespace,
    parent: Option<&NodeId>,
    node: RemoteNode,
    draft: &NodeId,
) -> Result<NodeId, ExplorerError> {
    if let Some(parent) = parent {
        if !core.store.contains(parent) {
            return Err(ExplorerError::conflict(draft, ConflictReason::ParentRemoved));
        }
    }
    core.store
        .insert(namespace, parent, node)
        .map_err(|err| ExplorerError::on_apply(err, draft))
}

fn apply_copy(core: &mut Core, source: &NodeId, node: RemoteNode) -> Result<NodeId, ExplorerError> {
    let Some(origin) = core.store.get(source) else {
        return Err(ExplorerError::conflict(source, ConflictReason::NodeRemoved));
    };
    let namespace = origin.namespace();
    let parent = origin.parent().cloned();
    core.store
        .insert(namespace, parent.as_ref(), node)
        .map_err(|err| ExplorerError::on_apply(err, source))
}

/// Put a moved node back where it was
///
/// Returns the conflict to report instead of the remote error if the
/// prior slot can no longer take the node.
fn rollback_move(
    core: &mut Core,
    id: &NodeId,
    (parent, index): (Option<NodeId>, usize),
) -> Option<ExplorerError> {
    if !core.store.contains(id) {
        return Some(ExplorerError::conflict(id, ConflictReason::NodeRemoved));
    }
    if parent.as_ref().is_some_and(|p| !core.store.contains(p)) {
        return Some(ExplorerError::conflict(id, ConflictReason::ParentRemoved));
    }
    match core.store.reparent_at(id, parent.as_ref(), index) {
        Ok(()) => {
            tracing::warn!("move of {} refused remotely, restored to slot {}", id, index);
            None
        }
        Err(err) => Some(ExplorerError::on_apply(err, id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed() {
        assert_eq!(normalize_name("  Home ").unwrap(), "Home");
    }

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(
            normalize_name(" \t "),
            Err(ExplorerError::InvalidName(" \t ".to_string()))
        );
    }

    #[test]
    fn reapply_failures_map_to_conflicts() {
        let id = NodeId::new("x");
        assert_eq!(
            on_reapply(ExplorerError::NotFound(id.clone()), &id),
            ExplorerError::conflict(&id, ConflictReason::NodeRemoved)
        );
        assert_eq!(
            on_reapply(ExplorerError::DuplicateName { name: "a".into() }, &id),
            ExplorerError::conflict(&id, ConflictReason::NameTaken)
        );
    }
}
