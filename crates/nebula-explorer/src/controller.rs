//! Explorer controller
//!
//! [`Explorer`] is the host-facing entry point. It owns the view state
//! (expanded containers, active query, namespace sections, active node),
//! dispatches expands to the [`LazyLoader`] and structural changes to the
//! [`MutationEngine`], and renders namespaces into [`VisibleRow`]s.

use crate::backend::{NodeDraft, ProjectBackend};
use crate::config::ExplorerConfig;
use crate::error::{ConflictReason, ExplorerError};
use crate::loader::LazyLoader;
use crate::mutation::MutationEngine;
use crate::ops::OpRecord;
use crate::workspace::Workspace;
use nebula_tree::{
    project, ExpansionState, Namespace, NodeId, NodeKind, SearchFilter, Store, TreeNode, VisibleRow,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Leaf activation reported to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenEvent {
    /// Opened node
    pub id: NodeId,
    /// Its name
    pub name: String,
    /// Its kind
    pub kind: NodeKind,
    /// Its namespace
    pub namespace: Namespace,
    /// Ids from the namespace root down to the node
    pub path: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct ViewState {
    expansion: ExpansionState,
    filter: SearchFilter,
    closed_sections: HashSet<Namespace>,
    active: Option<NodeId>,
}

/// Project resource explorer
///
/// Cheap to clone; clones share the same store and view.
#[derive(Clone)]
pub struct Explorer {
    ws: Arc<Workspace>,
    view: Arc<Mutex<ViewState>>,
    loader: LazyLoader,
    mutations: MutationEngine,
}

impl Explorer {
    /// Create an explorer over `backend` with an empty store
    #[must_use]
    pub fn new(backend: Arc<dyn ProjectBackend>, config: ExplorerConfig) -> Self {
        let ws = Arc::new(Workspace::new(backend, config));
        Self {
            loader: LazyLoader::new(Arc::clone(&ws)),
            mutations: MutationEngine::new(Arc::clone(&ws)),
            view: Arc::new(Mutex::new(ViewState::default())),
            ws,
        }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExplorerConfig {
        &self.ws.config
    }

    /// Lazy loader sharing this explorer's store
    #[inline]
    #[must_use]
    pub fn loader(&self) -> &LazyLoader {
        &self.loader
    }

    /// Mutation engine sharing this explorer's store
    #[inline]
    #[must_use]
    pub fn mutations(&self) -> &MutationEngine {
        &self.mutations
    }

    // ------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------

    /// Replace a namespace with the collaborator's current roots
    ///
    /// Returns the number of nodes now in the namespace.
    ///
    /// A mutation in the namespace that begins while the roots are in flight
    /// makes the snapshot stale; the reload then fails with `Superseded`
    /// and leaves the store as it is.
    ///
    /// # Errors
    /// `Busy` while anything in the namespace is pending; `NetworkFailure`
    /// or `Conflict` from the collaborator
    pub async fn load_namespace(&self, namespace: Namespace) -> Result<usize, ExplorerError> {
        let stamp = {
            let mut core = self.ws.core.lock();
            if core.busy_in(namespace) {
                return Err(ExplorerError::Busy(NodeId::new(namespace.as_str())));
            }
            core.next_generation()
        };
        let roots = self
            .ws
            .backend
            .list_roots(namespace)
            .await
            .map_err(|err| ExplorerError::from_remote(err, None))?;

        let removed = {
            let mut core = self.ws.core.lock();
            if core.busy_in(namespace) || core.touched_since(namespace, stamp) {
                tracing::warn!("discarding stale roots of {} (gen {})", namespace, stamp);
                return Err(ExplorerError::Conflict {
                    id: None,
                    reason: ConflictReason::Superseded,
                });
            }
            let removed = core
                .store
                .replace_namespace(namespace, roots)
                .map_err(|err| ExplorerError::Conflict {
                    id: None,
                    reason: ConflictReason::RemoteDiverged(err.to_string()),
                })?;
            core.forget_removed(&removed);
            removed
        };
        self.prune_view();
        let count = self.ws.core.lock().store.nodes_in(namespace).count();
        tracing::info!("loaded namespace {} ({} nodes)", namespace, count);
        Ok(count)
    }

    /// Load every namespace concurrently
    ///
    /// Returns the total node count.
    ///
    /// # Errors
    /// The first namespace failure
    pub async fn load_all(&self) -> Result<usize, ExplorerError> {
        let counts =
            futures::future::try_join_all(Namespace::ALL.map(|ns| self.load_namespace(ns))).await?;
        Ok(counts.into_iter().sum())
    }

    // ------------------------------------------------------------------
    // View state
    // ------------------------------------------------------------------

    /// Open a container, loading its children if needed
    ///
    /// The container stays open if the load fails so the host can offer a
    /// retry.
    ///
    /// # Errors
    /// `NotAContainer` for leaves; otherwise as [`LazyLoader::expand`]
    pub async fn expand(&self, id: &NodeId) -> Result<Vec<NodeId>, ExplorerError> {
        let is_container = self.ws.core.lock().store.lookup(id)?.is_container();
        if !is_container {
            return Err(ExplorerError::NotAContainer(id.clone()));
        }
        self.view.lock().expansion.expand(id);
        self.loader.expand(id).await
    }

    /// Close a container; loaded children are kept
    ///
    /// Returns `false` if it was not open.
    pub fn collapse(&self, id: &NodeId) -> bool {
        let closed = self.view.lock().expansion.collapse(id);
        if self.ws.config.abandon_on_collapse {
            self.loader.abandon(id);
        }
        closed
    }

    /// Flip a container between open and closed
    ///
    /// Returns whether it is now open.
    ///
    /// # Errors
    /// As [`Explorer::expand`] when opening
    pub async fn toggle(&self, id: &NodeId) -> Result<bool, ExplorerError> {
        if self.is_expanded(id) {
            self.collapse(id);
            return Ok(false);
        }
        self.expand(id).await?;
        Ok(true)
    }

    /// Whether a container is open in the view
    #[must_use]
    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.view.lock().expansion.is_expanded(id)
    }

    /// Set the search query; blank clears it
    pub fn set_query(&self, query: &str) {
        self.view.lock().filter = SearchFilter::new(query);
    }

    /// Clear the search query
    pub fn clear_query(&self) {
        self.view.lock().filter = SearchFilter::none();
    }

    /// Active normalized query, if any
    #[must_use]
    pub fn query(&self) -> Option<String> {
        let view = self.view.lock();
        view.filter.is_active().then(|| view.filter.query().to_string())
    }

    /// Show or hide a namespace section; returns whether it is now open
    pub fn toggle_section(&self, namespace: Namespace) -> bool {
        let mut view = self.view.lock();
        if view.closed_sections.remove(&namespace) {
            true
        } else {
            view.closed_sections.insert(namespace);
            false
        }
    }

    /// Whether a namespace section is shown
    #[must_use]
    pub fn is_section_open(&self, namespace: Namespace) -> bool {
        !self.view.lock().closed_sections.contains(&namespace)
    }

    /// Rows currently visible in a namespace section
    ///
    /// Empty while the section is closed.
    #[must_use]
    pub fn visible(&self, namespace: Namespace) -> Vec<VisibleRow> {
        let view = self.view.lock();
        if view.closed_sections.contains(&namespace) {
            return Vec::new();
        }
        let core = self.ws.core.lock();
        project(&core.store, namespace, &view.filter, &view.expansion)
    }

    /// Activate a leaf
    ///
    /// # Errors
    /// `NotFound`, or `NotALeaf` for containers
    pub fn open(&self, id: &NodeId) -> Result<OpenEvent, ExplorerError> {
        let event = {
            let core = self.ws.core.lock();
            let node = core.store.lookup(id)?;
            if node.is_container() {
                return Err(ExplorerError::NotALeaf(id.clone()));
            }
            OpenEvent {
                id: id.clone(),
                name: node.name().to_string(),
                kind: node.kind(),
                namespace: node.namespace(),
                path: core.store.path_to(id)?,
            }
        };
        self.view.lock().active = Some(id.clone());
        tracing::debug!("opened {}", id);
        Ok(event)
    }

    /// Last opened leaf, cleared when it is deleted
    #[must_use]
    pub fn active(&self) -> Option<NodeId> {
        self.view.lock().active.clone()
    }

    // ------------------------------------------------------------------
    // Loads
    // ------------------------------------------------------------------

    /// Discard an in-flight load; see [`LazyLoader::abandon`]
    pub fn abandon(&self, id: &NodeId) -> bool {
        self.loader.abandon(id)
    }

    /// Refetch a lazy container; see [`LazyLoader::refresh`]
    ///
    /// # Errors
    /// As [`LazyLoader::refresh`]
    pub async fn refresh(&self, id: &NodeId) -> Result<Vec<NodeId>, ExplorerError> {
        let outcome = self.loader.refresh(id).await;
        self.prune_view();
        outcome
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Create a node; see [`MutationEngine::create`]
    ///
    /// New containers open in the view when configured.
    ///
    /// # Errors
    /// As [`MutationEngine::create`]
    pub async fn create(
        &self,
        namespace: Namespace,
        parent: Option<&NodeId>,
        draft: NodeDraft,
    ) -> Result<NodeId, ExplorerError> {
        let id = self.mutations.create(namespace, parent, draft).await?;
        let is_container = self.ws.core.lock().store.get(&id).is_some_and(TreeNode::is_container);
        if is_container && self.ws.config.expand_new_containers {
            self.view.lock().expansion.expand(&id);
        }
        Ok(id)
    }

    /// Rename a node; see [`MutationEngine::rename`]
    ///
    /// # Errors
    /// As [`MutationEngine::rename`]
    pub async fn rename(&self, id: &NodeId, new_name: &str) -> Result<(), ExplorerError> {
        self.mutations.rename(id, new_name).await
    }

    /// Delete a subtree; see [`MutationEngine::delete`]
    ///
    /// # Errors
    /// As [`MutationEngine::delete`]
    pub async fn delete(&self, id: &NodeId) -> Result<Vec<NodeId>, ExplorerError> {
        let removed = self.mutations.delete(id).await?;
        self.prune_view();
        Ok(removed)
    }

    /// Reparent a node; see [`MutationEngine::move_node`]
    ///
    /// # Errors
    /// As [`MutationEngine::move_node`]
    pub async fn move_node(&self, id: &NodeId, new_parent: &NodeId) -> Result<(), ExplorerError> {
        self.mutations.move_node(id, new_parent).await
    }

    /// Duplicate a node; see [`MutationEngine::copy`]
    ///
    /// # Errors
    /// As [`MutationEngine::copy`]
    pub async fn copy(&self, id: &NodeId) -> Result<NodeId, ExplorerError> {
        self.mutations.copy(id).await
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Clone of one node
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<TreeNode> {
        self.ws.core.lock().store.get(id).cloned()
    }

    /// Snapshot of the whole store
    #[must_use]
    pub fn snapshot(&self) -> Store {
        self.ws.core.lock().store.clone()
    }

    /// Run `f` against the live store under the lock
    pub fn with_store<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        f(&self.ws.core.lock().store)
    }

    /// Number of operations not yet settled
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.ws.core.lock().ops.len()
    }

    /// Settled operations, oldest first
    #[must_use]
    pub fn journal(&self) -> Vec<OpRecord> {
        self.ws.core.lock().journal.iter().cloned().collect()
    }

    /// Drop view references to nodes no longer in the store
    fn prune_view(&self) {
        let mut view = self.view.lock();
        let core = self.ws.core.lock();
        view.expansion.retain(|id| core.store.contains(id));
        if view.active.as_ref().is_some_and(|id| !core.store.contains(id)) {
            tracing::debug!("active node removed");
            view.active = None;
        }
    }
}

impl std::fmt::Debug for Explorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explorer")
            .field("config", &self.ws.config)
            .field("nodes", &self.ws.core.lock().store.len())
            .finish_non_exhaustive()
    }
}
