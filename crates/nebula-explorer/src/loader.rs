//! Lazy child loading
//!
//! Containers whose children are fetched on demand move through
//! `Unloaded → Loading → {Loaded | Failed}`. Concurrent expands of the same
//! node join one shared in-flight fetch. The fetch runs on its own task and
//! is stamped with a generation; a result whose stamp is no longer current
//! is discarded.

use crate::error::{ConflictReason, ExplorerError};
use crate::workspace::{Core, InFlightLoad, LoadResult, SharedLoad, Workspace};
use futures::FutureExt;
use nebula_tree::{LoadState, Namespace, NodeId};
use std::sync::Arc;

/// Loads lazy children into the shared store
#[derive(Clone)]
pub struct LazyLoader {
    ws: Arc<Workspace>,
}

impl LazyLoader {
    pub(crate) fn new(ws: Arc<Workspace>) -> Self {
        Self { ws }
    }

    /// Ensure a container's children are present and return them
    ///
    /// Loaded and eager containers answer from the store. A load already in
    /// flight is joined rather than repeated.
    ///
    /// # Errors
    /// - `NotFound` / `NotAContainer` for bad targets
    /// - `Busy` if the node has a pending mutation
    /// - `NetworkFailure` (node left `Failed`, retryable) or `Conflict`
    ///   if the load was abandoned, superseded or the node vanished
    pub async fn expand(&self, id: &NodeId) -> Result<Vec<NodeId>, ExplorerError> {
        let pending = {
            let mut core = self.ws.core.lock();
            match self.prepare(&mut core, id)? {
                Prepared::Ready(children) => return Ok(children),
                Prepared::Pending(future) => future,
            }
        };
        pending.await
    }

    /// Discard the in-flight load of `id`
    ///
    /// The node returns to `Unloaded`; the request still completes but its
    /// result is dropped and waiting callers get `Conflict(Superseded)`.
    /// Returns `false` if nothing was loading.
    pub fn abandon(&self, id: &NodeId) -> bool {
        let mut core = self.ws.core.lock();
        if core.loads.remove(id).is_none() {
            return false;
        }
        core.next_generation();
        if core.store.set_load_state(id, LoadState::Unloaded).is_err() {
            return false;
        }
        tracing::debug!("abandoned load of {}", id);
        true
    }

    /// Drop a lazy container's children and fetch them again
    ///
    /// Eager containers are returned as they are.
    ///
    /// # Errors
    /// `Busy` if the node is loading or anything in its subtree has a pending
    /// operation; otherwise as [`LazyLoader::expand`]
    pub async fn refresh(&self, id: &NodeId) -> Result<Vec<NodeId>, ExplorerError> {
        {
            let mut core = self.ws.core.lock();
            let node = core.store.lookup(id)?;
            if !node.is_container() {
                return Err(ExplorerError::NotAContainer(id.clone()));
            }
            if node.kind().is_lazy() {
                core.ensure_idle(id)?;
                let subtree = core.store.descendants(id)?;
                if let Some(busy) = subtree.iter().find(|d| core.ensure_idle(d).is_err()) {
                    return Err(ExplorerError::Busy(busy.clone()));
                }
                let removed = core.store.clear_children(id)?;
                core.forget_removed(&removed);
                core.store.set_load_state(id, LoadState::Unloaded)?;
                tracing::debug!("refreshing {} ({} children dropped)", id, removed.len());
            }
        }
        self.expand(id).await
    }

    fn prepare(&self, core: &mut Core, id: &NodeId) -> Result<Prepared, ExplorerError> {
        let node = core.store.lookup(id)?;
        let Some(children) = node.children() else {
            return Err(ExplorerError::NotAContainer(id.clone()));
        };
        let children = children.to_vec();
        let namespace = node.namespace();
        let state = node.load_state();
        if core.ops.contains_key(id) {
            return Err(ExplorerError::Busy(id.clone()));
        }

        match state {
            LoadState::NotLoadable | LoadState::Loaded => Ok(Prepared::Ready(children)),
            LoadState::Loading => core
                .loads
                .get(id)
                .map(|load| Prepared::Pending(load.future.clone()))
                .ok_or_else(|| ExplorerError::Internal(format!("{id} is loading without a request"))),
            LoadState::Unloaded | LoadState::Failed => {
                Ok(Prepared::Pending(self.start(core, id, namespace)?))
            }
        }
    }

    fn start(&self, core: &mut Core, id: &NodeId, namespace: Namespace) -> Result<SharedLoad, ExplorerError> {
        let generation = core.next_generation();
        core.store.set_load_state(id, LoadState::Loading)?;
        tracing::debug!("loading children of {} (gen {})", id, generation);

        let ws = Arc::clone(&self.ws);
        let target = id.clone();
        let task = tokio::spawn(async move {
            let fetched = ws.backend.fetch_children(&target, namespace).await;
            finish(&ws, &target, generation, fetched)
        });
        let future = async move {
            task.await
                .map_err(|err| ExplorerError::Internal(format!("load task failed: {err}")))?
        }
        .boxed()
        .shared();

        core.loads.insert(
            id.clone(),
            InFlightLoad {
                generation,
                future: future.clone(),
            },
        );
        Ok(future)
    }
}

enum Prepared {
    Ready(Vec<NodeId>),
    Pending(SharedLoad),
}

/// Merge a completed fetch if it is still the current request for `id`
fn finish(
    ws: &Workspace,
    id: &NodeId,
    generation: u64,
    fetched: Result<Vec<crate::backend::RemoteNode>, crate::backend::BackendError>,
) -> LoadResult {
    let mut core = ws.core.lock();
    if !core.store.contains(id) {
        core.loads.remove(id);
        tracing::debug!("discarding load of removed node {}", id);
        return Err(ExplorerError::conflict(id, ConflictReason::NodeRemoved));
    }
    if core.loads.get(id).map(|load| load.generation) != Some(generation) {
        tracing::debug!("discarding stale load of {} (gen {})", id, generation);
        return Err(ExplorerError::conflict(id, ConflictReason::Superseded));
    }
    core.loads.remove(id);

    let outcome = match fetched {
        Ok(children) => core
            .store
            .attach_children(id, children)
            .map_err(|err| ExplorerError::on_apply(err, id)),
        Err(err) => Err(ExplorerError::from_remote(err, Some(id))),
    };
    let state = if outcome.is_ok() { LoadState::Loaded } else { LoadState::Failed };
    core.store.set_load_state(id, state)?;
    match &outcome {
        Ok(children) => tracing::debug!("loaded {} children into {}", children.len(), id),
        Err(err) => tracing::warn!("loading {} failed: {}", id, err),
    }
    outcome
}
