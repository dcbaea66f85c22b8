//! Shared state behind the explorer
//!
//! The store, in-flight loads and pending operations live in one [`Core`]
//! guarded by a single `parking_lot::Mutex`. The lock is only held for
//! synchronous bookkeeping, never across an `.await`.

use crate::backend::ProjectBackend;
use crate::config::ExplorerConfig;
use crate::error::ExplorerError;
use crate::ops::{Journal, OpKind, OpPhase, PendingOp};
use futures::future::{BoxFuture, Shared};
use nebula_tree::{LoadState, Namespace, NodeId, Store};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Children merged by a load
pub(crate) type LoadResult = Result<Vec<NodeId>, ExplorerError>;

/// Load future joinable by every concurrent `expand`
pub(crate) type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

pub(crate) struct InFlightLoad {
    pub(crate) generation: u64,
    pub(crate) future: SharedLoad,
}

pub(crate) struct Core {
    pub(crate) store: Store,
    pub(crate) loads: HashMap<NodeId, InFlightLoad>,
    pub(crate) ops: HashMap<NodeId, PendingOp>,
    pub(crate) journal: Journal,
    generation: u64,
    /// Newest operation generation begun or settled per namespace
    touched: HashMap<Namespace, u64>,
}

impl Core {
    fn new(journal_capacity: usize) -> Self {
        Self {
            store: Store::new(),
            loads: HashMap::new(),
            ops: HashMap::new(),
            journal: Journal::new(journal_capacity),
            generation: 0,
            touched: HashMap::new(),
        }
    }

    /// Next stamp of the global generation counter
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Fail with `Busy` if `id` has a pending operation or load
    pub(crate) fn ensure_idle(&self, id: &NodeId) -> Result<(), ExplorerError> {
        let loading = self
            .store
            .get(id)
            .is_some_and(|node| node.load_state() == LoadState::Loading);
        if loading || self.ops.contains_key(id) {
            return Err(ExplorerError::Busy(id.clone()));
        }
        Ok(())
    }

    /// Whether any operation or load is pending in `namespace`
    pub(crate) fn busy_in(&self, namespace: Namespace) -> bool {
        self.ops.values().any(|op| op.namespace() == namespace)
            || self
                .loads
                .keys()
                .filter_map(|id| self.store.get(id))
                .any(|node| node.namespace() == namespace)
    }

    /// Whether an operation in `namespace` began or settled after `stamp`
    pub(crate) fn touched_since(&self, namespace: Namespace, stamp: u64) -> bool {
        self.touched.get(&namespace).is_some_and(|&last| last > stamp)
    }

    fn touch(&mut self, namespace: Namespace, generation: u64) {
        let last = self.touched.entry(namespace).or_default();
        *last = (*last).max(generation);
    }

    /// Register an operation on `target` in `Requested`
    pub(crate) fn begin(
        &mut self,
        kind: OpKind,
        target: &NodeId,
        namespace: Namespace,
    ) -> Result<u64, ExplorerError> {
        self.ensure_idle(target)?;
        let generation = self.next_generation();
        self.touch(namespace, generation);
        self.ops
            .insert(target.clone(), PendingOp::new(kind, target.clone(), namespace, generation));
        tracing::debug!("{} {} requested (gen {})", kind.as_str(), target, generation);
        Ok(generation)
    }

    /// Move a registered operation to `Committing`
    pub(crate) fn commit(&mut self, target: &NodeId, generation: u64) -> Result<(), ExplorerError> {
        let op = self
            .ops
            .get_mut(target)
            .filter(|op| op.generation() == generation)
            .ok_or_else(|| ExplorerError::Internal(format!("no pending operation on {target}")))?;
        op.advance(OpPhase::Committing)
            .map_err(|err| ExplorerError::Internal(err.to_string()))
    }

    /// Settle an operation with `outcome` and journal it
    ///
    /// Returns `outcome` unchanged so callers can finish with it.
    pub(crate) fn settle<T>(
        &mut self,
        target: &NodeId,
        generation: u64,
        outcome: Result<T, ExplorerError>,
    ) -> Result<T, ExplorerError> {
        let owned = self.ops.get(target).is_some_and(|op| op.generation() == generation);
        let Some(mut op) = owned.then(|| self.ops.remove(target)).flatten() else {
            tracing::warn!("settling unknown operation on {} (gen {})", target, generation);
            return outcome;
        };
        self.touch(op.namespace(), generation);
        let phase = if outcome.is_ok() { OpPhase::Applied } else { OpPhase::RolledBack };
        if let Err(err) = op.advance(phase) {
            tracing::error!("{}", err);
        }
        match &outcome {
            Ok(_) => tracing::info!("{} {} applied (gen {})", op.kind().as_str(), target, generation),
            Err(err) => tracing::warn!(
                "{} {} rolled back (gen {}): {}",
                op.kind().as_str(),
                target,
                generation,
                err
            ),
        }
        self.journal
            .push(op.record(outcome.as_ref().err().map(ExplorerError::kind)));
        outcome
    }

    /// Drop load bookkeeping for nodes that left the store
    pub(crate) fn forget_removed(&mut self, removed: &[NodeId]) {
        for id in removed {
            self.loads.remove(id);
        }
    }
}

pub(crate) struct Workspace {
    pub(crate) core: Mutex<Core>,
    pub(crate) backend: Arc<dyn ProjectBackend>,
    pub(crate) config: ExplorerConfig,
}

impl Workspace {
    pub(crate) fn new(backend: Arc<dyn ProjectBackend>, config: ExplorerConfig) -> Self {
        Self {
            core: Mutex::new(Core::new(config.journal_capacity)),
            backend,
            config,
        }
    }
}

/// Run `task` on its own tokio task and wait for it
///
/// The task completes and reconciles the store even if the caller's
/// future is dropped.
pub(crate) async fn detached<T, F>(task: F) -> Result<T, ExplorerError>
where
    F: Future<Output = Result<T, ExplorerError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|err| ExplorerError::Internal(format!("background task failed: {err}")))?
}
