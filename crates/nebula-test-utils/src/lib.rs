//! Testing utilities for the Nebula workspace
//!
//! Shared fixtures, a scriptable backend, and assertions.

#![allow(missing_docs)]

use nebula_explorer::{
    BackendError, Explorer, ExplorerConfig, MemoryBackend, MemoryBackendConfig, NodeDraft,
    ProjectBackend, RemoteNode,
};
use nebula_tree::{Namespace, NodeId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Ids of the demo project served by [`MemoryBackend`]
pub mod ids {
    pub const HOME: &str = "p1";
    pub const HOME_INDEX: &str = "p1_1";
    pub const HOME_STYLE: &str = "p1_2";
    pub const LOGIN: &str = "p2";
    pub const LOGIN_TSX: &str = "p2_1";
    pub const MOBILE_MAIN: &str = "a1";
    pub const USER_API: &str = "api1";
    pub const MAIN_DB: &str = "db_main";
    pub const TABLES: &str = "db_main_tables";
    pub const VIEWS: &str = "db_main_views";
    pub const FUNCTIONS: &str = "db_main_funcs";
    pub const PROCEDURES: &str = "db_main_procs";
    pub const QUERIES: &str = "db_main_queries";
    pub const ERP: &str = "ext1";
}

pub fn id(raw: &str) -> NodeId {
    NodeId::new(raw)
}

/// Backend call, for counters, failures and gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    ListRoots,
    FetchChildren,
    Create,
    Rename,
    Delete,
    Move,
    Copy,
}

/// Parks backend calls until the test releases them
#[derive(Debug)]
pub struct Gate {
    entered: Semaphore,
    release: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        }
    }

    /// Wait until one more call has reached the gate
    pub async fn wait_entered(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    /// Let `n` parked (or future) calls through
    pub fn release(&self, n: usize) {
        self.release.add_permits(n);
    }

    /// Let every call through from now on
    pub fn open(&self) {
        self.release.close();
    }

    async fn pass(&self) {
        self.entered.add_permits(1);
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
    }
}

/// [`MemoryBackend`] with call counters, failure injection and gates
#[derive(Debug)]
pub struct ScriptedBackend {
    inner: MemoryBackend,
    calls: Mutex<HashMap<Call, usize>>,
    failures: Mutex<HashMap<Call, VecDeque<BackendError>>>,
    gates: Mutex<HashMap<Call, Arc<Gate>>>,
    children: Mutex<HashMap<NodeId, Vec<RemoteNode>>>,
}

impl ScriptedBackend {
    /// Demo project, no latency
    pub fn new() -> Self {
        Self::with_inner(MemoryBackend::instant())
    }

    /// No data, no latency
    pub fn empty() -> Self {
        Self::with_inner(MemoryBackend::new(MemoryBackendConfig::instant().with_seed_demo(false)))
    }

    fn with_inner(inner: MemoryBackend) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Number of calls of a kind so far
    pub fn calls(&self, call: Call) -> usize {
        self.calls.lock().get(&call).copied().unwrap_or(0)
    }

    /// Fail the next call of a kind with `error`
    pub fn fail_next(&self, call: Call, error: BackendError) {
        self.failures.lock().entry(call).or_default().push_back(error);
    }

    /// Park every subsequent call of a kind at the returned gate
    pub fn hold(&self, call: Call) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.gates.lock().insert(call, Arc::clone(&gate));
        gate
    }

    /// Stop parking calls of a kind (already parked calls stay parked)
    pub fn unhold(&self, call: Call) {
        self.gates.lock().remove(&call);
    }

    /// Serve `children` for `parent` instead of the backend's own
    pub fn set_children(&self, parent: &NodeId, children: Vec<RemoteNode>) {
        self.children.lock().insert(parent.clone(), children);
    }

    async fn enter(&self, call: Call) -> Result<(), BackendError> {
        *self.calls.lock().entry(call).or_default() += 1;
        let gate = self.gates.lock().get(&call).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let failure = self.failures.lock().get_mut(&call).and_then(VecDeque::pop_front);
        failure.map_or(Ok(()), Err)
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProjectBackend for ScriptedBackend {
    async fn list_roots(&self, namespace: Namespace) -> Result<Vec<RemoteNode>, BackendError> {
        self.enter(Call::ListRoots).await?;
        self.inner.list_roots(namespace).await
    }

    async fn fetch_children(
        &self,
        parent: &NodeId,
        namespace: Namespace,
    ) -> Result<Vec<RemoteNode>, BackendError> {
        self.enter(Call::FetchChildren).await?;
        let scripted = self.children.lock().get(parent).cloned();
        match scripted {
            Some(children) => Ok(children),
            None => self.inner.fetch_children(parent, namespace).await,
        }
    }

    async fn create_node(
        &self,
        namespace: Namespace,
        parent: Option<&NodeId>,
        draft: &NodeDraft,
    ) -> Result<RemoteNode, BackendError> {
        self.enter(Call::Create).await?;
        self.inner.create_node(namespace, parent, draft).await
    }

    async fn rename_node(&self, id: &NodeId, name: &str) -> Result<(), BackendError> {
        self.enter(Call::Rename).await?;
        self.inner.rename_node(id, name).await
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), BackendError> {
        self.enter(Call::Delete).await?;
        self.inner.delete_node(id).await
    }

    async fn move_node(
        &self,
        id: &NodeId,
        new_parent: &NodeId,
        namespace: Namespace,
    ) -> Result<(), BackendError> {
        self.enter(Call::Move).await?;
        self.inner.move_node(id, new_parent, namespace).await
    }

    async fn copy_node(&self, id: &NodeId) -> Result<RemoteNode, BackendError> {
        self.enter(Call::Copy).await?;
        self.inner.copy_node(id).await
    }
}

/// Explorer over a fresh [`ScriptedBackend`], nothing loaded yet
pub fn setup_explorer() -> (Explorer, Arc<ScriptedBackend>) {
    setup_explorer_with(ExplorerConfig::default())
}

pub fn setup_explorer_with(config: ExplorerConfig) -> (Explorer, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new());
    let explorer = Explorer::new(backend.clone(), config);
    (explorer, backend)
}

/// Explorer with every namespace of the demo project loaded
pub async fn loaded_explorer() -> (Explorer, Arc<ScriptedBackend>) {
    let (explorer, backend) = setup_explorer();
    explorer.load_all().await.unwrap();
    (explorer, backend)
}

/// Names of a container's children, in order
pub fn child_names(explorer: &Explorer, parent: &str) -> Vec<String> {
    explorer.with_store(|store| {
        store
            .children(&id(parent))
            .unwrap()
            .iter()
            .map(|child| store.get(child).unwrap().name().to_string())
            .collect()
    })
}

/// Names of a namespace's roots, in order
pub fn root_names(explorer: &Explorer, namespace: Namespace) -> Vec<String> {
    explorer.with_store(|store| {
        store
            .roots(namespace)
            .iter()
            .map(|root| store.get(root).unwrap().name().to_string())
            .collect()
    })
}

/// Panics with the violation if the store is inconsistent
pub fn assert_store_valid(explorer: &Explorer) {
    if let Err(violation) = explorer.with_store(nebula_tree::Store::validate) {
        panic!("store invariant violated: {violation}");
    }
}

pub fn folder(raw: &str, name: &str) -> NodeDraft {
    NodeDraft {
        id: id(raw),
        name: name.to_string(),
        kind: nebula_tree::NodeKind::Folder,
    }
}

pub fn file(raw: &str, name: &str) -> NodeDraft {
    NodeDraft {
        id: id(raw),
        name: name.to_string(),
        kind: nebula_tree::NodeKind::File,
    }
}
