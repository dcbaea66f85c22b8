//! In-memory collaborator seeded with a demo project
//!
//! [`MemoryBackend`] keeps its own fully materialized [`Store`] and answers
//! every [`ProjectBackend`] request from it after an artificial delay. Lazy
//! containers are served empty from `list_roots` and filled on
//! `fetch_children`, so the explorer exercises the same load path it would
//! against a remote service.

use crate::backend::{BackendError, NodeDraft, ProjectBackend, RemoteNode};
use crate::config::MemoryBackendConfig;
use nebula_tree::{DbGroupKind, LoadState, Namespace, NewNode, NodeId, NodeKind, Store, StoreError};
use parking_lot::Mutex;
use ulid::Ulid;

/// Collaborator backed by an in-process store
#[derive(Debug)]
pub struct MemoryBackend {
    config: MemoryBackendConfig,
    store: Mutex<Store>,
}

impl MemoryBackend {
    /// Backend per `config`, seeded with the demo project if requested
    #[must_use]
    pub fn new(config: MemoryBackendConfig) -> Self {
        let store = if config.seed_demo { demo_store() } else { Store::new() };
        Self {
            config,
            store: Mutex::new(store),
        }
    }

    /// Demo project without artificial latency
    #[must_use]
    pub fn instant() -> Self {
        Self::new(MemoryBackendConfig::instant())
    }

    /// Copy of the backend's own state
    #[must_use]
    pub fn snapshot(&self) -> Store {
        self.store.lock().clone()
    }

    async fn pause(&self) {
        let delay = self.config.latency(rand::random::<u64>());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MemoryBackendConfig::default())
    }
}

#[async_trait::async_trait]
impl ProjectBackend for MemoryBackend {
    async fn list_roots(&self, namespace: Namespace) -> Result<Vec<RemoteNode>, BackendError> {
        self.pause().await;
        let store = self.store.lock();
        Ok(store
            .roots(namespace)
            .iter()
            .filter_map(|id| export(&store, id))
            .collect())
    }

    async fn fetch_children(
        &self,
        parent: &NodeId,
        namespace: Namespace,
    ) -> Result<Vec<RemoteNode>, BackendError> {
        self.pause().await;
        let store = self.store.lock();
        let node = in_namespace(&store, parent, namespace)?;
        let children = node.children().unwrap_or(&[]);
        Ok(children.iter().filter_map(|id| export(&store, id)).collect())
    }

    async fn create_node(
        &self,
        namespace: Namespace,
        parent: Option<&NodeId>,
        draft: &NodeDraft,
    ) -> Result<RemoteNode, BackendError> {
        self.pause().await;
        let kind = match (namespace, parent) {
            (Namespace::Models, None) => NodeKind::DbConnection,
            (Namespace::External, None) => NodeKind::ExternalSystem,
            _ => draft.kind,
        };
        let id = NodeId::new(format!("node_{}", Ulid::new().to_string().to_lowercase()));
        let payload = if kind.is_container() {
            NewNode::container(id, draft.name.clone(), kind, Vec::new())
        } else {
            NewNode::leaf(id, draft.name.clone(), kind)
        };

        let mut store = self.store.lock();
        if let Some(parent) = parent {
            in_namespace(&store, parent, namespace)?;
        }
        let id = store.insert(namespace, parent, payload).map_err(refusal)?;
        settle_groups(&mut store, &id);
        export(&store, &id).ok_or(BackendError::NotFound(id))
    }

    async fn rename_node(&self, id: &NodeId, name: &str) -> Result<(), BackendError> {
        self.pause().await;
        let mut store = self.store.lock();
        guard(&store, id)?;
        store.rename(id, name).map_err(refusal)
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), BackendError> {
        self.pause().await;
        let mut store = self.store.lock();
        guard(&store, id)?;
        store.remove(id).map(|_| ()).map_err(refusal)
    }

    async fn move_node(
        &self,
        id: &NodeId,
        new_parent: &NodeId,
        namespace: Namespace,
    ) -> Result<(), BackendError> {
        self.pause().await;
        let mut store = self.store.lock();
        in_namespace(&store, id, namespace)?;
        in_namespace(&store, new_parent, namespace)?;
        store.reparent(id, new_parent).map_err(refusal)
    }

    async fn copy_node(&self, id: &NodeId) -> Result<RemoteNode, BackendError> {
        self.pause().await;
        let mut store = self.store.lock();
        let source = guard(&store, id)?;
        let namespace = source.namespace();
        let parent = source.parent().cloned();
        let copy_id = NodeId::new(format!("copy_{}_{}", id, Ulid::new().to_string().to_lowercase()));
        let name = copy_name(&store, namespace, parent.as_ref(), source.name(), source.kind());

        let mut payload = duplicate(&store, id, copy_id).ok_or_else(|| BackendError::NotFound(id.clone()))?;
        payload.name = name;
        let copy_id = store.insert(namespace, parent.as_ref(), payload).map_err(refusal)?;
        settle_groups(&mut store, &copy_id);
        export(&store, &copy_id).ok_or(BackendError::NotFound(copy_id))
    }
}

fn refusal(err: StoreError) -> BackendError {
    match err {
        StoreError::NotFound(id) => BackendError::NotFound(id),
        StoreError::DuplicateName { name, .. } => BackendError::DuplicateName(name),
        other => BackendError::Rejected(other.to_string()),
    }
}

fn in_namespace<'a>(
    store: &'a Store,
    id: &NodeId,
    namespace: Namespace,
) -> Result<&'a nebula_tree::TreeNode, BackendError> {
    let node = store.get(id).ok_or_else(|| BackendError::NotFound(id.clone()))?;
    if node.namespace() != namespace {
        return Err(BackendError::Rejected(format!("{id} is not in {namespace}")));
    }
    Ok(node)
}

/// Reject edits to schema groups
fn guard<'a>(store: &'a Store, id: &NodeId) -> Result<&'a nebula_tree::TreeNode, BackendError> {
    let node = store.get(id).ok_or_else(|| BackendError::NotFound(id.clone()))?;
    if node.kind().is_protected() {
        return Err(BackendError::Rejected(format!("{id} is a schema group")));
    }
    Ok(node)
}

/// Wire form of a stored node; lazy containers are sent empty
fn export(store: &Store, id: &NodeId) -> Option<RemoteNode> {
    let node = store.get(id)?;
    let children = node.children().map(|children| {
        if node.kind().is_lazy() {
            return Vec::new();
        }
        children.iter().filter_map(|child| export(store, child)).collect()
    });
    Some(RemoteNode {
        id: id.clone(),
        name: node.name().to_string(),
        kind: node.kind(),
        children,
    })
}

/// Deep copy of a subtree under `new_id`, with fresh descendant ids
fn duplicate(store: &Store, id: &NodeId, new_id: NodeId) -> Option<RemoteNode> {
    let node = store.get(id)?;
    let children = match node.children() {
        None => None,
        Some(children) => Some(
            children
                .iter()
                .filter_map(|child| {
                    let kind = store.get(child)?.kind();
                    let child_id = match kind {
                        NodeKind::DbGroup(group) => new_id.with_suffix(group.id_suffix()),
                        _ => NodeId::new(format!("node_{}", Ulid::new().to_string().to_lowercase())),
                    };
                    duplicate(store, child, child_id)
                })
                .collect(),
        ),
    };
    Some(RemoteNode {
        id: new_id,
        name: node.name().to_string(),
        kind: node.kind(),
        children,
    })
}

/// `Copy of <name>`, numbered until it is free among the siblings
fn copy_name(
    store: &Store,
    namespace: Namespace,
    parent: Option<&NodeId>,
    name: &str,
    kind: NodeKind,
) -> String {
    let base = format!("Copy of {name}");
    let free = |candidate: &str| {
        store
            .check_sibling_name(namespace, parent, candidate, kind.category(), None)
            .is_ok()
    };
    if free(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base} ({n})"))
        .find(|candidate| free(candidate))
        .unwrap_or(base)
}

/// The backend always knows every group's contents
fn settle_groups(store: &mut Store, id: &NodeId) {
    let mut pending = vec![id.clone()];
    pending.extend(store.descendants(id).unwrap_or_default());
    for node in pending {
        if store.get(&node).is_some_and(|n| n.kind().is_lazy()) {
            if let Err(err) = store.set_load_state(&node, LoadState::Loaded) {
                tracing::error!("cannot settle group {}: {}", node, err);
            }
        }
    }
}

/// Demo project: two pages, a mobile app, a user API, one database and
/// one external system
fn demo_store() -> Store {
    use NodeKind::{Backend, DbConnection, ExternalApi, ExternalSystem, File, Folder, Frontend};

    let mut store = Store::new();
    let mut seed = |namespace, node: NewNode| {
        if let Err(err) = store.insert(namespace, None, node) {
            tracing::error!("demo seed rejected: {}", err);
        }
    };

    seed(
        Namespace::Pages,
        NewNode::container(
            "p1",
            "Home",
            Folder,
            vec![
                NewNode::leaf("p1_1", "index.tsx", Frontend),
                NewNode::leaf("p1_2", "style.css", File),
            ],
        ),
    );
    seed(
        Namespace::Pages,
        NewNode::container("p2", "Login", Folder, vec![NewNode::leaf("p2_1", "Login.tsx", Frontend)]),
    );
    seed(
        Namespace::Apps,
        NewNode::container("a1", "MobileMain", Folder, vec![NewNode::leaf("a1_1", "App.tsx", Frontend)]),
    );
    seed(
        Namespace::Apis,
        NewNode::container(
            "api1",
            "User",
            Folder,
            vec![
                NewNode::leaf("api1_1", "getUser", Backend),
                NewNode::leaf("api1_2", "updateUser", Backend),
            ],
        ),
    );
    seed(
        Namespace::Models,
        NewNode::container("db_main", "Main Database", DbConnection, vec![]),
    );
    seed(
        Namespace::External,
        NewNode::container(
            "ext1",
            "ERP System",
            ExternalSystem,
            vec![NewNode::leaf("ext1_1", "SyncOrder", ExternalApi)],
        ),
    );

    let db = NodeId::new("db_main");
    settle_groups(&mut store, &db);
    let canned: [(DbGroupKind, &[&str]); 3] = [
        (DbGroupKind::Tables, &["sys_users", "sys_roles", "biz_orders"]),
        (DbGroupKind::Views, &["v_user_stats"]),
        (DbGroupKind::Functions, &["fn_get_org_path"]),
    ];
    for (group, names) in canned {
        let group_id = db.with_suffix(group.id_suffix());
        let leaves = names
            .iter()
            .enumerate()
            .map(|(i, name)| NewNode::leaf(group_id.with_suffix(&(i + 1).to_string()), *name, group.child_kind()))
            .collect();
        if let Err(err) = store.attach_children(&group_id, leaves) {
            tracing::error!("demo seed rejected: {}", err);
        }
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(nodes: &[RemoteNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn demo_store_is_valid() {
        let store = demo_store();
        assert_eq!(store.validate(), Ok(()));
        assert_eq!(store.roots(Namespace::Pages).len(), 2);
    }

    #[tokio::test]
    async fn roots_hide_lazy_children() {
        let backend = MemoryBackend::instant();
        let models = backend.list_roots(Namespace::Models).await.unwrap();
        let groups = models[0].children.as_ref().unwrap();
        assert_eq!(groups.len(), 6);
        assert!(groups.iter().all(|g| g.children.as_deref() == Some(&[][..])));
    }

    #[tokio::test]
    async fn tables_are_served_in_order() {
        let backend = MemoryBackend::instant();
        let tables = backend
            .fetch_children(&NodeId::new("db_main_tables"), Namespace::Models)
            .await
            .unwrap();
        assert_eq!(names(&tables), vec!["sys_users", "sys_roles", "biz_orders"]);
        assert_eq!(tables[0].id, NodeId::new("db_main_tables_1"));
        let procs = backend
            .fetch_children(&NodeId::new("db_main_procs"), Namespace::Models)
            .await
            .unwrap();
        assert!(procs.is_empty());
    }

    #[tokio::test]
    async fn model_roots_become_connections() {
        let backend = MemoryBackend::instant();
        let draft = NodeDraft::new("Analytics", NodeKind::Folder);
        let created = backend.create_node(Namespace::Models, None, &draft).await.unwrap();
        assert_eq!(created.kind, NodeKind::DbConnection);
        assert_eq!(created.children.as_ref().map(Vec::len), Some(6));
        assert_ne!(created.id, draft.id);

        let store = backend.snapshot();
        for group in store.children(&created.id).unwrap() {
            assert_eq!(store.get(group).unwrap().load_state(), LoadState::Loaded);
        }
    }

    #[tokio::test]
    async fn jittered_requests_wait_within_bounds() {
        let backend = MemoryBackend::new(MemoryBackendConfig::instant().with_latency(2, 10));
        for _ in 0..3 {
            let started = std::time::Instant::now();
            backend.list_roots(Namespace::Apis).await.unwrap();
            let waited = started.elapsed();
            assert!(waited >= std::time::Duration::from_millis(2));
            assert!(waited < std::time::Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn duplicate_create_is_refused() {
        let backend = MemoryBackend::instant();
        let draft = NodeDraft::new("Home", NodeKind::Folder);
        let err = backend.create_node(Namespace::Pages, None, &draft).await.unwrap_err();
        assert_eq!(err, BackendError::DuplicateName("Home".into()));
    }

    #[tokio::test]
    async fn copies_are_numbered() {
        let backend = MemoryBackend::instant();
        let first = backend.copy_node(&NodeId::new("p1")).await.unwrap();
        let second = backend.copy_node(&NodeId::new("p1")).await.unwrap();
        assert_eq!(first.name, "Copy of Home");
        assert_eq!(second.name, "Copy of Home (2)");
        assert_eq!(first.subtree_len(), 3);
        assert_eq!(backend.snapshot().validate(), Ok(()));
    }

    #[tokio::test]
    async fn remote_rejects_cycles_and_groups() {
        let backend = MemoryBackend::instant();
        let err = backend
            .move_node(&NodeId::new("p1"), &NodeId::new("p1"), Namespace::Pages)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
        let err = backend.delete_node(&NodeId::new("db_main_views")).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }
}
