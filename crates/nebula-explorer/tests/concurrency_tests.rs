//! Concurrency Tests
//!
//! Interleavings driven by backend gates: shared loads, per-node
//! exclusion, stale results and mid-flight removals.
//!
use nebula_explorer::prelude::*;
use nebula_test_utils::{
    assert_store_valid, child_names, id, ids, loaded_explorer, root_names, setup_explorer_with,
    Call,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_concurrent_expands_share_one_fetch() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::FetchChildren);
    let tables = id(ids::TABLES);

    let first = tokio::spawn({
        let explorer = explorer.clone();
        let tables = tables.clone();
        async move { explorer.expand(&tables).await }
    });
    gate.wait_entered().await;
    assert_eq!(explorer.node(&tables).unwrap().load_state(), LoadState::Loading);

    let second = tokio::spawn({
        let explorer = explorer.clone();
        let tables = tables.clone();
        async move { explorer.expand(&tables).await }
    });
    tokio::task::yield_now().await;
    gate.release(1);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert_eq!(backend.calls(Call::FetchChildren), 1);
    assert_store_valid(&explorer);
}

#[tokio::test]
async fn test_loads_of_different_groups_run_independently() {
    let (explorer, backend) = loaded_explorer().await;

    let tables_id = id(ids::TABLES);
    let views_id = id(ids::VIEWS);
    let (tables, views) = tokio::join!(
        explorer.expand(&tables_id),
        explorer.expand(&views_id)
    );

    assert_eq!(tables.unwrap().len(), 3);
    assert_eq!(views.unwrap().len(), 1);
    assert_eq!(backend.calls(Call::FetchChildren), 2);
}

#[tokio::test]
async fn test_second_mutation_on_same_node_is_busy() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Rename);
    let home = id(ids::HOME);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        let home = home.clone();
        async move { explorer.rename(&home, "Start").await }
    });
    gate.wait_entered().await;

    assert_eq!(explorer.pending_operations(), 1);
    assert_eq!(
        explorer.rename(&home, "Landing").await.unwrap_err(),
        ExplorerError::Busy(home.clone())
    );
    assert_eq!(
        explorer.delete(&home).await.unwrap_err(),
        ExplorerError::Busy(home.clone())
    );
    assert_eq!(
        explorer.expand(&home).await.unwrap_err(),
        ExplorerError::Busy(home.clone())
    );

    // other nodes are unaffected
    explorer.copy(&id(ids::LOGIN)).await.unwrap();
    gate.open();
    pending.await.unwrap().unwrap();

    assert_eq!(explorer.node(&home).unwrap().name(), "Start");
    assert_eq!(explorer.pending_operations(), 0);
    assert_eq!(backend.calls(Call::Rename), 1);
}

#[tokio::test]
async fn test_unrelated_mutations_proceed_in_parallel() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Rename);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        async move { explorer.rename(&id(ids::HOME), "Start").await }
    });
    gate.wait_entered().await;

    explorer.delete(&id(ids::LOGIN)).await.unwrap();
    gate.release(1);
    pending.await.unwrap().unwrap();

    assert_eq!(root_names(&explorer, Namespace::Pages), vec!["Start"]);
}

#[tokio::test]
async fn test_rename_is_not_visible_until_confirmed() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Rename);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        async move { explorer.rename(&id(ids::LOGIN), "Sign In").await }
    });
    gate.wait_entered().await;
    assert_eq!(explorer.node(&id(ids::LOGIN)).unwrap().name(), "Login");

    gate.release(1);
    pending.await.unwrap().unwrap();
    assert_eq!(explorer.node(&id(ids::LOGIN)).unwrap().name(), "Sign In");
}

#[tokio::test]
async fn test_move_is_visible_before_confirmation_and_rolled_back() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Move);
    backend.fail_next(Call::Move, BackendError::Network("connection reset".into()));

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        async move { explorer.move_node(&id(ids::HOME_INDEX), &id(ids::LOGIN)).await }
    });
    gate.wait_entered().await;
    assert_eq!(child_names(&explorer, ids::LOGIN), vec!["Login.tsx", "index.tsx"]);
    assert_eq!(child_names(&explorer, ids::HOME), vec!["style.css"]);

    gate.release(1);
    let err = pending.await.unwrap().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
    assert_eq!(child_names(&explorer, ids::HOME), vec!["index.tsx", "style.css"]);
    assert_eq!(child_names(&explorer, ids::LOGIN), vec!["Login.tsx"]);
    assert_store_valid(&explorer);
}

#[tokio::test]
async fn test_abandoned_load_is_discarded() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::FetchChildren);
    let tables = id(ids::TABLES);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        let tables = tables.clone();
        async move { explorer.expand(&tables).await }
    });
    gate.wait_entered().await;

    assert!(explorer.abandon(&tables));
    assert!(!explorer.abandon(&tables));
    assert_eq!(explorer.node(&tables).unwrap().load_state(), LoadState::Unloaded);

    gate.release(1);
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, ExplorerError::conflict(&tables, ConflictReason::Superseded));
    assert!(err.needs_resync());
    assert!(child_names(&explorer, ids::TABLES).is_empty());

    gate.open();
    assert_eq!(explorer.expand(&tables).await.unwrap().len(), 3);
    assert_store_valid(&explorer);
}

#[tokio::test]
async fn test_collapse_can_abandon_loads() {
    let (explorer, backend) =
        setup_explorer_with(ExplorerConfig::default().with_abandon_on_collapse(true));
    explorer.load_all().await.unwrap();
    let gate = backend.hold(Call::FetchChildren);
    let tables = id(ids::TABLES);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        let tables = tables.clone();
        async move { explorer.expand(&tables).await }
    });
    gate.wait_entered().await;

    assert!(explorer.collapse(&tables));
    gate.release(1);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, ExplorerError::conflict(&tables, ConflictReason::Superseded));
    assert_eq!(explorer.node(&tables).unwrap().load_state(), LoadState::Unloaded);
}

#[tokio::test]
async fn test_load_of_removed_connection_conflicts() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::FetchChildren);
    let tables = id(ids::TABLES);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        let tables = tables.clone();
        async move { explorer.expand(&tables).await }
    });
    gate.wait_entered().await;

    explorer.delete(&id(ids::MAIN_DB)).await.unwrap();
    gate.release(1);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, ExplorerError::conflict(&tables, ConflictReason::NodeRemoved));
    assert!(explorer.node(&tables).is_none());
    assert_store_valid(&explorer);
}

#[tokio::test]
async fn test_rename_of_node_removed_with_ancestor_conflicts() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Rename);
    let index = id(ids::HOME_INDEX);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        let index = index.clone();
        async move { explorer.rename(&index, "main.tsx").await }
    });
    gate.wait_entered().await;

    explorer.delete(&id(ids::HOME)).await.unwrap();
    gate.release(1);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, ExplorerError::conflict(&index, ConflictReason::NodeRemoved));
    assert_eq!(explorer.pending_operations(), 0);
    assert_store_valid(&explorer);
}

#[tokio::test]
async fn test_create_under_parent_removed_meanwhile_conflicts() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Create);
    let draft = NodeDraft::new("About.tsx", NodeKind::Frontend);
    let draft_id = draft.id.clone();

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        async move {
            explorer
                .create(Namespace::Pages, Some(&id(ids::LOGIN)), draft)
                .await
        }
    });
    gate.wait_entered().await;

    explorer.delete(&id(ids::LOGIN)).await.unwrap();
    gate.release(1);

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.needs_resync());
    assert!(explorer.node(&draft_id).is_none());
    assert_store_valid(&explorer);
}

#[tokio::test]
async fn test_namespace_reload_waits_for_pending_work() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Rename);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        async move { explorer.rename(&id(ids::HOME), "Start").await }
    });
    gate.wait_entered().await;

    assert_eq!(
        explorer.load_namespace(Namespace::Pages).await.unwrap_err().kind(),
        ErrorKind::Busy
    );
    assert_eq!(explorer.load_namespace(Namespace::Apis).await.unwrap(), 3);

    gate.release(1);
    pending.await.unwrap().unwrap();
    assert_eq!(explorer.load_namespace(Namespace::Pages).await.unwrap(), 5);
    assert_eq!(explorer.node(&id(ids::HOME)).unwrap().name(), "Start");
}

#[tokio::test]
async fn test_refresh_refuses_while_loading() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::FetchChildren);
    let tables = id(ids::TABLES);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        let tables = tables.clone();
        async move { explorer.expand(&tables).await }
    });
    gate.wait_entered().await;

    assert_eq!(
        explorer.refresh(&tables).await.unwrap_err(),
        ExplorerError::Busy(tables.clone())
    );
    gate.release(1);
    assert_eq!(pending.await.unwrap().unwrap().len(), 3);
}

#[tokio::test]
async fn test_reload_racing_a_create_keeps_the_created_node() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::ListRoots);

    let reload = tokio::spawn({
        let explorer = explorer.clone();
        async move { explorer.load_namespace(Namespace::Pages).await }
    });
    gate.wait_entered().await;

    let created = explorer
        .create(Namespace::Pages, None, NodeDraft::new("Settings", NodeKind::Folder))
        .await
        .unwrap();
    gate.open();

    let err = reload.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        ExplorerError::Conflict {
            id: None,
            reason: ConflictReason::Superseded,
        }
    );
    assert!(explorer.node(&created).is_some());
    assert!(backend.inner().snapshot().get(&created).is_some());

    assert_eq!(explorer.load_namespace(Namespace::Pages).await.unwrap(), 6);
    assert!(explorer.node(&created).is_some());
    assert_store_valid(&explorer);
}

#[tokio::test]
async fn test_move_into_parent_removed_meanwhile_conflicts() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Move);
    let index = id(ids::HOME_INDEX);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        let index = index.clone();
        async move { explorer.move_node(&index, &id(ids::LOGIN)).await }
    });
    gate.wait_entered().await;

    explorer.delete(&id(ids::LOGIN)).await.unwrap();
    assert!(explorer.node(&index).is_none());
    gate.release(1);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, ExplorerError::conflict(&index, ConflictReason::NodeRemoved));
    assert!(err.needs_resync());
    assert_eq!(explorer.pending_operations(), 0);
    assert_store_valid(&explorer);
}

#[tokio::test]
async fn test_refused_move_cannot_reclaim_a_taken_name() {
    let (explorer, backend) = loaded_explorer().await;
    let gate = backend.hold(Call::Move);
    backend.fail_next(Call::Move, BackendError::Network("connection reset".into()));
    let index = id(ids::HOME_INDEX);

    let pending = tokio::spawn({
        let explorer = explorer.clone();
        let index = index.clone();
        async move { explorer.move_node(&index, &id(ids::LOGIN)).await }
    });
    gate.wait_entered().await;

    // free the name remotely so a sibling can take it
    backend.inner().rename_node(&index, "legacy.tsx").await.unwrap();
    explorer.rename(&id(ids::HOME_STYLE), "index.tsx").await.unwrap();
    gate.release(1);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, ExplorerError::conflict(&index, ConflictReason::NameTaken));
    assert_eq!(child_names(&explorer, ids::HOME), vec!["index.tsx"]);
    assert_eq!(child_names(&explorer, ids::LOGIN), vec!["Login.tsx", "index.tsx"]);
    assert_eq!(explorer.pending_operations(), 0);
    assert_store_valid(&explorer);
}
