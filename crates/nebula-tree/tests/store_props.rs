use nebula_tree::prelude::*;
use nebula_tree::{InvariantViolation, KindCategory};
use proptest::prelude::*;

const IDS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

/// Pages forest mixing folders and files, plus a models connection
fn seeded() -> Store {
    let mut store = Store::new();
    store
        .insert(
            Namespace::Pages,
            None,
            NewNode::container(
                "a",
                "A",
                NodeKind::Folder,
                vec![
                    NewNode::container("b", "B", NodeKind::Folder, vec![NewNode::leaf("c", "C", NodeKind::File)]),
                    NewNode::leaf("d", "D", NodeKind::File),
                ],
            ),
        )
        .unwrap();
    store
        .insert(
            Namespace::Pages,
            None,
            NewNode::container(
                "e",
                "E",
                NodeKind::Folder,
                vec![
                    NewNode::container("f", "F", NodeKind::Folder, vec![]),
                    NewNode::leaf("g", "C", NodeKind::File),
                ],
            ),
        )
        .unwrap();
    store
        .insert(Namespace::Pages, None, NewNode::leaf("h", "H", NodeKind::Frontend))
        .unwrap();
    store
        .insert(
            Namespace::Models,
            None,
            NewNode::container("db", "Main Database", NodeKind::DbConnection, vec![]),
        )
        .unwrap();
    store
}

#[derive(Debug, Clone)]
enum Step {
    Move(usize, usize),
    Rename(usize, usize),
    Delete(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (0..IDS.len(), 0..IDS.len()).prop_map(|(a, b)| Step::Move(a, b)),
        2 => (0..IDS.len(), 0..IDS.len()).prop_map(|(a, b)| Step::Rename(a, b)),
        1 => (0..IDS.len()).prop_map(Step::Delete),
    ]
}

fn no_sibling_collisions(store: &Store) -> bool {
    let mut levels: Vec<Vec<NodeId>> = Namespace::ALL.iter().map(|ns| store.roots(*ns).to_vec()).collect();
    for node in Namespace::ALL.iter().flat_map(|ns| store.nodes_in(*ns)) {
        if let Some(children) = node.children() {
            levels.push(children.to_vec());
        }
    }
    levels.iter().all(|level| {
        let mut seen: Vec<(&str, KindCategory)> = Vec::new();
        level.iter().filter_map(|id| store.get(id)).all(|n| {
            let key = (n.name(), n.kind().category());
            let fresh = !seen.contains(&key);
            seen.push(key);
            fresh
        })
    })
}

proptest! {
    #[test]
    fn prop_random_mutations_keep_forest_valid(steps in prop::collection::vec(step(), 1..40)) {
        let mut store = seeded();
        for step in steps {
            let before = store.clone();
            let result = match step {
                Step::Move(a, b) => store.reparent(&NodeId::new(IDS[a]), &NodeId::new(IDS[b])),
                Step::Rename(a, b) => store.rename(&NodeId::new(IDS[a]), IDS[b]),
                Step::Delete(a) => store.remove(&NodeId::new(IDS[a])).map(|_| ()),
            };
            if result.is_err() {
                prop_assert_eq!(&store, &before);
            }
            prop_assert_eq!(store.validate(), Ok(()));
            prop_assert!(no_sibling_collisions(&store));
        }
    }

    #[test]
    fn prop_rejected_moves_never_create_cycles(a in 0..IDS.len(), b in 0..IDS.len()) {
        let mut store = seeded();
        let id = NodeId::new(IDS[a]);
        let target = NodeId::new(IDS[b]);
        let was_ancestor = a == b || store.is_ancestor(&id, &target);
        let result = store.reparent(&id, &target);
        if was_ancestor {
            let is_invalid_move = matches!(result, Err(StoreError::InvalidMove { .. }));
            prop_assert!(is_invalid_move);
        }
        prop_assert!(!store.is_ancestor(&target, &target));
        prop_assert_eq!(store.validate(), Ok(()));
    }

    #[test]
    fn prop_search_keeps_ancestors_of_matches(query in "[a-hA-H]{1,2}") {
        let store = seeded();
        let filter = SearchFilter::new(&query);
        let forest = filter.apply(&store, Namespace::Pages);
        let kept = forest.ids();
        for node in store.nodes_in(Namespace::Pages) {
            if filter.matches(node.name()) {
                for ancestor in store.path_to(node.id()).unwrap() {
                    prop_assert!(kept.contains(&ancestor));
                }
            }
        }
        for id in &kept {
            let has_match = std::iter::once(id.clone())
                .chain(store.descendants(id).unwrap())
                .any(|d| filter.matches(store.get(&d).unwrap().name()));
            prop_assert!(has_match);
        }
    }
}

#[test]
fn failed_move_leaves_store_untouched() {
    let mut store = seeded();
    let before = store.clone();
    let err = store.reparent(&NodeId::new("a"), &NodeId::new("c")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidMove { reason: MoveRejection::NotAContainer, .. }));
    let err = store.reparent(&NodeId::new("a"), &NodeId::new("b")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidMove { reason: MoveRejection::Descendant, .. }));
    assert_eq!(store, before);
}

#[test]
fn moving_into_sibling_with_same_name_collides() {
    let mut store = seeded();
    // "g" is a file named "C"; "b" already holds a file named "C"
    let err = store.reparent(&NodeId::new("g"), &NodeId::new("b")).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateName { .. }));
}

#[test]
fn schema_groups_cannot_leave_their_connection() {
    let mut store = seeded();
    let err = store
        .reparent(&NodeId::new("db_views"), &NodeId::new("db_tables"))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidMove { reason: MoveRejection::Protected, .. }));
    assert!(store.remove(&NodeId::new("db_views")).is_ok());
    assert_eq!(
        store.validate(),
        Err(InvariantViolation::BrokenScaffold(NodeId::new("db")))
    );
}
