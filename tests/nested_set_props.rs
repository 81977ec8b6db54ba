//! Randomized operation sequences against the nested-set store.
//!
//! After every step the structural invariants must hold and the node count must match a
//! simple model that only tracks ids.

use proptest::prelude::*;

use rbacstore::{NestedSet, NodeId};

#[derive(Debug, Clone)]
enum Op {
    Insert { parent: usize, title: u8 },
    InsertPath { segments: Vec<u8> },
    Remove { target: usize },
    RemoveSubtree { target: usize },
    Edit { target: usize, title: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<usize>(), 0u8..8).prop_map(|(parent, title)| Op::Insert { parent, title }),
        2 => prop::collection::vec(0u8..4, 1..4).prop_map(|segments| Op::InsertPath { segments }),
        1 => any::<usize>().prop_map(|target| Op::Remove { target }),
        1 => any::<usize>().prop_map(|target| Op::RemoveSubtree { target }),
        1 => (any::<usize>(), 0u8..8).prop_map(|(target, title)| Op::Edit { target, title }),
    ]
}

fn pick(set: &NestedSet, i: usize) -> NodeId {
    let rows = set.rows();
    rows[i % rows.len()].id
}

fn title(t: u8) -> String { format!("n{}", t) }

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn random_operations_keep_the_tree_valid(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut set = NestedSet::new();
        let mut live: Vec<NodeId> = vec![set.root_id()];

        for op in ops {
            match op {
                Op::Insert { parent, title: t } => {
                    let parent = pick(&set, parent);
                    let id = set.insert(&title(t), "", Some(parent)).unwrap();
                    prop_assert!(!live.contains(&id));
                    prop_assert_eq!(set.parent(id).unwrap(), Some(parent));
                    live.push(id);
                }
                Op::InsertPath { segments } => {
                    let path = format!("/{}", segments.iter().map(|s| format!("p{}", s)).collect::<Vec<_>>().join("/"));
                    let before = set.count();
                    let (created, leaf) = set.insert_path(&path, &[]).unwrap();
                    prop_assert_eq!(set.count(), before + created as usize);
                    prop_assert_eq!(set.resolve_path(&path).unwrap(), leaf);
                    let (again, same) = set.insert_path(&path, &[]).unwrap();
                    prop_assert_eq!(again, 0);
                    prop_assert_eq!(same, leaf);
                    for r in set.rows() {
                        if !live.contains(&r.id) { live.push(r.id); }
                    }
                }
                Op::Remove { target } => {
                    let id = pick(&set, target);
                    if id == set.root_id() {
                        prop_assert!(set.remove(id).is_err());
                        continue;
                    }
                    let kids: Vec<NodeId> = set.children(id).unwrap().into_iter().map(|e| e.id).collect();
                    let parent = set.parent(id).unwrap();
                    set.remove(id).unwrap();
                    live.retain(|x| *x != id);
                    for k in kids {
                        prop_assert_eq!(set.parent(k).unwrap(), parent);
                    }
                }
                Op::RemoveSubtree { target } => {
                    let id = pick(&set, target);
                    if id == set.root_id() {
                        prop_assert!(set.remove_subtree(id).is_err());
                        continue;
                    }
                    let expected = set.subtree_ids(id).unwrap();
                    let removed = set.remove_subtree(id).unwrap();
                    prop_assert_eq!(&removed, &expected);
                    live.retain(|x| !removed.contains(x));
                    for r in &removed {
                        prop_assert!(!set.contains_id(*r));
                    }
                }
                Op::Edit { target, title: t } => {
                    let id = pick(&set, target);
                    if id == set.root_id() {
                        prop_assert!(set.edit(id, &title(t), "").is_err());
                        continue;
                    }
                    let (l, r) = { let n = set.get(id).unwrap(); (n.left, n.right) };
                    set.edit(id, &title(t), "edited").unwrap();
                    let n = set.get(id).unwrap();
                    prop_assert_eq!((n.left, n.right), (l, r));
                    prop_assert_eq!(n.title.clone(), title(t));
                }
            }

            prop_assert!(set.validate().is_ok(), "invalid tree: {:?}", set.validate());
            prop_assert_eq!(set.count(), live.len());
            prop_assert_eq!(set.root().right, 2 * set.count() as i64 - 1);
        }
    }

    #[test]
    fn rows_rebuild_the_same_tree(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let mut set = NestedSet::new();
        for op in ops {
            match op {
                Op::Insert { parent, title: t } => { let p = pick(&set, parent); set.insert(&title(t), "", Some(p)).unwrap(); }
                Op::InsertPath { segments } => {
                    let path = format!("/{}", segments.iter().map(|s| format!("p{}", s)).collect::<Vec<_>>().join("/"));
                    set.insert_path(&path, &[]).unwrap();
                }
                Op::Remove { target } => { let _ = set.remove(pick(&set, target)); }
                Op::RemoveSubtree { target } => { let _ = set.remove_subtree(pick(&set, target)); }
                Op::Edit { target, title: t } => { let _ = set.edit(pick(&set, target), &title(t), ""); }
            }
        }
        let rebuilt = NestedSet::from_rows(set.rows().to_vec(), set.next_id()).unwrap();
        prop_assert_eq!(rebuilt.rows(), set.rows());
        for r in set.rows() {
            prop_assert_eq!(rebuilt.path_string(r.id).unwrap(), set.path_string(r.id).unwrap());
        }
    }
}
