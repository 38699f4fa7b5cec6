use std::{collections::HashSet, sync::Arc};

use rayon::prelude::*;

use super::*;

#[test]
fn generated_ids_are_unique_and_never_nil() {
    let generator = Arc::new(NodeIdGenerator::new());
    let ids: Vec<NodeId> = (0..10_000)
        .into_par_iter()
        .map(|_| generator.next_id())
        .collect();
    let unique: HashSet<NodeId> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    for id in ids {
        assert_eq!(Some(id), NodeId::from_wire(NodeId::to_wire(Some(id))));
    }
}

#[test]
fn fixed_epoch_is_deterministic() {
    let a = NodeIdGenerator::with_epoch(7);
    let b = NodeIdGenerator::with_epoch(7);
    assert_eq!(a.next_id(), b.next_id());
    assert_eq!(a.next_id(), b.next_id());
    assert_ne!(a.next_id(), NodeIdGenerator::with_epoch(8).next_id());
}

#[test]
fn nil_id_means_absent() {
    assert_eq!(None, NodeId::from_wire([0; 16]));
    assert_eq!([0; 16], NodeId::to_wire(None));
}

#[test]
fn capacity_limits() {
    let generator = NodeIdGenerator::with_epoch(0);
    let mut n = Node::new_leaf(generator.next_id(), None);
    assert_eq!(5, max_keys(3));
    assert_eq!(2, min_keys(3));
    assert!(n.is_underflow(3));

    for i in 0..5u8 {
        n.insert_entry(3, i as usize, Entry::new(vec![i], vec![]))
            .unwrap();
    }
    assert!(n.is_full(3));
    assert!(!n.is_underflow(3));
    assert_eq!(5, n.key_count());

    // Inserting into a full node is a broken invariant and not silently accepted
    let err = n.insert_entry(3, 0, Entry::new(vec![9], vec![])).unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(5, n.key_count());
}

#[test]
fn entries_shift_right_on_insert() {
    let generator = NodeIdGenerator::with_epoch(0);
    let mut n = Node::new_internal(generator.next_id(), None);
    assert!(!n.is_leaf);
    n.insert_entry(2, 0, Entry::new(vec![3], vec![])).unwrap();
    n.insert_entry(2, 0, Entry::new(vec![1], vec![])).unwrap();
    n.insert_entry(2, 1, Entry::new(vec![2], vec![])).unwrap();
    let keys: Vec<u8> = n.entries.iter().map(|e| e.key[0]).collect();
    assert_eq!(vec![1, 2, 3], keys);
    assert!(n.insert_entry(3, 5, Entry::new(vec![4], vec![])).is_err());
}
