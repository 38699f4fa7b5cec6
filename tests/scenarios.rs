use std::{cell::RefCell, rc::Rc};

use kv_btree_index::{
    meta_key, BtreeConfig, BtreeIndex, DeleteOutcome, Error, Fetch, Field, InsertOutcome,
    KeyBuilder, KvStore, MemoryKvStore, Result,
};

fn key(v: i64) -> Vec<u8> {
    KeyBuilder::new().i64(v).build()
}

fn config() -> BtreeConfig {
    BtreeConfig::default()
        .with_degree(3)
        .with_fields(vec![Field::I64])
}

fn collect<S: KvStore>(t: &mut BtreeIndex<S>) -> Result<Vec<i64>> {
    let mut result = Vec::new();
    let mut next = t.index_first()?;
    while let Some((k, _)) = next {
        result.push(i64::from_le_bytes(k[..].try_into().unwrap()));
        next = t.index_next()?;
    }
    Ok(result)
}

#[test]
fn insert_scan_and_delete() -> Result<()> {
    let mut t = BtreeIndex::create(MemoryKvStore::new(), 1, config())?;
    for i in 1..=9 {
        assert_eq!(InsertOutcome::Inserted, t.insert(&key(i * 100), b"v")?);
    }
    let shape = t.check_recursive()?;
    assert_eq!(2, shape.height);
    assert_eq!(9, shape.entries);
    assert_eq!(
        vec![100, 200, 300, 400, 500, 600, 700, 800, 900],
        collect(&mut t)?
    );

    assert_eq!(DeleteOutcome::KeyFound, t.delete(&key(500), b"")?);
    assert_eq!(None, t.search(&key(500))?);
    assert_eq!(
        vec![100, 200, 300, 400, 600, 700, 800, 900],
        collect(&mut t)?
    );
    assert_eq!(8, t.check_recursive()?.entries);
    assert_eq!(8, t.check_sequential()?);
    Ok(())
}

#[test]
fn insert_then_delete_leaves_empty_tree() -> Result<()> {
    let mut t = BtreeIndex::create(MemoryKvStore::new(), 1, config())?;
    t.insert(&key(1), b"a")?;
    assert_eq!(DeleteOutcome::KeyFound, t.delete(&key(1), b"a")?);
    assert_eq!(None, t.index_first()?);
    assert_eq!(0, t.check_sequential()?);
    Ok(())
}

#[test]
fn store_survives_session() -> Result<()> {
    let mut t = BtreeIndex::create(MemoryKvStore::new(), 3, config())?;
    for i in (0..1000).rev() {
        t.insert(&key(i), &i.to_le_bytes())?;
    }
    let kv = t.into_store();
    let records = kv.len();

    let mut t = BtreeIndex::open(kv, 3, config())?;
    assert_eq!(2, t.execution_id());
    assert_eq!(Some(42i64.to_le_bytes().to_vec()), t.search(&key(42))?);
    assert_eq!((0..1000).collect::<Vec<_>>(), collect(&mut t)?);
    // Opening only rewrites the meta record
    assert_eq!(records, t.store().len());
    Ok(())
}

#[test]
fn unavailable_node_can_be_retried() -> Result<()> {
    let mut t = BtreeIndex::create(MemoryKvStore::new(), 1, config())?;
    for i in 0..100 {
        t.insert(&key(i), b"")?;
    }
    let root = t.read_node(t.root_id())?;
    let hidden = kv_btree_index::node_key(1, root.children[0]);
    t.store_mut().hide(&hidden);

    let err = t.delete(&key(0), b"").unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, Error::NotReady { .. }));

    t.store_mut().reveal(&hidden);
    assert_eq!(DeleteOutcome::KeyFound, t.delete(&key(0), b"")?);
    assert_eq!(99, t.check_recursive()?.entries);
    Ok(())
}

/// One store transaction used by several sessions.
#[derive(Clone, Default)]
struct SharedStore(Rc<RefCell<MemoryKvStore>>);

impl KvStore for SharedStore {
    fn get(&self, key: &[u8]) -> Result<Fetch> {
        self.0.borrow().get(key)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.0.borrow_mut().put(key, value)
    }
}

#[test]
fn sessions_follow_root_changes_of_each_other() -> Result<()> {
    let kv = SharedStore::default();
    let mut a = BtreeIndex::create(kv.clone(), 1, config())?;
    a.insert(&key(1), b"a")?;

    // The second session grows the tree
    let mut b = BtreeIndex::open(kv.clone(), 1, config())?;
    for i in 2..=10 {
        b.insert(&key(i), b"b")?;
    }
    assert_eq!(2, b.check_recursive()?.height);
    assert_eq!(1, a.execution_id());
    assert_eq!(2, b.execution_id());

    assert_eq!(Some(b"b".to_vec()), a.search(&key(5))?);
    assert_eq!(InsertOutcome::Inserted, a.insert(&key(11), b"a")?);
    assert_eq!(11, a.check_recursive()?.entries);

    // The second session shrinks it again
    for i in 1..=9 {
        assert_eq!(DeleteOutcome::KeyFound, b.delete(&key(i), b"")?);
    }
    assert_eq!(1, b.check_recursive()?.height);
    assert_eq!(Some(b"b".to_vec()), a.search(&key(10))?);
    assert_eq!(DeleteOutcome::KeyFound, a.delete(&key(11), b"")?);
    assert_eq!(vec![10], collect(&mut a)?);
    assert_eq!(vec![10], collect(&mut b)?);
    assert_eq!(a.root_id(), b.root_id());
    Ok(())
}

#[test]
fn unavailable_meta_record_is_transient() -> Result<()> {
    let kv = SharedStore::default();
    let mut t = BtreeIndex::create(kv.clone(), 1, config())?;
    t.insert(&key(1), b"")?;
    kv.0.borrow_mut().hide(&meta_key(1));

    assert!(t.search(&key(1)).unwrap_err().is_transient());
    assert!(t.insert(&key(2), b"").unwrap_err().is_transient());
    assert!(t.check_sequential().unwrap_err().is_transient());

    kv.0.borrow_mut().reveal_all();
    assert_eq!(InsertOutcome::Inserted, t.insert(&key(2), b"")?);
    assert_eq!(vec![1, 2], collect(&mut t)?);
    Ok(())
}
