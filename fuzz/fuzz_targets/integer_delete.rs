#![no_main]
use libfuzzer_sys::fuzz_target;

use kv_btree_index::{
    BtreeConfig, BtreeIndex, DeleteOutcome, Field, KeyBuilder, MemoryKvStore,
};
use std::collections::BTreeSet;

fuzz_target!(|data: (Vec<i16>, Vec<i16>, u8)| {
    let degree = (data.2 as usize % 16).max(2);
    let config = BtreeConfig::default()
        .with_degree(degree)
        .with_fields(vec![Field::I16]);
    let mut m = BTreeSet::default();
    let mut fixture = BtreeIndex::create(MemoryKvStore::new(), 1, config).unwrap();

    for key in data.0 {
        fixture.insert(&KeyBuilder::new().i16(key).build(), &[]).unwrap();
        m.insert(key);
    }
    for key in data.1 {
        let expected = if m.remove(&key) {
            DeleteOutcome::KeyFound
        } else {
            DeleteOutcome::KeyNotFound
        };
        let outcome = fixture
            .delete(&KeyBuilder::new().i16(key).build(), &[])
            .unwrap();
        assert_eq!(expected, outcome);
        assert_eq!(m.len(), fixture.check_recursive().unwrap().entries);
    }
    assert_eq!(m.len(), fixture.check_sequential().unwrap());

    for k in m.iter() {
        let found = fixture.search(&KeyBuilder::new().i16(*k).build()).unwrap();
        assert_eq!(Some(vec![]), found);
    }
});
