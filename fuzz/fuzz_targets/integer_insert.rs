#![no_main]
use libfuzzer_sys::fuzz_target;

use kv_btree_index::{BtreeConfig, BtreeIndex, Field, InsertOutcome, KeyBuilder, MemoryKvStore};
use std::collections::BTreeMap;

fuzz_target!(|data: (Vec<(i64, u32)>, u8)| {
    let degree = (data.1 as usize).max(2);
    let config = BtreeConfig::default()
        .with_degree(degree)
        .with_fields(vec![Field::I64]);
    let mut m = BTreeMap::default();
    let mut fixture = BtreeIndex::create(MemoryKvStore::new(), 1, config).unwrap();

    for (key, value) in data.0 {
        let outcome = fixture
            .insert(&KeyBuilder::new().i64(key).build(), &value.to_le_bytes())
            .unwrap();
        if m.contains_key(&key) {
            assert_eq!(InsertOutcome::DuplicateKey, outcome);
        } else {
            assert_eq!(InsertOutcome::Inserted, outcome);
            m.insert(key, value.to_le_bytes().to_vec());
        }
    }

    // Both checks must agree with the number of entries
    assert_eq!(m.len(), fixture.check_recursive().unwrap().entries);
    assert_eq!(m.len(), fixture.check_sequential().unwrap());

    // search for each entry
    for (k, v) in m.iter() {
        let found = fixture.search(&KeyBuilder::new().i64(*k).build()).unwrap();
        assert_eq!(Some(v), found.as_ref());
    }

    // A full scan returns the entries of the map in the same order
    let m: Vec<_> = m
        .into_iter()
        .map(|(k, v)| (KeyBuilder::new().i64(k).build(), v))
        .collect();
    let mut scanned = Vec::new();
    let mut next = fixture.index_first().unwrap();
    while let Some(e) = next {
        scanned.push(e);
        next = fixture.index_next().unwrap();
    }
    assert_eq!(m, scanned);
});
