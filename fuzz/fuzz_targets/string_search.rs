#![no_main]
use fake::{Fake, StringFaker};
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use kv_btree_index::{BtreeConfig, BtreeIndex, Field, KeyBuilder, MemoryKvStore};

fuzz_target!(|seed: u64| {
    // Create an index with random entries
    let n_entries = 2000;
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    const ASCII: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let id_faker = StringFaker::with(Vec::from(ASCII), 8..16);
    let name_faker = fake::faker::name::en::Name();

    let config = BtreeConfig::default()
        .with_fields(vec![Field::String(18)])
        .max_value_size(64);
    let mut btree = BtreeIndex::create(MemoryKvStore::new(), 1, config).unwrap();

    // Insert the strings, random duplicates are rejected
    for _ in 0..n_entries {
        let key: String = id_faker.fake_with_rng(&mut rng);
        let value: String = name_faker.fake_with_rng(&mut rng);
        btree
            .insert(&KeyBuilder::new().string(18, &key).build(), value.as_bytes())
            .unwrap();
    }
    // Generate and insert a known key/value
    let search_key: String = id_faker.fake_with_rng(&mut rng);
    let search_value: String = name_faker.fake_with_rng(&mut rng);
    let search_key = KeyBuilder::new().string(18, &search_key).build();

    // The key might have been generated before
    btree.delete(&search_key, &[]).unwrap();
    btree.insert(&search_key, search_value.as_bytes()).unwrap();

    let found = btree.search(&search_key).unwrap().unwrap();
    assert_eq!(search_value.as_bytes(), &found[..]);
});
