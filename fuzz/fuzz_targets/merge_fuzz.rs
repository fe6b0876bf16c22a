#![no_main]
use std::collections::HashSet;

use dbpf_merge::dbpf::{Container, Resource, ResourceKey};
use dbpf_merge::merge::{MergeEngine, Strategy};
use libfuzzer_sys::fuzz_target;

fn container(bytes: &[u8]) -> Container {
    bytes
        .chunks(6)
        .map(|c| {
            let key = ResourceKey::new(c[0] as u32 % 3, 0, c.get(1).copied().unwrap_or(0) as u64 % 16);
            Resource::new(key, c[1..].to_vec())
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let (a, b) = data.split_at(data.len() / 2);
    let (newer, older) = (container(a), container(b));
    let union: HashSet<_> = newer.keys().chain(older.keys()).copied().collect();
    for strategy in Strategy::ALL {
        let (merged, result) = MergeEngine::new().merge(&newer, &older, strategy);
        assert_eq!(merged.len(), union.len());
        assert_eq!(result.from_newer + result.from_older, result.total);
    }
});
