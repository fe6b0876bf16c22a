#![no_main]
use dbpf_merge::dbpf::Container;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Loading must never panic, only return errors or warnings.
    let _ = Container::load(data);

    // Same bytes behind a valid magic, so the index path is reached.
    if data.len() >= 96 {
        let mut patched = data.to_vec();
        patched[..4].copy_from_slice(b"DBPF");
        if let Ok(c) = Container::load(&patched) {
            // Whatever was recovered must survive a save/load cycle.
            let bytes = c.to_bytes().expect("save of loaded container");
            let again = Container::load(&bytes).expect("reload of saved container");
            assert_eq!(again.len(), c.len());
        }
    }
});
