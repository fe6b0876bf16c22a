#![no_main]
use dbpf_merge::compress::refpack;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The decoder never fails: arbitrary input yields a partial buffer.
    let out = refpack::decompress(data, 1 << 20);
    assert!(out.len() <= 1 << 20);
    let _ = refpack::decompress(data, 0);

    // Encoder output must decode back exactly.
    let packed = refpack::compress(data);
    assert_eq!(refpack::decompress(&packed, data.len()), data);
});
