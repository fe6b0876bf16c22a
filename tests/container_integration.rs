use dbpf_merge::compress::{deflate, refpack};
use dbpf_merge::dbpf::index::COMPRESSED_BIT;
use dbpf_merge::dbpf::{
    Container, HEADER_SIZE, Header, IndexLayout, LoadWarning, Resource, ResourceKey, SaveOptions,
    types,
};

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn set_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// Version-2 header with the index size stored only in the alternate field,
/// as the game itself writes it.
#[test]
fn alternate_index_size_field() {
    let payload = b"lot payload";
    let key = ResourceKey::new(types::LOT, 0, 42);

    let mut stream = vec![0u8; HEADER_SIZE];
    stream[..4].copy_from_slice(b"DBPF");
    set_u32(&mut stream, 4, 2);
    set_u32(&mut stream, 8, 1);
    stream.extend_from_slice(payload);

    let index_offset = stream.len() as u32;
    let mut index = Vec::new();
    put_u32(&mut index, 0);
    for w in [
        key.type_id,
        key.group_id,
        key.instance_high(),
        key.instance_low(),
        HEADER_SIZE as u32,
        payload.len() as u32,
        payload.len() as u32,
    ] {
        put_u32(&mut index, w);
    }
    stream.extend_from_slice(&index);

    set_u32(&mut stream, 36, 1);
    set_u32(&mut stream, 64, index_offset);
    set_u32(&mut stream, 68, 0);
    set_u32(&mut stream, 44, index.len() as u32);

    let header = Header::parse(&stream).unwrap();
    assert_eq!(header.index_size, index.len() as u32);

    let c = Container::load(&stream).unwrap();
    assert_eq!(c.get(&key).unwrap().data(), payload);
    assert!(c.warnings().is_empty());
}

/// Version-1 container with the fixed 32-byte index layout and a mix of
/// compressed payloads.
#[test]
fn version1_fixed_index_with_codecs() {
    let text: Vec<u8> = b"household relationship situation ".repeat(40);
    let zlib = deflate::compress(&text, 9).unwrap();
    let qfs = refpack::compress(&text);
    let raw = b"raw sim info".to_vec();

    let entries = [
        (ResourceKey::new(types::HOUSEHOLD, 1, 1), zlib, true),
        (ResourceKey::new(types::RELATIONSHIP_DATA, 1, 2), qfs, true),
        (ResourceKey::new(types::SIM_INFO, 1, 3), raw.clone(), false),
    ];

    let mut stream = vec![0u8; HEADER_SIZE];
    stream[..4].copy_from_slice(b"DBPF");
    set_u32(&mut stream, 4, 1);
    let mut index = Vec::new();
    for (key, stored, compressed) in &entries {
        let offset = stream.len() as u32;
        stream.extend_from_slice(stored);
        let mem = (if *compressed { text.len() } else { stored.len() }) as u32;
        let size = stored.len() as u32 | if *compressed { COMPRESSED_BIT } else { 0 };
        for w in [
            key.type_id,
            key.group_id,
            key.instance_high(),
            key.instance_low(),
            offset,
            size,
            mem,
            stored.len() as u32,
        ] {
            put_u32(&mut index, w);
        }
    }
    let index_offset = stream.len() as u32;
    stream.extend_from_slice(&index);
    set_u32(&mut stream, 36, entries.len() as u32);
    set_u32(&mut stream, 40, index_offset);
    set_u32(&mut stream, 44, index.len() as u32);

    let c = Container::load(&stream).unwrap();
    assert_eq!(c.header().major_version, 1);
    assert_eq!(c.layout(), IndexLayout::Fixed);
    assert_eq!(c.len(), 3);
    assert_eq!(c.get(&entries[0].0).unwrap().data(), &text[..]);
    assert_eq!(c.get(&entries[1].0).unwrap().data(), &text[..]);
    assert_eq!(c.get(&entries[2].0).unwrap().data(), &raw[..]);

    // Saving normalizes to version 2 with a flagged index.
    let resaved = Container::load(&c.to_bytes().unwrap()).unwrap();
    assert_eq!(resaved.header().major_version, 2);
    assert_eq!(resaved.layout(), IndexLayout::Flagged);
    for r in c.resources() {
        assert_eq!(resaved.get(&r.key).unwrap().data(), r.data());
    }
}

/// A RefPack payload cut short decodes to what it can and the load goes on.
#[test]
fn truncated_refpack_payload_is_recovered() {
    let text: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
    let mut qfs = refpack::compress(&text);
    qfs.truncate(qfs.len() / 2);

    let key = ResourceKey::new(types::OBJECT_DATA, 0, 1);
    let mut stream = Header::default().serialize().to_vec();
    stream.extend_from_slice(&qfs);
    let mut index = Vec::new();
    put_u32(&mut index, 0);
    for w in [
        key.type_id,
        0,
        0,
        1,
        HEADER_SIZE as u32,
        qfs.len() as u32 | COMPRESSED_BIT,
        text.len() as u32,
        qfs.len() as u32,
    ] {
        put_u32(&mut index, w);
    }
    let index_offset = stream.len() as u32;
    stream.extend_from_slice(&index);
    Header::patch_index(&mut stream, 1, index_offset, index.len() as u32);

    let c = Container::load(&stream).unwrap();
    let data = c.get(&key).unwrap().data();
    assert!(data.len() < text.len());
    assert_eq!(data, &text[..data.len()]);
    assert!(
        c.warnings()
            .iter()
            .any(|w| matches!(w, LoadWarning::SizeMismatch { .. }))
    );
}

#[test]
fn save_to_disk_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Slot_00000001.save");

    let c: Container = (0..50u64)
        .map(|i| {
            Resource::new(
                ResourceKey::new(types::ZONE, (i % 3) as u32, i << 33 | i),
                vec![(i % 7) as u8; (i * 13) as usize],
            )
        })
        .collect();
    c.save(&path).unwrap();
    let loaded = Container::load_path(&path).unwrap();
    assert_eq!(loaded.len(), 50);
    let keys: Vec<_> = loaded.keys().copied().collect();
    let expected: Vec<_> = c.keys().copied().collect();
    assert_eq!(keys, expected);

    let wrapped = dir.path().join("wrapped.save");
    c.save_with(
        &wrapped,
        &SaveOptions {
            outer_deflate: true,
        },
    )
    .unwrap();
    assert!(std::fs::metadata(&wrapped).unwrap().len() < std::fs::metadata(&path).unwrap().len());
    assert_eq!(Container::load_path(&wrapped).unwrap().len(), 50);
}
