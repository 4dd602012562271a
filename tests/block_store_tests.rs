// Block Store Tests for Yunyun
// These tests verify value round-trips, slot reuse, index growth and persistence

use yunyun::store::format::{IndexCell, IndexHeader};
use yunyun::{BlockStore, Error, Options};
use tempfile::TempDir;

fn file_len(store: &BlockStore) -> u64 {
    std::fs::metadata(store.path()).unwrap().len()
}

/// Test write then read for a spread of keys and value sizes
#[test]
fn test_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = BlockStore::open(dir.path().join("data.yun"), Options::default()).unwrap();

    let cases: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"empty".to_vec(), Vec::new()),
        (b"small".to_vec(), b"value".to_vec()),
        (vec![0u8, 255, 7], vec![0xAB; 1000]),
        (b"full".to_vec(), vec![0x5A; 4096]),
        (Vec::new(), b"empty key".to_vec()),
    ];

    for (key, value) in &cases {
        store.write_value(key, value).unwrap();
    }
    for (key, value) in &cases {
        assert_eq!(&store.read_value(key).unwrap(), value);
        assert!(store.exists(key).unwrap());
    }
}

/// Test overwriting an existing key updates its length in place
#[test]
fn test_overwrite_existing_key() {
    let dir = TempDir::new().unwrap();
    let store = BlockStore::open(dir.path().join("data.yun"), Options::default()).unwrap();

    store.write_value(b"key", b"a much longer first value").unwrap();
    let len = file_len(&store);
    let offset = store.find_key(b"key").unwrap();

    store.write_value(b"key", b"short").unwrap();
    assert_eq!(store.read_value(b"key").unwrap(), b"short");
    assert_eq!(store.find_key(b"key").unwrap(), offset);
    assert_eq!(file_len(&store), len);
    assert_eq!(store.stats().unwrap().occupied_cells, 1);
}

/// Test discard hides the key and a second discard fails
#[test]
fn test_discard_removes_visibility() {
    let dir = TempDir::new().unwrap();
    let store = BlockStore::open(dir.path().join("data.yun"), Options::default()).unwrap();

    store.write_value(b"gone", b"soon").unwrap();
    store.discard_value(b"gone").unwrap();

    assert!(!store.exists(b"gone").unwrap());
    assert!(matches!(store.read_value(b"gone"), Err(Error::KeyNotFound(_))));
    assert!(matches!(store.discard_value(b"gone"), Err(Error::KeyNotFound(_))));
}

/// Test missing keys report the hex-encoded key
#[test]
fn test_key_not_found_carries_hex_key() {
    let dir = TempDir::new().unwrap();
    let store = BlockStore::open(dir.path().join("data.yun"), Options::default()).unwrap();

    match store.read_value(b"\x01\x02") {
        Err(Error::KeyNotFound(key)) => assert_eq!(key, "0102"),
        other => panic!("unexpected result: {:?}", other),
    }
}

/// Test a discarded slot is reused without growing the file
#[test]
fn test_slot_reuse_does_not_grow_file() {
    let dir = TempDir::new().unwrap();
    let store = BlockStore::open(dir.path().join("data.yun"), Options::default().block_size(128))
        .unwrap();

    store.write_value(b"k1", &[1u8; 100]).unwrap();
    let offset = store.find_key(b"k1").unwrap();
    store.discard_value(b"k1").unwrap();
    let len = file_len(&store);

    store.write_value(b"k2", &[2u8; 128]).unwrap();
    assert_eq!(file_len(&store), len);
    assert_eq!(store.find_key(b"k2").unwrap(), offset);
    assert_eq!(store.read_value(b"k2").unwrap(), vec![2u8; 128]);
}

/// Test oversized values are rejected without side effects
#[test]
fn test_oversized_write_rejected() {
    let dir = TempDir::new().unwrap();
    let store = BlockStore::open(dir.path().join("data.yun"), Options::default().block_size(16))
        .unwrap();
    let len = file_len(&store);

    let result = store.write_value(b"big", &[0u8; 17]);
    match result {
        Err(Error::ValueTooLarge { size, block_size, .. }) => {
            assert_eq!(size, 17);
            assert_eq!(block_size, 16);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(!store.exists(b"big").unwrap());
    assert_eq!(file_len(&store), len);
    assert_eq!(store.stats().unwrap().occupied_cells, 0);
}

/// Test that index growth adds exactly the needed segments
#[test]
fn test_index_growth() {
    let dir = TempDir::new().unwrap();
    let cells_per_segment = 4;
    let options = Options::default().index_size(cells_per_segment * IndexCell::SIZE).block_size(32);
    let store = BlockStore::open(dir.path().join("data.yun"), options).unwrap();
    assert_eq!(store.cells_per_segment(), cells_per_segment);

    let count = 4 * cells_per_segment + 1;
    for i in 0..count {
        store.write_value(format!("key{}", i).as_bytes(), format!("v{}", i).as_bytes()).unwrap();
    }

    let segments = store.list_segments().unwrap();
    assert_eq!(segments.len(), count.div_ceil(cells_per_segment));
    for window in segments.windows(2) {
        assert!(window[0].1.has_continuation);
        assert_eq!(window[0].1.continuation_offset as u64, window[1].0);
    }
    assert!(!segments.last().unwrap().1.has_continuation);

    for i in 0..count {
        assert_eq!(
            store.read_value(format!("key{}", i).as_bytes()).unwrap(),
            format!("v{}", i).as_bytes()
        );
    }
}

/// Test discarded cells are filled before the index grows
#[test]
fn test_free_cells_reused_before_growth() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().index_size(2 * IndexCell::SIZE).block_size(32);
    let store = BlockStore::open(dir.path().join("data.yun"), options).unwrap();

    store.write_value(b"a", b"1").unwrap();
    store.write_value(b"b", b"2").unwrap();
    store.discard_value(b"a").unwrap();
    store.write_value(b"c", b"3").unwrap();

    assert_eq!(store.list_segments().unwrap().len(), 1);
    assert_eq!(store.read_value(b"b").unwrap(), b"2");
    assert_eq!(store.read_value(b"c").unwrap(), b"3");
}

/// Test data and geometry survive reopening
#[test]
fn test_persistence_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.yun");
    let options = Options::default().index_size(3 * IndexCell::SIZE).block_size(100);

    {
        let store = BlockStore::open(&path, options).unwrap();
        for i in 0..10 {
            store.write_value(format!("key{}", i).as_bytes(), &[i as u8; 50]).unwrap();
        }
        store.discard_value(b"key3").unwrap();
        store.sync().unwrap();
    }

    let store = BlockStore::open(&path, Options::default()).unwrap();
    assert_eq!(store.block_size(), 100);
    assert_eq!(store.cells_per_segment(), 3);

    for i in 0..10 {
        let key = format!("key{}", i);
        if i == 3 {
            assert!(!store.exists(key.as_bytes()).unwrap());
        } else {
            assert_eq!(store.read_value(key.as_bytes()).unwrap(), vec![i as u8; 50]);
        }
    }

    // Reopening must not rewrite the first segment
    let raw = std::fs::read(&path).unwrap();
    let header = IndexHeader::decode(&raw[..IndexHeader::SIZE]).unwrap();
    assert!(header.has_continuation);
    assert_eq!(header.block_size, 100);
}

/// Test an empty existing file is initialised like a new one
#[test]
fn test_open_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.yun");
    std::fs::File::create(&path).unwrap();

    let store = BlockStore::open(&path, Options::default().block_size(256)).unwrap();
    assert_eq!(store.block_size(), 256);
    assert_eq!(store.list_segments().unwrap().len(), 1);
}

/// Test zero-filled allocation writes real zeros on disk
#[test]
fn test_hard_allocation_zero_fills() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().block_size(64).hard_allocate(true);
    let store = BlockStore::open(dir.path().join("data.yun"), options).unwrap();

    let before = file_len(&store);
    store.write_value(b"k", b"abc").unwrap();

    let raw = std::fs::read(store.path()).unwrap();
    assert_eq!(raw.len() as u64, before + 64);
    assert_eq!(&raw[before as usize..before as usize + 3], b"abc");
    assert!(raw[before as usize + 3..].iter().all(|&b| b == 0));
}

/// Test the lock can group several operations
#[test]
fn test_grouped_operations_under_lock() {
    let dir = TempDir::new().unwrap();
    let store = BlockStore::open(dir.path().join("data.yun"), Options::default()).unwrap();

    {
        let _guard = store.lock().unwrap();
        store.write_value(b"a", b"1").unwrap();
        store.write_value(b"b", b"2").unwrap();
        store.discard_value(b"a").unwrap();
    }

    assert!(!store.exists(b"a").unwrap());
    assert_eq!(store.read_value(b"b").unwrap(), b"2");
}
