// Multiblock Tests for Yunyun
// These tests verify node lifecycle, random-access writes and truncation

use std::io::SeekFrom;

use proptest::prelude::*;
use tempfile::TempDir;
use yunyun::{Error, MultiblockStore, Options, Shelf};

fn open_nodes(dir: &TempDir, block_size: usize) -> MultiblockStore {
    MultiblockStore::open(dir.path().join("nodes.yun"), Options::default().block_size(block_size))
        .unwrap()
}

/// Test the documented end-to-end scenario
#[test]
fn test_e2e_node_scenario() {
    let dir = TempDir::new().unwrap();
    let nodes = MultiblockStore::open(dir.path().join("nodes.yun"), Options::default()).unwrap();

    nodes.create_node(b"file1").unwrap();
    {
        let mut handle = nodes.open_handle(b"file1").unwrap();
        assert_eq!(handle.write(b"hello").unwrap(), 5);
        assert_eq!(handle.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(handle.read(Some(5)).unwrap(), b"hello");
        handle.truncate(Some(2)).unwrap();
        assert_eq!(handle.length().unwrap(), 2);
    }
    nodes.remove_node(b"file1").unwrap();
    assert!(!nodes.node_exists(b"file1").unwrap());
}

/// Test node lifecycle errors
#[test]
fn test_node_lifecycle_errors() {
    let dir = TempDir::new().unwrap();
    let nodes = open_nodes(&dir, 64);

    assert!(matches!(nodes.open_handle(b"n"), Err(Error::NodeDoesNotExist(_))));
    assert!(matches!(nodes.remove_node(b"n"), Err(Error::NodeDoesNotExist(_))));

    nodes.create_node(b"n").unwrap();
    assert!(matches!(nodes.create_node(b"n"), Err(Error::NodeExists(_))));

    nodes.remove_node(b"n").unwrap();
    nodes.create_node(b"n").unwrap();
    assert_eq!(nodes.open_handle(b"n").unwrap().length().unwrap(), 0);
}

/// Test a node larger than many blocks round-trips
#[test]
fn test_large_node_round_trip() {
    let dir = TempDir::new().unwrap();
    let nodes = open_nodes(&dir, 256);
    nodes.create_node(b"big").unwrap();

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 256) as u8).collect();
    let mut handle = nodes.open_handle(b"big").unwrap();
    handle.write(&payload).unwrap();

    handle.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(handle.read(None).unwrap(), payload);

    handle.seek(SeekFrom::Start(1234)).unwrap();
    assert_eq!(handle.read(Some(2000)).unwrap(), &payload[1234..3234]);
}

/// Test several nodes stay independent
#[test]
fn test_nodes_are_independent() {
    let dir = TempDir::new().unwrap();
    let nodes = open_nodes(&dir, 64);

    for name in ["a", "b", "c"] {
        nodes.create_node(name.as_bytes()).unwrap();
        let mut handle = nodes.open_handle(name.as_bytes()).unwrap();
        handle.write(name.repeat(150).as_bytes()).unwrap();
    }

    nodes.remove_node(b"b").unwrap();

    for name in ["a", "c"] {
        let mut handle = nodes.open_handle(name.as_bytes()).unwrap();
        assert_eq!(handle.read(None).unwrap(), name.repeat(150).as_bytes());
    }
}

/// Test removed node blocks are reused by the next node
#[test]
fn test_removed_node_space_is_reused() {
    let dir = TempDir::new().unwrap();
    let nodes = open_nodes(&dir, 64);

    nodes.create_node(b"first").unwrap();
    nodes.open_handle(b"first").unwrap().write(&[1u8; 640]).unwrap();
    let len = std::fs::metadata(nodes.store().path()).unwrap().len();

    nodes.remove_node(b"first").unwrap();
    nodes.create_node(b"second").unwrap();
    nodes.open_handle(b"second").unwrap().write(&[2u8; 640]).unwrap();

    assert_eq!(std::fs::metadata(nodes.store().path()).unwrap().len(), len);
}

/// Test truncate growth zero-fills and shrink discards blocks
#[test]
fn test_truncate_semantics() {
    let dir = TempDir::new().unwrap();
    let nodes = open_nodes(&dir, 64);
    nodes.create_node(b"t").unwrap();

    let mut handle = nodes.open_handle(b"t").unwrap();
    handle.write(&[0xFF; 200]).unwrap();
    let occupied = nodes.store().stats().unwrap().occupied_cells;
    assert_eq!(occupied, 1 + 4);

    handle.truncate(Some(70)).unwrap();
    assert_eq!(handle.length().unwrap(), 70);
    assert_eq!(nodes.store().stats().unwrap().occupied_cells, 1 + 2);

    handle.truncate(Some(300)).unwrap();
    assert_eq!(handle.length().unwrap(), 300);

    handle.seek(SeekFrom::Start(0)).unwrap();
    let data = handle.read(None).unwrap();
    assert_eq!(data.len(), 300);
    assert!(data[..70].iter().all(|&b| b == 0xFF));
    assert!(data[70..].iter().all(|&b| b == 0));
}

/// Test nodes persist across reopen
#[test]
fn test_node_persistence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodes.yun");

    {
        let nodes = MultiblockStore::open(&path, Options::default().block_size(128)).unwrap();
        nodes.create_node(b"doc").unwrap();
        let mut handle = nodes.open_handle(b"doc").unwrap();
        handle.seek(SeekFrom::Start(500)).unwrap();
        handle.write(b"persisted").unwrap();
    }

    let nodes = MultiblockStore::open(&path, Options::default()).unwrap();
    let mut handle = nodes.open_handle(b"doc").unwrap();
    assert_eq!(handle.length().unwrap(), 509);
    handle.seek(SeekFrom::Start(500)).unwrap();
    assert_eq!(handle.read(None).unwrap(), b"persisted");
}

/// Test the shelf persists typed values across reopen
#[test]
fn test_shelf_persistence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shelf.yun");

    {
        let shelf = Shelf::open(&path, Options::default().block_size(64)).unwrap();
        shelf.set(b"numbers", &(0..500u32).collect::<Vec<_>>()).unwrap();
        shelf.set(b"name", "yunyun").unwrap();
    }

    let shelf = Shelf::open(&path, Options::default()).unwrap();
    assert_eq!(shelf.get::<Vec<u32>>(b"numbers").unwrap(), Some((0..500u32).collect::<Vec<_>>()));
    assert_eq!(shelf.get::<String>(b"name").unwrap(), Some("yunyun".to_string()));
}

#[derive(Debug, Clone)]
enum Op {
    Write { offset: u64, data: Vec<u8> },
    Truncate { size: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u64..300, prop::collection::vec(any::<u8>(), 1..120))
            .prop_map(|(offset, data)| Op::Write { offset, data }),
        1 => (0u64..400).prop_map(|size| Op::Truncate { size }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Random writes and truncations match an in-memory model
    #[test]
    fn prop_node_matches_model(ops in prop::collection::vec(op_strategy(), 1..12)) {
        let dir = TempDir::new().unwrap();
        let nodes = open_nodes(&dir, 48);
        nodes.create_node(b"model").unwrap();
        let mut handle = nodes.open_handle(b"model").unwrap();
        let mut model: Vec<u8> = Vec::new();

        for op in ops {
            match op {
                Op::Write { offset, data } => {
                    let end = offset as usize + data.len();
                    if model.len() < end {
                        model.resize(end, 0);
                    }
                    model[offset as usize..end].copy_from_slice(&data);

                    handle.seek(SeekFrom::Start(offset)).unwrap();
                    prop_assert_eq!(handle.write(&data).unwrap(), data.len());
                    prop_assert_eq!(handle.tell(), end as u64);
                }
                Op::Truncate { size } => {
                    model.resize(size as usize, 0);
                    handle.truncate(Some(size)).unwrap();
                }
            }

            prop_assert_eq!(handle.length().unwrap(), model.len() as u64);
        }

        handle.seek(SeekFrom::Start(0)).unwrap();
        prop_assert_eq!(handle.read(None).unwrap(), model);
    }
}
