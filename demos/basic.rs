//! Basic usage example for Yunyun
//!
//! This example demonstrates the fundamental operations:
//! - Storing small values in the block store
//! - Streaming data through a node handle
//! - Keeping typed values on a shelf

use std::io::SeekFrom;

use yunyun::{MultiblockStore, Options, Shelf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    // Configure store geometry
    let options = Options::default().block_size(512).index_size(4096);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("example.yun");

    let nodes = MultiblockStore::open(&path, options.clone())?;
    println!("Store opened at {}", path.display());

    // Values of at most one block go straight into the block store
    println!("Writing values...");
    let store = nodes.store();
    store.write_value(b"key1", b"value1")?;
    store.write_value(b"key2", b"value2")?;
    println!("key1 => {:?}", String::from_utf8_lossy(&store.read_value(b"key1")?));

    store.discard_value(b"key2")?;
    println!("key2 exists after discard: {}", store.exists(b"key2")?);

    // Larger data goes into a node
    println!("Writing a node...");
    nodes.create_node(b"log")?;
    {
        let mut handle = nodes.open_handle(b"log")?;
        for line in 0..100 {
            handle.write(format!("line {}\n", line).as_bytes())?;
        }
        println!("node length: {} bytes", handle.length()?);

        handle.seek(SeekFrom::Start(0))?;
        let head = handle.read(Some(14))?;
        println!("first lines: {:?}", String::from_utf8_lossy(&head));

        handle.truncate(Some(7))?;
        println!("after truncate: {} bytes", handle.length()?);
    }
    nodes.remove_node(b"log")?;

    let stats = nodes.store().stats()?;
    println!(
        "segments: {}, occupied cells: {}/{}, file: {} bytes",
        stats.segments, stats.occupied_cells, stats.cells, stats.file_len
    );
    drop(nodes);

    // Typed values of any size
    let shelf = Shelf::open(&path, options)?;
    shelf.set(b"primes", &vec![2u32, 3, 5, 7, 11, 13])?;
    println!("primes => {:?}", shelf.get::<Vec<u32>>(b"primes")?);

    Ok(())
}
