use std::sync::Arc;

use silo::buffer::BufferPool;
use silo::common::{BufferPoolConfig, ReplacerPolicy, DEFAULT_LRUK_K};
use silo::index::{DefaultHashFunction, ExtendibleHashTable, IntegerComparator};
use silo::storage::disk::DiskManager;
use silo::{PageId, RecordId, SlotId};

const NUM_KEYS: i32 = 5000;

fn main() -> silo::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Silo - buffer pool and extendible hash index");
    println!("============================================\n");

    let db_path = std::env::temp_dir().join(format!("silo-demo-{}.db", std::process::id()));
    let disk_manager = Arc::new(DiskManager::new(&db_path)?);
    println!("Created disk manager for: {}", db_path.display());

    let config = BufferPoolConfig {
        pool_size: 16,
        num_instances: 4,
        replacer: ReplacerPolicy::LruK(DEFAULT_LRUK_K),
    };
    let bpm = config.build(Arc::clone(&disk_manager));
    println!(
        "Created buffer pool: {} instances x {} frames\n",
        config.num_instances, config.pool_size
    );

    let index: ExtendibleHashTable<i32, RecordId, _, _> =
        ExtendibleHashTable::new("demo_pk", Arc::clone(&bpm), IntegerComparator, DefaultHashFunction)?;

    for key in 0..NUM_KEYS {
        let rid = RecordId::new(PageId::new(key as u32 / 64), SlotId::new((key % 64) as u16));
        index.insert(&key, &rid)?;
    }
    println!(
        "Inserted {} keys: global depth {}, {} buckets",
        NUM_KEYS,
        index.global_depth(),
        index.num_buckets()
    );

    for key in [0, 1234, NUM_KEYS - 1] {
        println!("  - lookup {} -> {:?}", key, index.get_value(&key)?);
    }

    for key in 0..NUM_KEYS {
        if key % 10 != 0 {
            let rid = RecordId::new(PageId::new(key as u32 / 64), SlotId::new((key % 64) as u16));
            index.remove(&key, &rid)?;
        }
    }
    println!(
        "\nRemoved 90% of keys: global depth {}, {} buckets",
        index.global_depth(),
        index.num_buckets()
    );

    index.verify_integrity()?;
    println!("Directory integrity verified");
    index.log_directory()?;

    drop(index);
    bpm.flush_all_pages()?;
    println!(
        "\nDisk I/O: {} reads, {} writes, file spans {} pages",
        disk_manager.num_reads(),
        disk_manager.num_writes(),
        disk_manager.num_pages()
    );

    drop(bpm);
    drop(disk_manager);
    std::fs::remove_file(&db_path).ok();
    println!("\nDemo completed successfully!");
    Ok(())
}
