//! Basic example of sharded call coalescing.

use shardflight::{Group, HashFunc, ShardedGroup, ShardingConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("shardflight=debug,info")
        .init();

    let config = ShardingConfig::default().with_hash_func(HashFunc::FNV64A);
    let group: Arc<ShardedGroup<Group<String, String>>> = Arc::new(ShardedGroup::new(config)?);

    println!("Shard count: {}", group.shard_count());
    println!("Hash: {}", group.router().hash_func());

    // Ten concurrent lookups of one hot key share a single backend fetch
    println!("\n--- Coalesced Lookups ---");
    let fetches = Arc::new(AtomicUsize::new(0));
    let mut receivers = Vec::new();
    for _ in 0..10 {
        let fetches = Arc::clone(&fetches);
        receivers.push(group.call_chan(b"user:123", move || {
            fetches.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            Ok("Alice".to_string())
        }));
    }

    for rx in receivers {
        let (result, shared) = rx.await?.into_parts();
        println!("Got {:?} (shared: {})", result, shared);
    }
    println!("Backend fetches: {}", fetches.load(Ordering::SeqCst));

    // Key placement
    println!("\n--- Routing ---");
    for key in ["user:123", "user:456", "order:789"] {
        println!("{} -> shard {}", key, group.shard_for_key(key.as_bytes()));
    }

    let stats = group.stats();
    println!("\nStats:");
    println!("  Executions: {}", stats.executions);
    println!("  Coalesced: {}", stats.coalesced);
    println!("  Coalescing ratio: {:.2}", stats.coalescing_ratio());

    Ok(())
}
