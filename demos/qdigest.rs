use qdigest::QDigest;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), qdigest::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Two workers observe request latencies, in microseconds.
    let mut fast = QDigest::new(100.0);
    fast.extend((0..10_000u64).map(|i| 200 + (i * 7_919) % 800));
    let mut slow = QDigest::new(100.0);
    slow.extend((0..1_000u64).map(|i| 5_000 + (i * 104_729) % 45_000));

    let digest = QDigest::union_of(&fast, &slow)?;
    let quantiles = digest.quantiles();
    for level in [0.5, 0.9, 0.99, 0.999] {
        println!("p{}: {:?}", level * 100., quantiles.get(level));
    }
    println!(
        "{} values in {} nodes (log capacity {})",
        digest.len(),
        digest.node_count(),
        digest.log_capacity()
    );
    Ok(())
}
