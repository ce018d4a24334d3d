use std::env;
use std::time::Duration;

use anyhow::Result;
use chunked_blob::{BlobProvider, Config, FjallChunkStore};
use tracing_subscriber::EnvFilter;

use crate::stresstest::perform_stresstest;
use crate::workload::Workload;

mod stresstest;
mod workload;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // an optional database path, a temporary one otherwise
    let store = match env::args().nth(1) {
        Some(path) => FjallChunkStore::open(path)?,
        None => FjallChunkStore::temporary()?,
    };
    let provider = BlobProvider::new(store).with_config(Config::from_env());

    let workloads = vec![
        Workload::builder("mostly writes")
            .concurrency(32)
            .size_distribution(16 * 1024, 1024 * 1024) // p50 = 16K, p99 = 1M
            .action_weights(49, 49, 2, 0)
            .build()?,
        Workload::builder("read back")
            .concurrency(8)
            .size_distribution(4 * 1024, 256 * 1024)
            .action_weights(10, 10, 70, 10)
            .build()?,
    ];

    perform_stresstest(provider, workloads, Duration::from_secs(2)).await
}
