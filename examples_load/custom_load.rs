use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{error, info_span};

use tracing_retention_buffer::init::{init_tracing_with_config, LayerConfig};
use tracing_retention_buffer::RetentionOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let layer_config = LayerConfig {
        options: RetentionOptions::with_lifetime(Duration::from_millis(500)),
        enable_stdout: false,
    };

    let buffer = init_tracing_with_config(layer_config)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        let span = info_span!("batch", batch = i / 1_000);
        let _entered = span.enter();
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: recorded {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Two cycles are enough for everything above to age out.
    sleep(Duration::from_millis(1_200)).await;
    println!("retained after eviction: {}", buffer.len());
    Ok(())
}
