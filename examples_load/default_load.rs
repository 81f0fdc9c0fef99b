use std::time::Instant;
use tracing::error;

use tracing_retention_buffer::init::init_tracing;
use tracing_retention_buffer::RecordQuery;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let buffer = init_tracing()?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: recorded {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let start = Instant::now();
    let matches = buffer.find(&RecordQuery::new("load test"))?;
    println!("query over {} records matched {} in {:?}", buffer.len(), matches.len(), start.elapsed());
    Ok(())
}
