use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use tracing_retention_buffer::{RetentionBuffer, RetentionOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let buffer = RetentionBuffer::start(RetentionOptions::with_lifetime(Duration::from_secs(10)))?;
    let (tx, rx) = watch::channel(buffer.options());
    let _watcher = buffer.watch_options(rx);

    let logger = buffer.logger("reconfigure");
    {
        let _tenant = logger.begin_scope(("tenant", "acme"));
        logger.warn("quota almost exhausted");
    }

    sleep(Duration::from_secs(1)).await;
    println!("after 1s with a 10s lifetime: {} record(s)", buffer.len());

    tx.send(RetentionOptions::with_lifetime(Duration::from_millis(500)))?;
    sleep(Duration::from_millis(1_200)).await;
    println!("after switching to 500ms: {} record(s)", buffer.len());

    logger.info("fresh record");
    for export in buffer.export_recent(10) {
        println!("{}", serde_json::to_string(&export)?);
    }

    buffer.shutdown();
    Ok(())
}
