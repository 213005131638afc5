//! Basic usage example for the bounded executor
//!
//! Ten jobs with random delays run at most three at a time. Results come
//! back in submission order even though the jobs finish in random order.

use std::time::Duration;

use bounded_executor::{Executor, ExecutorConfig, TracingReporter};
use rand::Rng;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ExecutorConfig::new()
        .with_max_concurrent_tasks(3)?
        .with_batch_name("basic-usage");
    let mut executor =
        Executor::<String, String>::with_config(config)?.with_reporter(TracingReporter::new());

    let mut rng = rand::thread_rng();
    for i in 0..10 {
        let delay = Duration::from_millis(rng.gen_range(0..4_000));
        executor.submit(move || async move {
            println!("running #{i}");
            tokio::time::sleep(delay).await;
            Ok(format!("Result # {i}"))
        })?;
    }

    let stats = executor.run().await?;

    println!("\nExecution completed in {:?}", stats.total_duration);
    println!("Peak concurrency: {}", stats.peak_concurrent_tasks);
    for result in executor.collect_results() {
        println!("{result}");
    }

    Ok(())
}
