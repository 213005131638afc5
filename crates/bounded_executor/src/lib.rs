//! Bounded executor - run a batch of async jobs, at most N at a time
//!
//! # Overview
//!
//! An [`Executor`] owns an ordered batch of [`Task`]s and a concurrency limit:
//! - Each task wraps a zero-argument async function (or a [`Producer`])
//! - At most `limit` tasks are in flight; when one finishes, the first task
//!   that has not been started yet takes its place
//! - A failing task is recorded and never stops the rest of the batch
//! - Results come back in submission order, whatever order tasks finish in
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use bounded_executor::{Executor, TaskStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut executor = Executor::<String, String>::new(3)?;
//!
//!     for i in 0..10u64 {
//!         executor.submit(move || async move {
//!             tokio::time::sleep(Duration::from_millis(10 * (10 - i))).await;
//!             if i == 4 {
//!                 return Err(format!("job {} failed", i));
//!             }
//!             Ok(format!("result #{}", i))
//!         })?;
//!     }
//!
//!     let stats = executor.run().await?;
//!     assert_eq!(stats.failed_tasks, 1);
//!
//!     let results = executor.collect_results();
//!     assert_eq!(results.len(), 9);
//!     assert_eq!(results[0], "result #0");
//!     assert_eq!(executor.statuses()[4], TaskStatus::Errored);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod executor;
pub mod reporter;
pub mod task;
pub mod types;

pub use error::{ConfigError, ExecutorError, ExecutorResult, TaskError};
pub use executor::Executor;
pub use reporter::{
    ExecutionReporter, MultiReporter, NoOpReporter, TaskExecutionEvent, TracingReporter,
};
pub use task::{Producer, Task, TaskId, TaskState, TaskStatus};
pub use types::{ExecutionStats, ExecutorConfig};

use std::future::Future;
use std::pin::Pin;

/// A boxed future that is Send and can be used across thread boundaries
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// Re-export async_trait for implementing `Producer`
pub use async_trait::async_trait;
