//! # qmove-core
//!
//! Core library for moving every message from one AWS SQS queue to another.
//!
//! A [`WorkerPool`] runs a number of independent [`Drainer`]s against the same
//! source and destination. Each drainer receives a batch, moves every message
//! in it concurrently (send to the destination, then delete from the source),
//! and stops once it has seen two empty receives in a row.
//!
//! ## Features
//!
//! - **Batch fan-out**: one task per received message, joined before the next receive
//! - **Partial failure tolerance**: a failed send or delete never aborts the batch
//! - **FIFO aware**: deduplication and group ids are passed on as send parameters
//! - **Pluggable queues**: anything implementing [`QueueService`]; SQS and in-memory included
//!
//! ## Example
//!
//! ```no_run
//! use qmove::{ReceiveRequest, SqsQueue, WorkerPool};
//! use std::num::NonZeroUsize;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = aws_config::from_env().load().await;
//!
//! let pool = WorkerPool::new(
//!     NonZeroUsize::new(2).unwrap(),
//!     ReceiveRequest::new("https://sqs.us-east-1.amazonaws.com/123456789/my-dlq"),
//!     "https://sqs.us-east-1.amazonaws.com/123456789/my-queue",
//! );
//!
//! let report = pool
//!     .run(|_| (SqsQueue::from_config(&config), SqsQueue::from_config(&config)))
//!     .await?;
//! println!("{} messages moved", report.totals.delivered);
//! # Ok(())
//! # }
//! ```

mod drainer;
pub mod memory;
mod message;
mod pool;
mod queue;
mod sqs;
mod transfer;

#[cfg(test)]
mod test_utils;

pub use drainer::*;
pub use message::*;
pub use pool::*;
pub use queue::*;
pub use sqs::*;
pub use transfer::*;
