//! Runs several independent drainers against one source and destination.

use crate::drainer::{DrainError, DrainReport, Drainer};
use crate::message::ReceiveRequest;
use crate::queue::QueueService;
use crate::transfer::{BatchSummary, Route};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::JoinSet;

/// What the drainers of one pool run accomplished.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolReport {
    /// Ordered by worker id
    pub workers: Vec<DrainReport>,
    pub totals: BatchSummary,
}

impl PoolReport {
    fn push(&mut self, report: DrainReport) {
        self.totals.merge(report.outcomes);
        self.workers.push(report);
    }
}

#[derive(Debug)]
pub enum WorkerFailure {
    Drain(DrainError),
    /// The drainer task panicked or was cancelled
    Aborted { worker: usize, reason: String },
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerFailure::Drain(e) => write!(f, "{}", e),
            WorkerFailure::Aborted { worker, reason } => {
                write!(f, "worker {} aborted: {}", worker, reason)
            }
        }
    }
}

/// At least one drainer failed.
///
/// `partial` holds the reports of every drainer that returned, including the
/// work a failed drainer did before its receive error.
#[derive(Debug)]
pub struct PoolError {
    pub failures: Vec<WorkerFailure>,
    pub partial: PoolReport,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} worker(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for PoolError {}

/// Launches a fixed number of drainers and waits for all of them.
///
/// # Example
///
/// ```no_run
/// use qmove::{ReceiveRequest, SqsQueue, WorkerPool};
/// use std::num::NonZeroUsize;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = aws_config::from_env().load().await;
/// let pool = WorkerPool::new(
///     NonZeroUsize::new(4).unwrap(),
///     ReceiveRequest::new("https://sqs.us-east-1.amazonaws.com/123/source"),
///     "https://sqs.us-east-1.amazonaws.com/123/destination",
/// );
///
/// let report = pool
///     .run(|_worker| (SqsQueue::from_config(&config), SqsQueue::from_config(&config)))
///     .await?;
/// println!("moved {} messages", report.totals.delivered);
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool {
    workers: NonZeroUsize,
    request: Arc<ReceiveRequest>,
    destination_url: Arc<str>,
}

impl WorkerPool {
    pub fn new(
        workers: NonZeroUsize,
        request: ReceiveRequest,
        destination_url: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            workers,
            request: Arc::new(request),
            destination_url: destination_url.into(),
        }
    }

    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    /// Runs the drainers to completion.
    ///
    /// `connect` is called once per worker id (starting at 1) and returns that
    /// worker's own source and destination handles. A failing drainer does not
    /// stop the others; every failure is reported once all have finished.
    /// Dropping the returned future aborts every drainer still running.
    pub async fn run<Q, F>(&self, connect: F) -> Result<PoolReport, PoolError>
    where
        Q: QueueService + 'static,
        F: Fn(usize) -> (Q, Q),
    {
        let mut drainers = JoinSet::new();
        let mut ids = HashMap::new();

        for worker in 1..=self.workers.get() {
            let (source, destination) = connect(worker);
            let route = Route {
                source: Arc::new(source),
                destination: Arc::new(destination),
                request: Arc::clone(&self.request),
                destination_url: Arc::clone(&self.destination_url),
            };
            let handle = drainers.spawn(Drainer::new(worker, route).run());
            ids.insert(handle.id(), worker);
        }

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = drainers.join_next_with_id().await {
            match joined {
                Ok((_, Ok(report))) => reports.push(report),
                Ok((_, Err(e))) => {
                    reports.push(e.report);
                    failures.push(WorkerFailure::Drain(e));
                }
                Err(e) => failures.push(WorkerFailure::Aborted {
                    worker: ids.get(&e.id()).copied().unwrap_or_default(),
                    reason: e.to_string(),
                }),
            }
        }

        reports.sort_by_key(|r| r.worker);
        let mut summary = PoolReport::default();
        for report in reports {
            summary.push(report);
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(PoolError {
                failures,
                partial: summary,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use crate::message::{Message, SendRequest};
    use crate::queue::QueueError;
    use std::collections::BTreeMap;
    use std::time::Duration;

    const SRC: &str = "memory://source";
    const DEST: &str = "memory://destination";

    fn broker_with(messages: usize) -> MemoryBroker {
        let broker = MemoryBroker::new();
        broker.create_queue(SRC);
        broker.create_queue(DEST);
        for i in 0..messages {
            broker.push(SRC, &format!("message {}", i), BTreeMap::new(), None, None);
        }
        broker
    }

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(
            NonZeroUsize::new(workers).unwrap(),
            ReceiveRequest::new(SRC),
            DEST,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn three_workers_drain_twenty_five_messages() {
        let broker = broker_with(25);

        let report = pool(3)
            .run(|_| (broker.clone(), broker.clone()))
            .await
            .unwrap();

        assert_eq!(report.workers.len(), 3);
        assert_eq!(
            report.workers.iter().map(|w| w.worker).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(report.totals.delivered >= 25);
        assert!(broker.sent(DEST).len() >= 25);
        assert_eq!(broker.depth(SRC), 0);
        assert!(report.workers.iter().all(|w| w.receives >= 2));
    }

    #[tokio::test]
    async fn each_worker_gets_its_own_connection() {
        let broker = broker_with(0);
        let connected = std::sync::Mutex::new(Vec::new());

        pool(4)
            .run(|worker| {
                connected.lock().unwrap().push(worker);
                (broker.clone(), broker.clone())
            })
            .await
            .unwrap();

        assert_eq!(*connected.lock().unwrap(), vec![1, 2, 3, 4]);
        // two empty receives per drainer
        assert_eq!(broker.receive_calls(SRC), 8);
    }

    #[tokio::test]
    async fn one_failed_worker_fails_the_pool_after_the_rest_finish() {
        let broker = broker_with(5);
        let unreachable = MemoryBroker::new();

        let err = pool(2)
            .run(|worker| {
                let source = if worker == 2 {
                    unreachable.clone()
                } else {
                    broker.clone()
                };
                (source, broker.clone())
            })
            .await
            .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        match &err.failures[0] {
            WorkerFailure::Drain(e) => {
                assert_eq!(e.worker, 2);
                assert!(matches!(e.source, QueueError::Receive(_)));
            }
            other => panic!("unexpected failure: {}", other),
        }
        assert_eq!(err.partial.totals.delivered, 5);
        assert_eq!(broker.depth(SRC), 0);
        assert!(err.to_string().starts_with("1 worker(s) failed"));
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Empty,
        Stall,
        Panic,
    }

    /// Source that never moves anything; `_live` counts the handles still held.
    #[derive(Clone)]
    struct Scripted {
        behaviour: Behaviour,
        _live: Arc<()>,
    }

    #[async_trait::async_trait]
    impl QueueService for Scripted {
        async fn receive_batch(&self, _: &ReceiveRequest) -> Result<Vec<Message>, QueueError> {
            match self.behaviour {
                Behaviour::Empty => Ok(Vec::new()),
                Behaviour::Stall => std::future::pending().await,
                Behaviour::Panic => panic!("receive blew up"),
            }
        }

        async fn send(&self, _: SendRequest<'_>) -> Result<String, QueueError> {
            Ok(String::new())
        }

        async fn delete(&self, _: &str, _: &str) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn dropping_the_run_aborts_every_drainer() {
        let live = Arc::new(());
        let source = Scripted {
            behaviour: Behaviour::Stall,
            _live: Arc::clone(&live),
        };

        let pool = pool(3);
        let run = pool.run(|_| (source.clone(), source.clone()));
        assert!(tokio::time::timeout(Duration::from_millis(50), run)
            .await
            .is_err());
        drop(source);

        let mut waited = 0;
        while Arc::strong_count(&live) > 1 && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert_eq!(Arc::strong_count(&live), 1, "a drainer outlived its pool");
    }

    #[tokio::test]
    async fn panicking_worker_is_reported_with_its_id() {
        let live = Arc::new(());

        let err = pool(3)
            .run(|worker| {
                let behaviour = if worker == 2 {
                    Behaviour::Panic
                } else {
                    Behaviour::Empty
                };
                let source = Scripted {
                    behaviour,
                    _live: Arc::clone(&live),
                };
                (source.clone(), source)
            })
            .await
            .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        match &err.failures[0] {
            WorkerFailure::Aborted { worker, reason } => {
                assert_eq!(*worker, 2);
                assert!(reason.contains("panic"));
            }
            other => panic!("unexpected failure: {}", other),
        }
        assert_eq!(
            err.partial.workers.iter().map(|w| w.worker).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }
}
