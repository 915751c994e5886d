//! Per-provider serialized request queue.
//!
//! All three upstreams are rate-limited; dispatching one request at a time
//! with a fixed quiescence interval after each completion keeps the plugin
//! under quota without any central coordination. Concurrency is one on
//! purpose: the quota, not the pipe, is the scarce resource.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::ZoroError;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Default quiescence interval: ~83 requests/minute, under the strictest
/// upstream limit of 90.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(720);

/// FIFO queue with at most one job in flight and a mandatory idle period
/// after each job settles. Failures pass through to the submitter and do
/// not poison the queue.
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<Job>,
    handle: tokio::task::JoinHandle<()>,
    pending: Arc<AtomicUsize>,
}

impl RequestQueue {
    pub fn new(delay: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                counter.fetch_sub(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
            }
        });
        Self {
            tx,
            handle,
            pending,
        }
    }

    /// Number of jobs submitted but not yet settled, the in-flight one
    /// included.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Append a thunk immediately; the returned future resolves with the
    /// thunk's own result once its turn comes. Dropping that future does not
    /// unqueue the thunk: it still runs to completion and its result is
    /// discarded.
    pub fn submit<T, F>(&self, fut: F) -> impl Future<Output = Result<T, ZoroError>>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ZoroError>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = fut.await;
            // The submitter may have been dropped; that is fine.
            let _ = done_tx.send(result);
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        let sent = self.tx.send(job).is_ok();
        if !sent {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        async move {
            if !sent {
                return Err(ZoroError::Transient("request queue is shut down".into()));
            }
            done_rx
                .await
                .map_err(|_| ZoroError::Transient("request queue dropped the job".into()))?
        }
    }

    /// Stop the worker. Queued jobs that have not started are abandoned.
    pub fn shutdown(self) {
        debug!("shutting down request queue");
        self.handle.abort();
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_and_spacing() {
        let queue = Arc::new(RequestQueue::new(Duration::from_millis(700)));
        let starts: Arc<Mutex<Vec<(u32, Instant)>>> = Arc::default();

        let mut handles = Vec::new();
        for i in 0..3u32 {
            let queue = Arc::clone(&queue);
            let starts = Arc::clone(&starts);
            handles.push(tokio::spawn(async move {
                queue
                    .submit(async move {
                        starts.lock().unwrap().push((i, Instant::now()));
                        Ok::<u32, ZoroError>(i)
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(results, vec![0, 1, 2]);

        let starts = starts.lock().unwrap();
        assert_eq!(
            starts.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        for pair in starts.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(700));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_poison() {
        let queue = RequestQueue::new(Duration::from_millis(10));

        let err = queue
            .submit(async { Err::<(), _>(ZoroError::Transient("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, ZoroError::Transient(_)));

        let ok = queue.submit(async { Ok::<_, ZoroError>(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_counts_down_as_jobs_settle() {
        let queue = RequestQueue::new(Duration::from_millis(10));
        assert!(queue.is_idle());

        let first = queue.submit(async { Ok::<_, ZoroError>(1) });
        let second = queue.submit(async { Ok::<_, ZoroError>(2) });
        assert_eq!(queue.pending(), 2);

        first.await.unwrap();
        second.await.unwrap();
        assert!(queue.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_submission_still_settles() {
        let queue = RequestQueue::new(Duration::from_millis(10));
        let ran: Arc<Mutex<bool>> = Arc::default();

        let ran2 = Arc::clone(&ran);
        let fut = queue.submit(async move {
            *ran2.lock().unwrap() = true;
            Ok::<_, ZoroError>(())
        });
        drop(fut); // caller abandons before polling

        // A later submission proves the worker kept going.
        queue.submit(async { Ok::<_, ZoroError>(()) }).await.unwrap();
        assert!(*ran.lock().unwrap());
    }
}
