//! Background write-back of shared links to customer records
//!
//! Link write-back must never delay an upload, so requests go through a
//! bounded queue drained by a single worker task. Each request gets its own
//! retry budget. When the queue is full the request is dropped with a
//! warning; the link is recreated and resubmitted the next time the
//! customer's root is resolved in a fresh process.

use crate::adapters::orders::OrderSystem;
use crate::core::retry::RetryPolicy;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Store `url` on the customer record `customer_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkWriteBack {
    pub customer_id: String,
    pub url: String,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataSyncStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Shared {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    pending: AtomicUsize,
    idle: Notify,
}

/// Bounded queue with one worker
pub struct MetadataSyncQueue {
    tx: Mutex<Option<mpsc::Sender<LinkWriteBack>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl MetadataSyncQueue {
    /// Spawn the worker; must be called inside a Tokio runtime
    pub fn start(orders: Arc<dyn OrderSystem>, retry: RetryPolicy, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(Shared::default());
        let worker = tokio::spawn(run_worker(rx, orders, retry, shared.clone()));

        Self {
            tx: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            shared,
        }
    }

    /// Queue a write-back without waiting
    ///
    /// Returns false when the request was dropped.
    pub fn submit(&self, request: LinkWriteBack) -> bool {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(tx) = guard.as_ref() else {
            self.shared.dropped.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(customer_id = %request.customer_id, "Metadata queue closed, dropping link write-back");
            return false;
        };

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(request) {
            Ok(()) => {
                self.shared.submitted.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(e) => {
                self.finish_one();
                self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                let request = match e {
                    mpsc::error::TrySendError::Full(r) | mpsc::error::TrySendError::Closed(r) => r,
                };
                tracing::warn!(
                    customer_id = %request.customer_id,
                    "Metadata queue full, dropping link write-back"
                );
                false
            }
        }
    }

    fn finish_one(&self) {
        self.shared.pending.fetch_sub(1, Ordering::SeqCst);
        self.shared.idle.notify_waiters();
    }

    /// Current counters
    pub fn stats(&self) -> MetadataSyncStats {
        MetadataSyncStats {
            submitted: self.shared.submitted.load(Ordering::SeqCst),
            succeeded: self.shared.succeeded.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            dropped: self.shared.dropped.load(Ordering::SeqCst),
        }
    }

    /// Wait until nothing is queued or in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting requests, drain the queue and stop the worker
    pub async fn close(&self) {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(tx);

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Metadata sync worker panicked");
            }
        }

        let stats = self.stats();
        tracing::info!(
            submitted = stats.submitted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            dropped = stats.dropped,
            "Metadata sync queue closed"
        );
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<LinkWriteBack>,
    orders: Arc<dyn OrderSystem>,
    retry: RetryPolicy,
    shared: Arc<Shared>,
) {
    while let Some(request) = rx.recv().await {
        let result = retry
            .run("set_customer_link", || {
                orders.set_customer_link(&request.customer_id, &request.url)
            })
            .await;

        match result {
            Ok(()) => {
                shared.succeeded.fetch_add(1, Ordering::SeqCst);
                tracing::info!(customer_id = %request.customer_id, "Stored shared link on customer");
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    customer_id = %request.customer_id,
                    error = %e,
                    "Giving up on link write-back"
                );
            }
        }

        shared.pending.fetch_sub(1, Ordering::SeqCst);
        shared.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::orders::{MemoryOrderSystem, OrderCall};
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2), 2.0)
    }

    fn request(n: usize) -> LinkWriteBack {
        LinkWriteBack {
            customer_id: format!("gid://shopify/Customer/{n}"),
            url: format!("https://db.tt/{n}"),
        }
    }

    #[tokio::test]
    async fn test_write_back_succeeds() {
        let orders = Arc::new(MemoryOrderSystem::new());
        let queue = MetadataSyncQueue::start(orders.clone(), fast_retry(), 8);

        assert!(queue.submit(request(1)));
        queue.wait_idle().await;

        assert_eq!(
            orders.customer_link("gid://shopify/Customer/1").as_deref(),
            Some("https://db.tt/1")
        );
        let stats = queue.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.succeeded, 1);
        queue.close().await;
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let orders = Arc::new(MemoryOrderSystem::new());
        orders.fail_transiently(OrderCall::SetCustomerLink, 2);
        let queue = MetadataSyncQueue::start(orders.clone(), fast_retry(), 8);

        queue.submit(request(1));
        queue.wait_idle().await;

        assert_eq!(queue.stats().succeeded, 1);
        assert_eq!(orders.call_count(OrderCall::SetCustomerLink), 3);
        queue.close().await;
    }

    #[tokio::test]
    async fn test_permanent_failure_is_counted() {
        let orders = Arc::new(MemoryOrderSystem::new());
        orders.fail_always(OrderCall::SetCustomerLink);
        let queue = MetadataSyncQueue::start(orders.clone(), fast_retry(), 8);

        queue.submit(request(1));
        queue.wait_idle().await;

        assert_eq!(queue.stats().failed, 1);
        assert_eq!(orders.call_count(OrderCall::SetCustomerLink), 1);
        queue.close().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops() {
        let orders = Arc::new(MemoryOrderSystem::new());
        let queue = MetadataSyncQueue::start(orders.clone(), fast_retry(), 2);

        // The worker cannot run until this task yields
        let accepted = (0..5).filter(|n| queue.submit(request(*n))).count();
        assert_eq!(accepted, 2);
        assert_eq!(queue.stats().dropped, 3);

        queue.close().await;
        assert_eq!(queue.stats().succeeded, 2);
    }

    #[tokio::test]
    async fn test_submit_after_close_is_dropped() {
        let orders = Arc::new(MemoryOrderSystem::new());
        let queue = MetadataSyncQueue::start(orders, fast_retry(), 2);
        queue.close().await;

        assert!(!queue.submit(request(1)));
        assert_eq!(queue.stats().dropped, 1);
        queue.wait_idle().await;
    }
}
