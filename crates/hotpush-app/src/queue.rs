//! Serialized per-device action queue
//!
//! Every operation against one device (a sync push, a manifest read, a
//! debug-attach step) goes through that device's queue and runs strictly
//! one at a time in submission order. This is what keeps socket and
//! manifest writes from interleaving and makes retries safe to reason
//! about.
//!
//! Stopping the queue drains the operation already running and refuses to
//! start anything still queued; refused operations resolve as cancelled.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use hotpush_core::prelude::*;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// FIFO queue with a single in-order worker for one device.
pub struct DeviceQueue {
    device_id: String,
    tx: mpsc::UnboundedSender<Job>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    worker: JoinHandle<()>,
}

impl DeviceQueue {
    pub fn new(device_id: impl Into<String>) -> Self {
        let device_id = device_id.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (stop_tx, stop_rx) = watch::channel(false);

        let worker_stop = stop_rx.clone();
        let worker_device = device_id.clone();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if *worker_stop.borrow() {
                    // Refused: dropping the job resolves its caller as
                    // cancelled through the closed result channel.
                    continue;
                }
                job.await;
            }
            debug!(device = %worker_device, "device queue drained");
        });

        Self {
            device_id,
            tx,
            stop_tx,
            stop_rx,
            worker,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// A receiver of the stop flag, for operations that must observe
    /// cancellation mid-wait (debug-attach waits).
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Append an operation and wait for its result. The operation starts
    /// only after every earlier operation for this device has completed.
    pub async fn run<T, Fut>(&self, op: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_stopped() {
            return Err(Error::Cancelled);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done_tx.send(op.await);
        });

        self.tx.send(job).map_err(|_| Error::Cancelled)?;
        done_rx.await.map_err(|_| Error::Cancelled)?
    }

    /// Append a fire-and-forget operation (its outcome is reported through
    /// side effects, e.g. bus events).
    pub fn enqueue<Fut>(&self, op: Fut) -> Result<()>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_stopped() {
            return Err(Error::Cancelled);
        }
        self.tx
            .send(Box::pin(op))
            .map_err(|_| Error::Cancelled)
    }

    /// Stop the queue: the running operation is not interrupted; queued
    /// operations are refused.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop and wait for the worker to finish the in-flight operation.
    pub async fn shutdown(self) {
        self.stop();
        drop(self.tx);
        let _ = self.worker.await;
    }
}
