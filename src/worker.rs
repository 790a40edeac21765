//! Background worker for post actions
//!
//! Work that must not hold up a reconcile, such as garbage collection of older
//! generations, is handed to a single worker task over a bounded queue. Submitting never
//! blocks. Task failures are logged and otherwise ignored.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors raised when handing work to the worker
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("background queue is full, task {0} dropped")]
    QueueFull(String),

    #[error("background worker stopped, task {0} dropped")]
    Stopped(String),
}

struct Task {
    name: String,
    future: BoxFuture<'static, anyhow::Result<()>>,
}

/// Handle to the background worker. Clones share the same queue.
#[derive(Clone)]
pub struct BackgroundWorker {
    sender: mpsc::Sender<Task>,
    closing: CancellationToken,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl BackgroundWorker {
    /// Spawn the worker task. Must be called from within a tokio runtime.
    ///
    /// `cancel` stops the worker immediately, dropping queued tasks.
    pub fn spawn(capacity: usize, cancel: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let closing = CancellationToken::new();
        let handle = tokio::spawn(run(receiver, cancel, closing.clone()));

        Self {
            sender,
            closing,
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Queue a task without waiting
    pub fn submit<F>(&self, name: impl Into<String>, task: F) -> Result<(), WorkerError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if self.closing.is_cancelled() {
            return Err(WorkerError::Stopped(name));
        }

        let task = Task {
            name,
            future: Box::pin(task),
        };
        self.sender.try_send(task).map_err(|err| match err {
            mpsc::error::TrySendError::Full(task) => WorkerError::QueueFull(task.name),
            mpsc::error::TrySendError::Closed(task) => WorkerError::Stopped(task.name),
        })
    }

    /// Stop accepting tasks and wait for the queued ones to finish
    pub async fn shutdown(&self) {
        self.closing.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("Background worker terminated abnormally: {}", err);
            }
        }
    }
}

async fn run(
    mut receiver: mpsc::Receiver<Task>,
    cancel: CancellationToken,
    closing: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Background worker cancelled");
                return;
            }
            task = receiver.recv() => task,
            _ = closing.cancelled() => None,
        };

        match task {
            Some(task) => execute(task, &cancel).await,
            None => break,
        }
    }

    receiver.close();
    while let Some(task) = receiver.recv().await {
        execute(task, &cancel).await;
    }
}

async fn execute(task: Task, cancel: &CancellationToken) {
    let Task { name, future } = task;
    tokio::select! {
        _ = cancel.cancelled() => {
            warn!("Background task {} interrupted by cancellation", name);
        }
        result = future => match result {
            Ok(()) => debug!("Background task {} completed", name),
            Err(err) => warn!("Background task {} failed: {:#}", name, err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_tasks_run_before_shutdown_returns() {
        let worker = BackgroundWorker::spawn(8, CancellationToken::new());
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let counter = counter.clone();
            worker
                .submit(format!("task-{}", i), async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        worker.shutdown().await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let worker = BackgroundWorker::spawn(1, CancellationToken::new());
        worker.shutdown().await;

        let err = worker.submit("late", async { Ok(()) }).unwrap_err();
        assert!(matches!(err, WorkerError::Stopped(name) if name == "late"));
    }
}
