use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::debug;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("work queue is closed")]
    Closed,
}

/// Multi-consumer work queue with a completion barrier
///
/// Architecture:
/// 1. Producer calls `queue.put(item)`; the unfinished counter goes up
/// 2. Workers call `queue.get()` and receive a [`Claimed`] guard
/// 3. Dropping the guard marks the item done (success, error or panic alike)
/// 4. `queue.join()` resolves once the unfinished counter reaches zero
///
/// Workers block in `get()` forever once the queue is empty; shutting them
/// down is the caller's job (see `Coordinator`).
pub struct WorkQueue<T> {
    sender: mpsc::UnboundedSender<T>,
    receiver: Mutex<mpsc::UnboundedReceiver<T>>,
    unfinished: AtomicUsize,
    drained: Notify,
}

/// A dequeued item; marks itself done when dropped
pub struct Claimed<'a, T> {
    queue: &'a WorkQueue<T>,
    item: T,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            unfinished: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Enqueue an item without blocking
    pub fn put(&self, item: T) -> Result<(), QueueError> {
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(item).is_err() {
            self.finish_one();
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Wait for the next item
    pub async fn get(&self) -> Option<Claimed<'_, T>> {
        let item = self.receiver.lock().await.recv().await?;
        Some(Claimed { queue: self, item })
    }

    /// Items enqueued but not yet marked done
    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }

    /// Block until every enqueued item has been marked done
    pub async fn join(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            // register before checking so a concurrent finish isn't missed
            drained.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }
            drained.await;
        }
    }

    fn finish_one(&self) {
        let previous = self.unfinished.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            debug!("Work queue drained");
            self.drained.notify_waiters();
        }
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for Claimed<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T> Drop for Claimed<'_, T> {
    fn drop(&mut self) {
        self.queue.finish_one();
    }
}
