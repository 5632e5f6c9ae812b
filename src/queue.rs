//! The bounded buffer between the HTTP receiver and the batch dispatcher.
//!
//! `AlertQueue` is a thin wrapper around a bounded `async_channel`. Any
//! number of request handlers may enqueue concurrently; the dispatcher is the
//! only consumer. Enqueueing into a full queue waits for space, which is how
//! a slow backend pushes back on the alert producers.

use crate::core::AlertRecord;
use async_channel::{Receiver, Sender, TryRecvError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("alert queue is closed")]
    Closed,
}

/// Outcome of a non-blocking dequeue attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum TryDequeue {
    Record(AlertRecord),
    Empty,
    /// The queue is closed and every record has been handed out.
    Closed,
}

/// A cloneable handle to the shared FIFO of pending alerts.
#[derive(Clone, Debug)]
pub struct AlertQueue {
    tx: Sender<AlertRecord>,
    rx: Receiver<AlertRecord>,
}

impl AlertQueue {
    /// Creates a queue holding at most `capacity` records.
    ///
    /// # Panics
    /// Panics if `capacity` is zero. Configuration validation rejects a zero
    /// capacity before this is reached.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity);
        Self { tx, rx }
    }

    /// Adds a record, waiting while the queue is full.
    pub async fn enqueue(&self, record: AlertRecord) -> Result<(), QueueError> {
        self.tx.send(record).await.map_err(|_| QueueError::Closed)
    }

    /// Takes the oldest record, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<AlertRecord> {
        self.rx.recv().await.ok()
    }

    pub fn try_dequeue(&self) -> TryDequeue {
        match self.rx.try_recv() {
            Ok(record) => TryDequeue::Record(record),
            Err(TryRecvError::Empty) => TryDequeue::Empty,
            Err(TryRecvError::Closed) => TryDequeue::Closed,
        }
    }

    /// Stops accepting new records. Records already queued remain available
    /// to `dequeue`. Calling this more than once is harmless; the return value
    /// tells whether this call was the one that closed the queue.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        // Always `Some` for a bounded channel.
        self.rx.capacity().unwrap_or(usize::MAX)
    }
}
