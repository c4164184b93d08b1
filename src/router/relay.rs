//! Result relay
//!
//! Ordered, lossless delivery of a session's events to the driver. The worker
//! owns the producing half; publishing never blocks and never drops.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::debug;

use super::types::{Event, EventEnvelope};

/// Create the two halves of a session's event channel
pub fn event_relay(session_id: impl Into<String>) -> (EventRelay, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventRelay {
            session_id: session_id.into(),
            tx,
            seq: AtomicU64::new(0),
        },
        EventStream { rx },
    )
}

/// Producing half
pub struct EventRelay {
    session_id: String,
    tx: mpsc::UnboundedSender<EventEnvelope>,
    seq: AtomicU64,
}

impl EventRelay {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stamp and deliver an event; returns its sequence number
    pub fn publish(&self, operation_id: u64, event: Event) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = EventEnvelope {
            session_id: self.session_id.clone(),
            seq,
            operation_id,
            event,
        };
        if self.tx.send(envelope).is_err() {
            debug!(
                "Event stream for session {} is gone, dropping event {}",
                self.session_id, seq
            );
        }
        seq
    }
}

/// Consuming half; yields events in publication order
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<EventEnvelope>,
}

impl EventStream {
    /// Next event; `None` once the worker has stopped and everything was read
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    /// Next event if one is already waiting
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        match self.rx.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocking receive for synchronous drivers.
    ///
    /// Panics when called from inside an async context.
    pub fn blocking_recv(&mut self) -> Option<EventEnvelope> {
        self.rx.blocking_recv()
    }

    /// Everything currently queued, without waiting
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Hand every event to `callback` on a background task until the worker stops
    pub fn for_each<F>(mut self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(EventEnvelope) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(envelope) = self.rx.recv().await {
                callback(envelope);
            }
        })
    }
}
