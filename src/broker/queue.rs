//! Per-topic delivery queue.
//!
//! Notifications wait in a backlog until a subscriber loop takes them. The
//! backlog is unbounded unless a limit is configured. All subscriber loops of
//! a topic share the single receiver behind an async mutex, so each
//! notification is handed to exactly one of them (competing consumers, not
//! fan-out). Tokio's mutex is fair, so waiting subscribers are served in the
//! order they started waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::broker::message::Notification;

#[derive(Debug)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Notification>,
    rx: Mutex<mpsc::UnboundedReceiver<Notification>>,
    pending: AtomicUsize,
    limit: Option<usize>,
    attached: Arc<AtomicUsize>,
}

/// A reserved backlog slot. Dropping it without sending releases the slot.
pub struct DeliverySlot<'a> {
    queue: &'a DeliveryQueue,
    sent: bool,
}

impl DeliverySlot<'_> {
    pub fn send(mut self, notification: Notification) {
        // The receiver lives as long as the queue, so this only fails while
        // the queue itself is being torn down.
        self.sent = self.queue.tx.send(notification).is_ok();
    }
}

impl Drop for DeliverySlot<'_> {
    fn drop(&mut self) {
        if !self.sent {
            self.queue.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Keeps a subscriber loop counted as attached for as long as it lives.
#[derive(Debug)]
pub struct AttachGuard {
    attached: Arc<AtomicUsize>,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        self.attached.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DeliveryQueue {
    /// Creates a queue holding at most `limit` undelivered notifications.
    /// A limit of zero means unbounded.
    pub fn new(limit: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
            limit: (limit > 0).then_some(limit),
            attached: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reserves room for one notification without waiting. Returns `None`
    /// only when a limit is set and the backlog is full.
    pub fn reserve(&self) -> Option<DeliverySlot<'_>> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| DeliverySlot {
                queue: self,
                sent: false,
            })
    }

    /// Waits until a notification is available and takes it.
    ///
    /// Cancel-safe: dropping the future before it resolves loses nothing.
    pub async fn take(&self) -> Option<Notification> {
        let mut rx = self.rx.lock().await;
        let next = rx.recv().await;
        if next.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        next
    }

    pub fn attach(&self) -> AttachGuard {
        self.attached.fetch_add(1, Ordering::SeqCst);
        AttachGuard {
            attached: self.attached.clone(),
        }
    }

    /// Number of subscriber loops currently attached.
    pub fn subscribers(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    /// Notifications published but not yet taken by a subscriber.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// The configured backlog limit, `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}
