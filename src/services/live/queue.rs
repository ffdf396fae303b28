use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::codec::EncodedBlob;

/// Bounded outbound frame queue with a drop-oldest policy.
///
/// Producers (capture thread, frame sampler) never block: when the queue is
/// full the oldest frame is evicted so a slow transport loses stale frames
/// instead of arbitrary ones. Capture order is preserved for what remains.
#[derive(Clone)]
pub struct OutboundQueue {
    inner: Arc<Inner>,
}

struct Inner {
    items: Mutex<VecDeque<EncodedBlob>>,
    capacity: usize,
    closed: AtomicBool,
    notify: Notify,
    audio_delivered: AtomicU64,
    video_delivered: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub audio_delivered: u64,
    pub video_delivered: u64,
    pub dropped: u64,
    pub pending: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
                notify: Notify::new(),
                audio_delivered: AtomicU64::new(0),
                video_delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Returns `true` if an older frame had to be evicted. Frames pushed
    /// after `close` are discarded silently.
    pub fn push(&self, blob: EncodedBlob) -> bool {
        if self.is_closed() {
            return false;
        }
        let evicted = {
            let mut items = self.inner.items.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if items.len() >= self.inner.capacity {
                items.pop_front();
                true
            } else {
                false
            };
            items.push_back(blob);
            evicted
        };
        if evicted {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<EncodedBlob> {
        let blob = self
            .inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()?;
        let counter = if blob.is_audio() {
            &self.inner.audio_delivered
        } else {
            &self.inner.video_delivered
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Some(blob)
    }

    /// Waits for the next frame. `None` once closed; pending frames are
    /// discarded by `close`.
    pub async fn pop(&self) -> Option<EncodedBlob> {
        loop {
            if let Some(blob) = self.try_pop() {
                return Some(blob);
            }
            if self.is_closed() {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Idempotent. Wakes the consumer so it can observe the close.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.notify.notify_waiters();
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            audio_delivered: self.inner.audio_delivered.load(Ordering::Relaxed),
            video_delivered: self.inner.video_delivered.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            pending: self.len(),
        }
    }
}
