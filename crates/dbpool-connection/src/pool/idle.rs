//! Idle queue of released handles

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::HandleState;

/// One released handle waiting in the idle queue.
///
/// The entry records the lease the handle was released under. Any later
/// `recreate` or `destroy` of the handle invalidates it, after which the
/// entry no longer resolves and is dropped silently by whoever finds it.
#[derive(Clone)]
pub(crate) struct IdleEntry {
    state: Arc<HandleState>,
    stamp: u64,
}

impl IdleEntry {
    pub(crate) fn new(state: Arc<HandleState>, stamp: u64) -> Self {
        Self { state, stamp }
    }

    /// The handle, if this entry still refers to it
    pub(crate) fn resolve(&self) -> Option<&Arc<HandleState>> {
        (!self.state.is_destroyed() && self.state.lease() == self.stamp).then_some(&self.state)
    }

    fn same_as(&self, other: &IdleEntry) -> bool {
        Arc::ptr_eq(&self.state, &other.state) && self.stamp == other.stamp
    }
}

struct Inner {
    entries: VecDeque<IdleEntry>,
    closed: bool,
}

/// Bounded FIFO of idle entries.
///
/// The bound is checked and the entry pushed under one lock, so concurrent
/// releases racing the boundary can never overfill the queue.
pub(crate) struct IdleQueue {
    inner: Mutex<Inner>,
    max: usize,
}

impl IdleQueue {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                closed: false,
            }),
            max,
        }
    }

    /// Queue an entry; false when the queue is full or closed
    pub(crate) fn offer(&self, entry: IdleEntry) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        if inner.entries.len() >= self.max {
            // Stale entries must not hold slots a live handle could use
            inner.entries.retain(|e| e.resolve().is_some());
            if inner.entries.len() >= self.max {
                return false;
            }
        }
        inner.entries.push_back(entry);
        true
    }

    pub(crate) fn poll(&self) -> Option<IdleEntry> {
        self.inner.lock().entries.pop_front()
    }

    /// Remove a specific entry; false when someone else already took it
    pub(crate) fn remove(&self, entry: &IdleEntry) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.iter().position(|e| e.same_as(entry)) {
            Some(pos) => inner.entries.remove(pos).is_some(),
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<IdleEntry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Refuse further offers and hand back everything queued
    pub(crate) fn close(&self) -> Vec<IdleEntry> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.entries.drain(..).collect()
    }
}
