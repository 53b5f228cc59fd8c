//! Wait-free-enqueue / lock-free single-consumer-dequeue task queue.
//!
//! Direct port of the dummy-node intrusive linked list in
//! `original_source/utils/MPSCQueue.h`: a producer swaps a new node into
//! `head` (acquire-release) and publishes it into the previous head's
//! `next` (release); the single consumer walks from `tail`, loading `next`
//! with acquire, moving the payload out, and freeing the old dummy node.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node<T> {
    data: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn dummy() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: None,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn with_data(data: T) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: Some(data),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Multi-producer, single-consumer unbounded queue of `T`.
///
/// Enqueue is wait-free; dequeue is lock-free provided it is only ever
/// called from a single consumer thread at a time. A spurious "empty"
/// dequeue between a concurrent enqueue's head swap and its `next`
/// publication is expected and harmless — the item is visible on a
/// subsequent dequeue.
pub struct MpscQueue<T> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
}

// SAFETY: ownership of each node is transferred exactly once (producer to
// queue, queue to consumer); the atomics provide the required synchronization.
unsafe impl<T: Send> Send for MpscQueue<T> {}
unsafe impl<T: Send> Sync for MpscQueue<T> {}

impl<T> Default for MpscQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MpscQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        let dummy = Node::dummy();
        MpscQueue {
            head: AtomicPtr::new(dummy),
            tail: AtomicPtr::new(dummy),
        }
    }

    /// Publishes `value` to the queue. Safe to call concurrently from any
    /// number of producer threads.
    pub fn enqueue(&self, value: T) {
        let new_node = Node::with_data(value);
        let prev_head = self.head.swap(new_node, Ordering::AcqRel);
        // SAFETY: prev_head was allocated by a previous enqueue or by `new`
        // and is never freed while still reachable as `head`.
        unsafe {
            (*prev_head).next.store(new_node, Ordering::Release);
        }
    }

    /// Pops the oldest value, if any. Must only be called from a single
    /// consumer at a time.
    pub fn dequeue(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        // SAFETY: tail always points at a live dummy/consumed node owned by
        // the queue.
        let next = unsafe { (*tail).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }
        // SAFETY: next was published by enqueue and is owned by the queue
        // until this dequeue takes it over as the new tail.
        let value = unsafe { (*next).data.take() };
        self.tail.store(next, Ordering::Release);
        // SAFETY: the old tail is no longer reachable from any queue field.
        unsafe {
            drop(Box::from_raw(tail));
        }
        value
    }

    /// Best-effort emptiness check; racy in the presence of concurrent
    /// enqueues, matching the C++ original's `empty()`.
    pub fn is_empty(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = unsafe { (*tail).next.load(Ordering::Acquire) };
        next.is_null()
    }
}

impl<T> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
        let tail = *self.tail.get_mut();
        // SAFETY: single owner at drop time, no concurrent access possible.
        unsafe {
            drop(Box::from_raw(tail));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_single_producer() {
        let q = MpscQueue::new();
        assert!(q.is_empty());
        q.enqueue(1);
        q.enqueue(2);
        q.enqueue(3);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
        assert_eq!(q.dequeue(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn preserves_per_producer_order_under_contention() {
        let q = Arc::new(MpscQueue::new());
        let producers = 8;
        let per_producer = 2_000;
        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        q.enqueue((p, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut last_seen = vec![-1i64; producers];
        let mut total = 0;
        while let Some((p, i)) = q.dequeue() {
            assert!(i as i64 > last_seen[p]);
            last_seen[p] = i as i64;
            total += 1;
        }
        assert_eq!(total, producers * per_producer);
    }

    #[test]
    fn drops_unconsumed_values() {
        let dropped = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        struct Counted(Arc<std::sync::atomic::AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        {
            let q = MpscQueue::new();
            q.enqueue(Counted(Arc::clone(&dropped)));
            q.enqueue(Counted(Arc::clone(&dropped)));
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }
}
