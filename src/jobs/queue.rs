//! Bounded FIFO queues for the cull dispatch protocol
//!
//! Both queues block on overflow; capacity is sized by the integrator
//! for the worst-case objects-per-frame. Synchronization is internal
//! (mutex + condvar); callers share the queues by reference across
//! threads.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Multi-producer multi-consumer job queue with explicit close.
///
/// `pop` blocks until an item arrives or the queue is closed and
/// drained, which is how workers learn the frame's dispatch is over.
pub struct JobQueue<T> {
    state: Mutex<JobState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct JobState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> JobQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be nonzero");
        Self {
            state: Mutex::new(JobState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a job, blocking while the queue is full
    pub fn push(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        while state.items.len() >= self.capacity {
            state = self.not_full.wait(state).unwrap();
        }
        debug_assert!(!state.closed, "push after close");
        state.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Dequeue a job, blocking until one arrives; `None` once the
    /// queue is closed and drained
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Signal that no more jobs will be pushed this frame
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.not_empty.notify_all();
    }

    /// Re-arm a closed queue for the next frame
    pub fn reopen(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.items.is_empty(), "reopen with undrained jobs");
        state.closed = false;
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded FIFO of classified results with producer accounting.
///
/// A producer registers before its node scan is queued and leaves when
/// the scan completes, so [`OutputQueue::pop_until_idle`] returning
/// `None` means the frame is fully drained, not merely momentarily
/// empty.
pub struct OutputQueue<T> {
    state: Mutex<OutputState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct OutputState<T> {
    items: VecDeque<T>,
    producers: usize,
}

impl<T> OutputQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be nonzero");
        Self {
            state: Mutex::new(OutputState {
                items: VecDeque::with_capacity(capacity),
                producers: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn add_producer(&self) {
        let mut state = self.state.lock().unwrap();
        state.producers += 1;
    }

    pub fn remove_producer(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.producers > 0, "producer count underflow");
        state.producers -= 1;
        // wake the consumer so it can observe idleness
        self.not_empty.notify_all();
    }

    pub fn producer_count(&self) -> usize {
        self.state.lock().unwrap().producers
    }

    /// Enqueue a result, blocking while the queue is full
    pub fn push(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        while state.items.len() >= self.capacity {
            state = self.not_full.wait(state).unwrap();
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Dequeue the next result; `None` once no producers remain and
    /// the queue is empty
    pub fn pop_until_idle(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.producers == 0 {
                return None;
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Non-blocking pop
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        let item = state.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
