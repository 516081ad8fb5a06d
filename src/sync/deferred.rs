//! Deferred execution of actions that must wait for the GPU.
//!
//! Native heaps may still be referenced by command buffers in flight when their owner lets go of them.
//! Instead of releasing them right away, the cache pushes the release onto a [`CompletionQueue`] keyed by the
//! completion token (fence value) that will be signaled after all currently recorded work. The action runs once the
//! renderer reports that token as retired.

use parking_lot::Mutex;

/// Action to run once its completion token has retired.
pub type DeferredAction = Box<dyn FnOnce() + Send + 'static>;

/// Queue of actions keyed by a monotonically increasing completion token.
pub trait CompletionQueue: Send + Sync {
    /// The token that will be signaled next. Work recorded right now completes when this token retires.
    fn current_token(&self) -> u64;

    /// Run `action` once `token` has retired.
    fn enqueue(&self, token: u64, action: DeferredAction);
}

#[derive(Derivative)]
#[derivative(Debug)]
struct Item {
    token: u64,
    #[derivative(Debug = "ignore")]
    action: DeferredAction,
}

#[derive(Debug)]
struct QueueInner {
    next_token: u64,
    items: Vec<Item>,
}

/// A simple [`CompletionQueue`] driven by the renderer. Call [`DeferredActionQueue::signal`] when submitting a frame
/// and [`DeferredActionQueue::retire`] with the last token the GPU has finished.
///
/// # Example
/// ```
/// # use explicit_descriptor_cache::*;
/// let queue = DeferredActionQueue::new();
/// queue.enqueue(queue.current_token(), Box::new(|| println!("GPU is done with frame 1")));
/// let submitted = queue.signal();
/// // Later, once the fence for `submitted` is observed as signaled:
/// queue.retire(submitted);
/// assert_eq!(queue.pending(), 0);
/// ```
#[derive(Debug)]
pub struct DeferredActionQueue {
    inner: Mutex<QueueInner>,
}

impl Default for DeferredActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredActionQueue {
    /// Create a new queue. The first token to be signaled is 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                next_token: 1,
                items: vec![],
            }),
        }
    }

    /// Mark the current token as submitted and advance to the next one. Returns the submitted token.
    pub fn signal(&self) -> u64 {
        let mut inner = self.inner.lock();
        let token = inner.next_token;
        inner.next_token += 1;
        token
    }

    /// Run every action whose token is less than or equal to `completed`.
    /// Actions run after the internal lock is released, so they may enqueue new actions.
    pub fn retire(&self, completed: u64) {
        let ready = {
            let mut inner = self.inner.lock();
            let (ready, waiting): (Vec<_>, Vec<_>) = inner.items.drain(..).partition(|item| item.token <= completed);
            inner.items = waiting;
            ready
        };
        for item in ready {
            (item.action)();
        }
    }

    /// Run every pending action regardless of its token. Only valid once the device is idle.
    pub fn retire_all(&self) {
        let ready = std::mem::take(&mut self.inner.lock().items);
        for item in ready {
            (item.action)();
        }
    }

    /// Number of actions still waiting for their token to retire.
    pub fn pending(&self) -> usize {
        self.inner.lock().items.len()
    }
}

impl CompletionQueue for DeferredActionQueue {
    fn current_token(&self) -> u64 {
        self.inner.lock().next_token
    }

    fn enqueue(&self, token: u64, action: DeferredAction) {
        self.inner.lock().items.push(Item {
            token,
            action,
        });
    }
}
