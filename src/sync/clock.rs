use std::time::{Duration, Instant};

/// Wall clock used to age free heaps.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary but fixed starting point.
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`Instant`], counting from its creation.
#[derive(Debug, Copy, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}
