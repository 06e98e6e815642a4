use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin instance picker shared by every request.
#[derive(Debug)]
pub struct RoundRobin {
    counter: AtomicUsize,
    instances: usize,
}

impl RoundRobin {
    pub fn new(instances: usize) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            instances,
        }
    }

    /// `counter % instances`, then advance the counter. `None` for an
    /// empty pool.
    pub fn next(&self) -> Option<usize> {
        if self.instances == 0 {
            return None;
        }
        Some(self.counter.fetch_add(1, Ordering::Relaxed) % self.instances)
    }

    pub fn instances(&self) -> usize {
        self.instances
    }
}
