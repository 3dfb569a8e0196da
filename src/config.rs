//! Store configuration.

/// Tuning knobs for a [`crate::Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of each watch subscription's visible queue. Backlog beyond
    /// this waits in the subscription's unbounded feed; it never applies
    /// backpressure to writers.
    pub watch_queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            watch_queue_capacity: 64,
        }
    }
}
