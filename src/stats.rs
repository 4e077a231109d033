use serde::Serialize;

/// Per-reader counters.
///
/// Workers accumulate into a stack-local copy and merge once under the
/// coordinator mutex at completion, so there are no atomics on the hot path.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ReaderStats {
    /// Segments or footprints read after region narrowing.
    pub read: u64,
    /// Entries rejected by science filters or validity checks.
    pub filtered: u64,
    /// Records successfully posted to the output queue.
    pub sent: u64,
    /// Records dropped on fatal post status or after cancellation.
    pub dropped: u64,
    /// Transient full-queue retries.
    pub retried: u64,
}

impl ReaderStats {
    pub fn merge(&mut self, other: &ReaderStats) {
        self.read += other.read;
        self.filtered += other.filtered;
        self.sent += other.sent;
        self.dropped += other.dropped;
        self.retried += other.retried;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates() {
        let mut total = ReaderStats::default();
        let a = ReaderStats {
            read: 10,
            filtered: 2,
            sent: 7,
            dropped: 1,
            retried: 4,
        };
        total.merge(&a);
        total.merge(&a);
        assert_eq!(total.read, 20);
        assert_eq!(total.sent, 14);
        assert_eq!(total.retried, 8);
    }
}
