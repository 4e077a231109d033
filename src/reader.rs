//! Reader coordination shared by every mission reader.
//!
//! A reader owns one granule's worth of beam workers. Workers never return
//! values through a function boundary: they publish records, merge their
//! statistics, and signal completion. The last worker to finish posts the
//! stream terminator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::info;

use crate::alerts;
use crate::error::ReaderError;
use crate::fetch::Column;
use crate::publisher::Publisher;
use crate::stats::ReaderStats;

/// State guarded by the single coordinator mutex.
#[derive(Default)]
pub struct ReaderState {
    pub num_complete: usize,
    pub stats: ReaderStats,
    /// Ancillary datasets workers contribute for downstream writers.
    pub ancillary: HashMap<String, Column>,
}

/// Immutable coordination context shared by the workers of one reader.
pub struct ReaderShared {
    pub resource: String,
    pub outq: Publisher,
    pub send_terminator: bool,
    active: AtomicBool,
    thread_count: Mutex<usize>,
    state: Mutex<ReaderState>,
    complete: Condvar,
}

impl ReaderShared {
    pub fn new(resource: &str, outq: Publisher, send_terminator: bool) -> ReaderShared {
        ReaderShared {
            resource: resource.to_string(),
            outq,
            send_terminator,
            active: AtomicBool::new(true),
            thread_count: Mutex::new(0),
            state: Mutex::new(ReaderState::default()),
            complete: Condvar::new(),
        }
    }

    pub fn active(&self) -> &AtomicBool {
        &self.active
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop issuing new posts; workers drain after their current batch.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Record how many workers were spawned; completion counts against it.
    pub fn set_thread_count(&self, count: usize) {
        *self.thread_count.lock().unwrap() = count;
    }

    pub fn thread_count(&self) -> usize {
        *self.thread_count.lock().unwrap()
    }

    /// Stash an ancillary dataset for downstream writers. O(1) insert; the
    /// only lock held across this is the coordinator mutex itself.
    pub fn add_ancillary(&self, name: &str, column: Column) {
        self.state
            .lock()
            .unwrap()
            .ancillary
            .insert(name.to_string(), column);
    }

    /// The mandatory completion handshake. Merges worker statistics and, on
    /// the last completion, posts the terminator and signals the reader.
    pub fn finish_worker(&self, local_stats: ReaderStats) {
        let mut state = self.state.lock().unwrap();
        state.stats.merge(&local_stats);
        state.num_complete += 1;
        if state.num_complete == self.thread_count() {
            info!(resource = %self.resource, "completed processing resource");
            if self.send_terminator {
                self.outq.post_terminator(&self.active);
            }
            self.complete.notify_all();
        }
    }

    /// Used when the coordinator itself fails before spawning workers: emit
    /// an alert record and the terminator so consumers do not block.
    pub fn fail(&self, err: &ReaderError) {
        alerts::alert_error(
            &self.outq,
            err,
            &format!("failure on resource {}", self.resource),
        );
        if self.send_terminator {
            self.outq.post_terminator(&self.active);
        }
        let mut state = self.state.lock().unwrap();
        state.num_complete = self.thread_count();
        self.complete.notify_all();
    }

    /// Block until every worker has completed, or the timeout elapses.
    /// Returns whether completion was reached.
    pub fn wait_complete(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let (state, result) = self
            .complete
            .wait_timeout_while(state, timeout, |s| s.num_complete < self.thread_count())
            .unwrap();
        drop(state);
        !result.timed_out()
    }

    pub fn stats(&self) -> ReaderStats {
        self.state.lock().unwrap().stats
    }

    /// Snapshot and clear, mirroring the stats retrieval interface.
    pub fn take_stats(&self) -> ReaderStats {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.stats)
    }
}

/// Owns the worker threads of one reader; joining happens on drop so owned
/// fetch contexts outlive every worker.
pub struct WorkerSet {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerSet {
    pub fn new(workers: Vec<JoinHandle<()>>) -> WorkerSet {
        WorkerSet { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn join(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerSet {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::record_queue;
    use crate::records::decode_frame;
    use std::sync::Arc;

    #[test]
    fn last_worker_posts_terminator() {
        let (outq, consumer) = record_queue("recq", 8);
        let shared = Arc::new(ReaderShared::new("granule.h5", outq, true));
        shared.set_thread_count(3);

        let mut handles = Vec::new();
        for i in 0..3 {
            let shared = shared.clone();
            handles.push(std::thread::spawn(move || {
                let stats = ReaderStats {
                    read: i + 1,
                    ..Default::default()
                };
                shared.finish_worker(stats);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert!(shared.wait_complete(Duration::from_secs(1)));
        assert_eq!(shared.stats().read, 6);

        let frames = consumer.drain();
        assert_eq!(frames.len(), 1);
        let (frame, _) = decode_frame(&frames[0]).unwrap();
        assert!(frame.is_terminator());
    }

    #[test]
    fn coordinator_failure_still_terminates_stream() {
        let (outq, consumer) = record_queue("recq", 8);
        let shared = ReaderShared::new("missing.h5", outq, true);
        shared.fail(&ReaderError::ResourceDoesNotExist("missing.h5".to_string()));
        assert!(shared.wait_complete(Duration::from_millis(10)));

        let frames = consumer.drain();
        assert_eq!(frames.len(), 2); // alert then terminator
        let (alert, _) = decode_frame(&frames[0]).unwrap();
        assert_eq!(alert.rec_type.as_deref(), Some(crate::records::ALERT_REC_TYPE));
        let (term, _) = decode_frame(&frames[1]).unwrap();
        assert!(term.is_terminator());
    }

    #[test]
    fn deactivate_clears_active() {
        let (outq, _consumer) = record_queue("recq", 1);
        let shared = ReaderShared::new("granule.h5", outq, false);
        assert!(shared.is_active());
        shared.deactivate();
        assert!(!shared.is_active());
    }
}
