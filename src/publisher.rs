//! Bounded output queue for record frames.
//!
//! Producers block with a timeout; a transient full queue surfaces as
//! [`PostStatus::Timeout`] and workers loop-retry while the reader is
//! active. There is no retry cap per message; clearing the active flag is
//! the abort mechanism.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::counter;
use tracing::debug;

use crate::records;
use crate::stats::ReaderStats;

/// Default post timeout, matching the system-wide queue timeout the readers
/// use for every post.
pub const DEFAULT_POST_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a single post attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum PostStatus {
    Sent,
    /// Queue stayed full for the whole timeout; retryable.
    Timeout,
    /// Consumer is gone; fatal for the stream.
    Shutdown,
}

/// Sending half of the record queue.
#[derive(Clone)]
pub struct Publisher {
    tx: flume::Sender<Vec<u8>>,
    name: String,
    timeout: Duration,
}

/// Receiving half, handed to the downstream consumer.
pub struct Consumer {
    rx: flume::Receiver<Vec<u8>>,
}

/// Create a bounded record queue.
pub fn record_queue(name: &str, depth: usize) -> (Publisher, Consumer) {
    let (tx, rx) = flume::bounded(depth);
    (
        Publisher {
            tx,
            name: name.to_string(),
            timeout: DEFAULT_POST_TIMEOUT,
        },
        Consumer { rx },
    )
}

impl Publisher {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Publisher {
        self.timeout = timeout;
        self
    }

    /// Post a frame by copy. The caller keeps ownership of the buffer.
    pub fn post_copy(&self, frame: &[u8]) -> PostStatus {
        match self.tx.send_timeout(frame.to_vec(), self.timeout) {
            Ok(()) => {
                counter!("skimmer.outq.posted_total").increment(1);
                PostStatus::Sent
            }
            Err(flume::SendTimeoutError::Timeout(_)) => {
                counter!("skimmer.outq.timeout_total").increment(1);
                PostStatus::Timeout
            }
            Err(flume::SendTimeoutError::Disconnected(_)) => PostStatus::Shutdown,
        }
    }

    /// Post a frame by ownership transfer. On timeout the buffer comes back
    /// to the caller for the retry loop.
    pub fn post_ref(&self, frame: Vec<u8>) -> Result<(), PostError> {
        match self.tx.send_timeout(frame, self.timeout) {
            Ok(()) => {
                counter!("skimmer.outq.posted_total").increment(1);
                Ok(())
            }
            Err(flume::SendTimeoutError::Timeout(frame)) => {
                counter!("skimmer.outq.timeout_total").increment(1);
                Err(PostError::Timeout(frame))
            }
            Err(flume::SendTimeoutError::Disconnected(_)) => Err(PostError::Shutdown),
        }
    }

    /// Post one record frame, retrying transient timeouts while `active`
    /// holds, and account the outcome. One frame counts once as sent or
    /// dropped regardless of retries.
    pub fn post_record(&self, frame: Vec<u8>, active: &AtomicBool, stats: &mut ReaderStats) {
        let mut buf = frame;
        loop {
            if !active.load(Ordering::Acquire) {
                stats.dropped += 1;
                return;
            }
            match self.post_ref(buf) {
                Ok(()) => {
                    stats.sent += 1;
                    return;
                }
                Err(PostError::Timeout(frame)) => {
                    stats.retried += 1;
                    buf = frame;
                }
                Err(PostError::Shutdown) => {
                    debug!(queue = %self.name, "record dropped, consumer gone");
                    stats.dropped += 1;
                    return;
                }
            }
        }
    }

    /// Post the zero-length terminator frame, retrying transient timeouts
    /// while `active` holds. Always attempts at least one post.
    pub fn post_terminator(&self, active: &AtomicBool) -> PostStatus {
        loop {
            let status = self.post_copy(&records::terminator_frame());
            match status {
                PostStatus::Timeout if active.load(Ordering::Acquire) => {
                    debug!(queue = %self.name, "timeout posting terminator, trying again");
                }
                _ => return status,
            }
        }
    }
}

/// Failure of an ownership-transfer post.
#[derive(Debug)]
pub enum PostError {
    Timeout(Vec<u8>),
    Shutdown,
}

impl Consumer {
    /// Receive the next frame, blocking up to `timeout`.
    pub fn recv(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Drain whatever is currently queued.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn post_and_receive() {
        let (publisher, consumer) = record_queue("recq", 4);
        assert_eq!(publisher.post_copy(&[1, 2, 3]), PostStatus::Sent);
        assert_eq!(consumer.recv(Duration::from_millis(50)), Some(vec![1, 2, 3]));
    }

    #[test]
    fn full_queue_times_out_and_returns_buffer() {
        let (publisher, _consumer) = record_queue("recq", 1);
        let publisher = publisher.with_timeout(Duration::from_millis(10));
        assert_eq!(publisher.post_copy(&[1]), PostStatus::Sent);
        match publisher.post_ref(vec![9, 9]) {
            Err(PostError::Timeout(frame)) => assert_eq!(frame, vec![9, 9]),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn post_record_retries_until_space() {
        let (publisher, consumer) = record_queue("recq", 1);
        let publisher = publisher.with_timeout(Duration::from_millis(5));
        let active = Arc::new(AtomicBool::new(true));

        assert_eq!(publisher.post_copy(&[0]), PostStatus::Sent);

        let drainer = {
            let consumer = consumer;
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(40));
                let mut frames = Vec::new();
                while let Some(f) = consumer.recv(Duration::from_millis(100)) {
                    frames.push(f);
                }
                frames
            })
        };

        let mut stats = ReaderStats::default();
        publisher.post_record(vec![7], &active, &mut stats);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.dropped, 0);
        assert!(stats.retried >= 1);

        let frames = drainer.join().unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn inactive_reader_drops() {
        let (publisher, _consumer) = record_queue("recq", 1);
        let publisher = publisher.with_timeout(Duration::from_millis(5));
        let active = AtomicBool::new(true);
        let mut stats = ReaderStats::default();
        publisher.post_record(vec![1], &active, &mut stats); // fills queue
        active.store(false, Ordering::Release);
        publisher.post_record(vec![2], &active, &mut stats);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn terminator_is_zero_length_frame() {
        let (publisher, consumer) = record_queue("recq", 2);
        let active = AtomicBool::new(true);
        assert_eq!(publisher.post_terminator(&active), PostStatus::Sent);
        let frame = consumer.recv(Duration::from_millis(50)).unwrap();
        let (decoded, _) = records::decode_frame(&frame).unwrap();
        assert!(decoded.is_terminator());
    }
}
