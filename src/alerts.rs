//! Alert records.
//!
//! Failures are surfaced to the downstream consumer as specially-typed
//! records on the same output queue as data, carrying a severity, a numeric
//! code, and a printable message. Consumers must tolerate alerts interleaved
//! arbitrarily with data records.

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, error, info, warn};

use crate::error::{ReaderError, Result, Severity};
use crate::publisher::Publisher;
use crate::records::{self, ALERT_REC_TYPE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    pub severity: Severity,
    pub code: i32,
    pub message: String,
}

impl AlertRecord {
    pub fn to_frame(&self) -> Vec<u8> {
        let msg = self.message.as_bytes();
        let mut payload = Vec::with_capacity(10 + msg.len());
        let mut word = [0u8; 4];
        LittleEndian::write_i32(&mut word, self.severity as i32);
        payload.extend_from_slice(&word);
        LittleEndian::write_i32(&mut word, self.code);
        payload.extend_from_slice(&word);
        let mut len = [0u8; 2];
        LittleEndian::write_u16(&mut len, msg.len() as u16);
        payload.extend_from_slice(&len);
        payload.extend_from_slice(msg);
        records::encode_frame(ALERT_REC_TYPE, &payload)
    }

    pub fn from_payload(payload: &[u8]) -> Result<AlertRecord> {
        if payload.len() < 10 {
            return Err(ReaderError::Decode("truncated alert".to_string()));
        }
        let severity = match LittleEndian::read_i32(&payload[..4]) {
            0 => Severity::Debug,
            1 => Severity::Info,
            2 => Severity::Warning,
            3 => Severity::Error,
            _ => Severity::Critical,
        };
        let code = LittleEndian::read_i32(&payload[4..8]);
        let len = LittleEndian::read_u16(&payload[8..10]) as usize;
        if payload.len() < 10 + len {
            return Err(ReaderError::Decode("truncated alert message".to_string()));
        }
        let message = String::from_utf8_lossy(&payload[10..10 + len]).into_owned();
        Ok(AlertRecord { severity, code, message })
    }
}

/// Log and post an alert. A full or closed queue only logs; alerts are
/// best-effort.
pub fn alert(outq: &Publisher, severity: Severity, code: i32, message: &str) {
    match severity {
        Severity::Debug => debug!("{message}"),
        Severity::Info => info!("{message}"),
        Severity::Warning => warn!("{message}"),
        Severity::Error | Severity::Critical => error!("{message}"),
    }
    let record = AlertRecord {
        severity,
        code,
        message: message.to_string(),
    };
    let _ = outq.post_copy(&record.to_frame());
}

/// Alert from a reader error, preserving its severity and code.
pub fn alert_error(outq: &Publisher, err: &ReaderError, context: &str) {
    alert(outq, err.severity(), err.code(), &format!("{context}: {err}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::record_queue;
    use crate::records::decode_frame;
    use std::time::Duration;

    #[test]
    fn alert_round_trip() {
        let record = AlertRecord {
            severity: Severity::Warning,
            code: -2,
            message: "ATL09 data unavailable".to_string(),
        };
        let frame = record.to_frame();
        let (decoded, _) = decode_frame(&frame).unwrap();
        assert_eq!(decoded.rec_type.as_deref(), Some(ALERT_REC_TYPE));
        assert_eq!(AlertRecord::from_payload(&decoded.payload).unwrap(), record);
    }

    #[test]
    fn alert_posts_to_queue() {
        let (publisher, consumer) = record_queue("recq", 4);
        let err = ReaderError::ResourceDoesNotExist("missing.h5".to_string());
        alert_error(&publisher, &err, "failure on resource");
        let frame = consumer.recv(Duration::from_millis(50)).unwrap();
        let (decoded, _) = decode_frame(&frame).unwrap();
        let alert = AlertRecord::from_payload(&decoded.payload).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert!(alert.message.contains("missing.h5"));
    }
}
