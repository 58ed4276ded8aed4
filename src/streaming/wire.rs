//! Wire format serialization and framing
//!
//! All viewer traffic, in both directions, uses length-prefixed frames
//! with a topic header:
//!
//! ```text
//! ┌──────────────────┬───────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Topic + NUL       │ Payload (variable)       │
//! │ Big-endian u32   │ UTF-8, 0x00 end   │ JSON or Postcard binary  │
//! └──────────────────┴───────────────────┴──────────────────────────┘
//! ```
//!
//! The length covers topic, separator and payload. Frames above 1MB
//! are rejected. JSON is the default payload format so dashboard
//! clients can consume records directly; postcard is available for
//! bandwidth-constrained deployments.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;

/// Maximum accepted frame body size
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WireFormat {
    /// Binary format using postcard - fast and compact
    Postcard,
    /// JSON format - human-readable, default for dashboard clients
    #[default]
    Json,
}

impl WireFormat {
    /// Parse a configuration value into a wire format
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "json" => Some(WireFormat::Json),
            "postcard" => Some(WireFormat::Postcard),
            _ => None,
        }
    }
}

/// Serializer that can handle both formats
#[derive(Clone)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    /// Serialize a payload to bytes
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(value).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize bytes to a payload
    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Encode a frame into a reusable buffer
pub fn encode_frame(topic: &str, payload: &[u8], buffer: &mut Vec<u8>) {
    buffer.clear();
    buffer.reserve(4 + topic.len() + 1 + payload.len());

    let frame_length = (topic.len() + 1 + payload.len()) as u32;
    buffer.extend_from_slice(&frame_length.to_be_bytes());
    buffer.extend_from_slice(topic.as_bytes());
    buffer.push(0); // Topic terminator
    buffer.extend_from_slice(payload);
}

/// Read one frame from the stream.
///
/// Returns `Ok(None)` when the read timed out before a length prefix
/// arrived, so callers can poll shutdown flags between frames.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Frame>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Other(format!("Frame too large: {} bytes", len)));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    let separator = body
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Serialization("frame missing topic terminator".to_string()))?;
    let topic = String::from_utf8_lossy(&body[..separator]).into_owned();
    let payload = body[separator + 1..].to_vec();

    Ok(Some(Frame { topic, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_round_trip() {
        let mut buffer = Vec::new();
        encode_frame("real-time-update", br#"{"sog":2.5}"#, &mut buffer);

        let mut cursor = Cursor::new(buffer);
        let frame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(frame.topic, "real-time-update");
        assert_eq!(frame.payload, br#"{"sog":2.5}"#);
    }

    #[test]
    fn test_frame_length_covers_topic_and_payload() {
        let mut buffer = Vec::new();
        encode_frame("ab", b"xyz", &mut buffer);

        // 2 (topic) + 1 (separator) + 3 (payload)
        assert_eq!(&buffer[..4], &6u32.to_be_bytes());
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&(MAX_FRAME_SIZE as u32 + 1).to_be_bytes());
        let mut cursor = Cursor::new(data);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn test_frame_without_separator_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(b"abcd");
        let mut cursor = Cursor::new(data);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn test_timeout_reads_as_no_frame() {
        struct TimedOutReader;
        impl Read for TimedOutReader {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(std::io::ErrorKind::TimedOut))
            }
        }
        assert!(read_frame(&mut TimedOutReader).unwrap().is_none());
    }

    #[test]
    fn test_wire_format_from_name() {
        assert_eq!(WireFormat::from_name("json"), Some(WireFormat::Json));
        assert_eq!(WireFormat::from_name("postcard"), Some(WireFormat::Postcard));
        assert_eq!(WireFormat::from_name("msgpack"), None);
    }

    #[test]
    fn test_serializer_formats_agree() {
        use crate::core::types::TelemetryRecord;
        let record = TelemetryRecord::from_fix(1.0, 2.0, 3.0, 4.0, 100.0);

        for format in [WireFormat::Json, WireFormat::Postcard] {
            let serializer = Serializer::new(format);
            let bytes = serializer.serialize(&record).unwrap();
            let decoded: TelemetryRecord = serializer.deserialize(&bytes).unwrap();
            assert_eq!(decoded, record);
        }
    }
}
