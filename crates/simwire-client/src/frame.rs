//! Wire framing.
//!
//! Every unit on the connection is binary and starts with a textual header of
//! exactly four comma-joined parts: `operation,topic,type,payload`. The
//! payload may itself contain raw bytes — including the comma character — so
//! only the first three commas delimit the header; everything after the third
//! is opaque payload.

use bytes::Bytes;

use crate::errors::FrameError;

/// One decoded inbound unit. Ephemeral: produced by the codec, consumed
/// immediately by dispatch, never retained.
#[derive(Clone, Debug)]
pub struct Frame {
    /// The operation (first header part).
    pub operation: String,
    /// The topic name (second header part). Dispatch keys on this.
    pub topic: String,
    /// Fully-qualified message type of the payload (third header part).
    pub type_name: String,
    /// The raw payload: everything after the third comma.
    pub payload: Bytes,
}

impl Frame {
    /// Split an inbound unit into header parts and payload.
    ///
    /// Scans for the first three commas only; payload bytes are a zero-copy
    /// slice of the input.
    pub fn parse(data: &Bytes) -> Result<Self, FrameError> {
        let mut separators = [0usize; 3];
        let mut found = 0;
        for (idx, byte) in data.iter().enumerate() {
            if *byte == b',' {
                separators[found] = idx;
                found += 1;
                if found == 3 {
                    break;
                }
            }
        }
        if found < 3 {
            return Err(FrameError::MissingSeparators { found });
        }

        let part = |range: std::ops::Range<usize>| -> Result<String, FrameError> {
            std::str::from_utf8(&data[range])
                .map(str::to_owned)
                .map_err(|_| FrameError::HeaderEncoding)
        };

        Ok(Self {
            operation: part(0..separators[0])?,
            topic: part(separators[0] + 1..separators[1])?,
            type_name: part(separators[1] + 1..separators[2])?,
            payload: data.slice(separators[2] + 1..),
        })
    }
}

/// Build an outbound four-part message.
///
/// Outbound traffic (handshake requests, `sub`/`unsub`/`throttle`) is always
/// text; only the Connection Manager and Topic Multiplexer construct these.
pub fn encode_request(operation: &str, topic: &str, type_name: &str, payload: &str) -> String {
    [operation, topic, type_name, payload].join(",")
}
