//! Client-side error types.

use thiserror::Error;

/// Errors returned by [`crate::TelemetryClient`] API calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The websocket dial failed before a connection existed.
    #[error("failed to connect to {url}: {reason}")]
    Transport {
        /// The URL that was dialed.
        url: String,
        /// The underlying websocket error.
        reason: String,
    },
}

/// Classification of an asynchronous connection failure.
///
/// The status stream only says `Error`; this tells the UI whether to show a
/// transport notification or prompt for new credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionFailure {
    /// A socket-level failure (dial, read, write, or schema delivery).
    Transport,
    /// The server rejected the authorization key with `invalid`.
    Unauthorized,
}

/// Errors from splitting an inbound unit into header and payload.
///
/// Frame errors are per-frame: the unit is dropped and logged, the
/// connection stays up.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Fewer than three comma separators before the payload.
    #[error("frame header has {found} separators, need 3")]
    MissingSeparators {
        /// How many commas were found.
        found: usize,
    },

    /// The header section is not valid UTF-8.
    #[error("frame header is not valid UTF-8")]
    HeaderEncoding,
}
