//! Connection lifecycle status.
//!
//! The only legal forward order is `Disconnected → Connected → Ready`.
//! `Error` is reachable from any state and is always followed by an implicit
//! `Disconnected`. `Disconnected` is both the initial value and the value
//! after any teardown.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the telemetry connection, observed by UI components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No socket, or torn down. The initial state.
    #[default]
    Disconnected,
    /// Handshake delivered the message schema; world and scene are still pending.
    Connected,
    /// Scene snapshot received; the connection is fully usable.
    Ready,
    /// A transport or authorization failure occurred. Transient: teardown
    /// follows immediately, moving back to `Disconnected`.
    Error,
}

impl ConnectionStatus {
    /// Human-readable status string, as surfaced to the UI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::Ready => "Ready",
            Self::Error => "Error",
        }
    }

    /// Whether the handshake has completed and topic data is flowing.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
