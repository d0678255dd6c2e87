use crate::protocol::{ClientCommand, CodecError, Envelope};
use thiserror::Error;

/// Connection state as seen by the session layer. A transport-level
/// "closing" state is reported as `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Connecting,
    Open,
    Closed,
}

impl ChannelState {
    /// Maps a websocket ready state (0 connecting, 1 open, 2 closing, 3 closed).
    pub fn from_ready_state(ready_state: u8) -> Self {
        match ready_state {
            0 => ChannelState::Connecting,
            1 => ChannelState::Open,
            _ => ChannelState::Closed,
        }
    }

    pub fn status(self) -> ChannelStatus {
        match self {
            ChannelState::Connecting => ChannelStatus::Connecting,
            ChannelState::Open => ChannelStatus::Connected,
            ChannelState::Closed => ChannelStatus::Disconnected,
        }
    }
}

/// User-facing connection label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Connecting => "CONNECTING",
            ChannelStatus::Connected => "CONNECTED",
            ChannelStatus::Disconnected => "DISCONNECTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Closed,
    RawText(String),
    Command(Envelope),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel is not open")]
    NotOpen,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One persistent message channel. Implementations deliver `ChannelEvent`s in
/// arrival order and know nothing about instances or logs.
pub trait ChannelSession {
    fn init(&mut self);

    /// Encodes and transmits. Commands sent while the channel is not open are
    /// dropped with `ChannelError::NotOpen`.
    fn send(&self, command: &ClientCommand) -> Result<(), ChannelError>;

    fn state(&self) -> ChannelState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_collapses_to_closed() {
        assert_eq!(ChannelState::from_ready_state(0), ChannelState::Connecting);
        assert_eq!(ChannelState::from_ready_state(1), ChannelState::Open);
        assert_eq!(ChannelState::from_ready_state(2), ChannelState::Closed);
        assert_eq!(ChannelState::from_ready_state(3), ChannelState::Closed);
    }

    #[test]
    fn status_labels() {
        assert_eq!(ChannelState::Connecting.status().as_str(), "CONNECTING");
        assert_eq!(ChannelState::Open.status().as_str(), "CONNECTED");
        assert_eq!(ChannelState::Closed.status().as_str(), "DISCONNECTED");
    }
}
