use std::fmt;
use std::time::Duration;

use crate::passthru::Message;

/// Lifecycle of a playback session
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PlayerState {
    Idle,
    Connecting,
    /// A live channel is configured like the simulation channel with this id
    ChannelOpen(u32),
    Stopped,
    Faulted,
}

impl PlayerState {
    /// Playback loop has ended
    pub fn is_finished(&self) -> bool {
        matches!(self, PlayerState::Stopped | PlayerState::Faulted)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerState::ChannelOpen(channel_id) => write!(f, "ChannelOpen({})", channel_id),
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    StateChanged(PlayerState),
    ChannelChanged {
        from: Option<u32>,
        to: u32,
    },
    /// A live message matched no recorded request
    MessageUnmatched(Message),
    /// A live message matched a request of `channel_id`. `sent` tells whether `responses` went out.
    MessageProcessed {
        channel_id: u32,
        message: Message,
        responses: Vec<Message>,
        sent: bool,
    },
}

/// An event and the time since playback started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub elapsed: Duration,
    pub event: PlayerEvent,
}

/// Runtime control of a running player
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    SetResponsesEnabled(bool),
}
