use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::passthru::symbolic::{baud_rate_from_symbolic, baud_rate_symbolic, SymbolicValue};
use crate::passthru::{ConnectFlags, Filter, Message, ProtocolId};

/// A written message and the responses read before the next write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePair {
    pub request: Message,
    #[serde(default)]
    pub responses: Vec<Message>,
}

impl MessagePair {
    pub fn new(request: Message, responses: Vec<Message>) -> Self {
        Self { request, responses }
    }
}

/// One recorded channel: its configuration, filters and the traffic seen on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChannelRecord", into = "ChannelRecord")]
pub struct SimulationChannel {
    pub channel_id: u32,
    pub protocol: ProtocolId,
    pub baud_rate: u32,
    pub connect_flags: ConnectFlags,
    pub filters: Vec<Filter>,
    pub message_pairs: Vec<MessagePair>,
    /// Distinct messages written on the channel
    pub messages_sent: Vec<Message>,
    /// Distinct messages read on the channel
    pub messages_read: Vec<Message>,
}

impl SimulationChannel {
    pub fn new(channel_id: u32, protocol: ProtocolId, baud_rate: u32, connect_flags: ConnectFlags) -> Self {
        Self {
            channel_id,
            protocol,
            baud_rate,
            connect_flags,
            filters: Vec::new(),
            message_pairs: Vec::new(),
            messages_sent: Vec::new(),
            messages_read: Vec::new(),
        }
    }

    /// First pair whose request bytes appear in `data`. Pairs with an empty request never match.
    pub fn find_pair(&self, data: &[u8]) -> Option<&MessagePair> {
        self.message_pairs
            .iter()
            .find(|pair| !pair.request.data.is_empty() && data.find(&pair.request.data).is_some())
    }
}

/// Keeps the first of each group of messages with identical data.
pub fn distinct_messages(messages: impl IntoIterator<Item = Message>) -> Vec<Message> {
    let mut distinct: Vec<Message> = Vec::new();
    for message in messages {
        if !distinct.iter().any(|m| m.data == message.data) {
            distinct.push(message);
        }
    }
    distinct
}

/// Persisted form of a channel. Baud rates are named after their protocol, so they are resolved here.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChannelRecord {
    channel_id: u32,
    protocol: ProtocolId,
    baud_rate: SymbolicValue,
    connect_flags: ConnectFlags,
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    message_pairs: Vec<MessagePair>,
    #[serde(default)]
    messages_sent: Vec<Message>,
    #[serde(default)]
    messages_read: Vec<Message>,
}

impl From<SimulationChannel> for ChannelRecord {
    fn from(channel: SimulationChannel) -> Self {
        ChannelRecord {
            channel_id: channel.channel_id,
            protocol: channel.protocol,
            baud_rate: baud_rate_symbolic(channel.protocol, channel.baud_rate),
            connect_flags: channel.connect_flags,
            filters: channel.filters,
            message_pairs: channel.message_pairs,
            messages_sent: channel.messages_sent,
            messages_read: channel.messages_read,
        }
    }
}

impl TryFrom<ChannelRecord> for SimulationChannel {
    type Error = String;

    fn try_from(record: ChannelRecord) -> Result<Self, Self::Error> {
        Ok(SimulationChannel {
            channel_id: record.channel_id,
            protocol: record.protocol,
            baud_rate: baud_rate_from_symbolic(&record.baud_rate)?,
            connect_flags: record.connect_flags,
            filters: record.filters,
            message_pairs: record.message_pairs,
            messages_sent: record.messages_sent,
            messages_read: record.messages_read,
        })
    }
}
