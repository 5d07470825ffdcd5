//! J2534 PassThru types shared by generation and playback

mod constants;
mod filter;
pub mod symbolic;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use constants::{rx_status, tx_flags, ConnectFlags, FilterType, ProtocolId};
pub(crate) use constants::{parse_symbol, parse_u32};
pub use filter::Filter;

/// A PassThru message
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub protocol: ProtocolId,
    /// TxFlags used when the message is written
    #[serde(default)]
    pub tx_flags: u32,
    /// RxStatus reported when the message was read
    #[serde(default)]
    pub rx_status: u32,
    /// Receive timestamp in microseconds
    #[serde(default)]
    pub timestamp: u32,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(protocol: ProtocolId, data: &[u8]) -> Message {
        Message {
            protocol,
            tx_flags: 0,
            rx_status: 0,
            timestamp: 0,
            data: data.to_vec(),
        }
    }

    pub fn with_tx_flags(mut self, tx_flags: u32) -> Message {
        self.tx_flags = tx_flags;
        self
    }

    pub fn with_rx_status(mut self, rx_status: u32) -> Message {
        self.rx_status = rx_status;
        self
    }

    /// Echo of a message sent by this side of the channel
    pub fn transmitted(&self) -> bool {
        self.rx_status & rx_status::TX_MSG_TYPE != 0
    }

    /// Indication that the first frame of a multi-frame message arrived
    pub fn start_of_message(&self) -> bool {
        self.rx_status & rx_status::START_OF_MESSAGE != 0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("protocol", &self.protocol)
            .field("tx_flags", &format_args!("0x{:08x}", self.tx_flags))
            .field("rx_status", &format_args!("0x{:08x}", self.rx_status))
            .field("timestamp", &self.timestamp)
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// Formats bytes the way PassThru logs print them, uppercase and space separated.
pub fn format_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

/// Parses space separated hex bytes. Returns `None` if any token is not a single byte.
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    text.split_whitespace()
        .map(|token| match token.len() {
            1 | 2 => u8::from_str_radix(token, 16).ok(),
            _ => None,
        })
        .collect()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_hex(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_hex(&text).ok_or_else(|| serde::de::Error::custom(format!("Invalid hex data: {}", text)))
    }
}
