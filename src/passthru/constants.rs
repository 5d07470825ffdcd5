//! J2534 constants as they appear in PassThru logs.
use std::fmt;
use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString, FromRepr, IntoStaticStr};

/// Protocol ID passed to `PassThruConnect`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, EnumIter, FromRepr, IntoStaticStr)]
#[repr(u32)]
#[allow(non_camel_case_types)]
pub enum ProtocolId {
    J1850VPW = 0x01,
    J1850PWM = 0x02,
    ISO9141 = 0x03,
    ISO14230 = 0x04,
    CAN = 0x05,
    ISO15765 = 0x06,
    SCI_A_ENGINE = 0x07,
    SCI_A_TRANS = 0x08,
    SCI_B_ENGINE = 0x09,
    SCI_B_TRANS = 0x0a,
    CAN_PS = 0x8004,
    ISO15765_PS = 0x8005,
}

/// Filter type passed to `PassThruStartMsgFilter`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, EnumIter, FromRepr, IntoStaticStr)]
#[repr(u32)]
pub enum FilterType {
    #[strum(serialize = "PASS_FILTER")]
    Pass = 0x01,
    #[strum(serialize = "BLOCK_FILTER")]
    Block = 0x02,
    #[strum(serialize = "FLOW_CONTROL_FILTER")]
    FlowControl = 0x03,
}

/// TxFlags bits
pub mod tx_flags {
    pub const ISO15765_FRAME_PAD: u32 = 0x0000_0040;
    pub const ISO15765_ADDR_TYPE: u32 = 0x0000_0080;
    pub const CAN_29BIT_ID: u32 = 0x0000_0100;
    pub const WAIT_P3_MIN_ONLY: u32 = 0x0000_0200;
    pub const SW_CAN_HV_TX: u32 = 0x0000_0400;
    pub const SCI_MODE: u32 = 0x0040_0000;
    pub const SCI_TX_VOLTAGE: u32 = 0x0080_0000;
}

/// RxStatus bits
pub mod rx_status {
    /// Echo of a message this side transmitted
    pub const TX_MSG_TYPE: u32 = 0x0000_0001;
    /// First frame of a multi-frame message was received
    pub const START_OF_MESSAGE: u32 = 0x0000_0002;
    pub const RX_BREAK: u32 = 0x0000_0004;
    pub const TX_INDICATION: u32 = 0x0000_0008;
    pub const ISO15765_PADDING_ERROR: u32 = 0x0000_0010;
    pub const ISO15765_ADDR_TYPE: u32 = 0x0000_0080;
    pub const CAN_29BIT_ID: u32 = 0x0000_0100;
}

static CONNECT_FLAG_NAMES: &[(u32, &str)] = &[
    (0x0000_0100, "CAN_29BIT_ID"),
    (0x0000_0200, "ISO9141_NO_CHECKSUM"),
    (0x0000_0800, "CAN_ID_BOTH"),
    (0x0000_1000, "ISO9141_K_LINE_ONLY"),
];

/// Flags passed to `PassThruConnect`. Rendered as `NONE` or a `|` separated list of flag names.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct ConnectFlags(pub u32);

impl ConnectFlags {
    pub const NONE: ConnectFlags = ConnectFlags(0);
    pub const CAN_29BIT_ID: ConnectFlags = ConnectFlags(0x0000_0100);
    pub const ISO9141_NO_CHECKSUM: ConnectFlags = ConnectFlags(0x0000_0200);
    pub const CAN_ID_BOTH: ConnectFlags = ConnectFlags(0x0000_0800);
    pub const ISO9141_K_LINE_ONLY: ConnectFlags = ConnectFlags(0x0000_1000);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: ConnectFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for ConnectFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "NONE");
        }

        let mut names: Vec<String> = Vec::new();
        let mut remaining = self.0;
        for (bit, name) in CONNECT_FLAG_NAMES {
            if self.0 & bit != 0 {
                names.push(name.to_string());
                remaining &= !bit;
            }
        }
        if remaining != 0 {
            names.push(format!("0x{:08X}", remaining));
        }

        write!(f, "{}", names.join(" | "))
    }
}

impl fmt::Debug for ConnectFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectFlags(0x{:08x} {})", self.0, self)
    }
}

impl FromStr for ConnectFlags {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = 0;
        for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            if part == "NONE" {
                continue;
            }
            if let Some(value) = parse_u32(part) {
                bits |= value;
                continue;
            }
            match CONNECT_FLAG_NAMES.iter().find(|(_, name)| *name == part) {
                Some((bit, _)) => bits |= bit,
                None => return Err(format!("Unknown connect flag {}", part)),
            }
        }
        Ok(ConnectFlags(bits))
    }
}

impl From<u32> for ConnectFlags {
    fn from(bits: u32) -> ConnectFlags {
        ConnectFlags(bits)
    }
}

/// Parses a decimal or `0x` prefixed hexadecimal integer.
pub(crate) fn parse_u32(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Parses a logged enum token such as `6:ISO15765`, `ISO15765` or `6`. The symbolic part wins when both are present.
pub(crate) fn parse_symbol<T: FromStr>(text: &str, from_repr: fn(u32) -> Option<T>) -> Option<T> {
    let text = text.trim();
    let (number, name) = match text.split_once(':') {
        Some((number, name)) => (Some(number), Some(name)),
        None if text.chars().all(|c| c.is_ascii_digit()) => (Some(text), None),
        None => (None, Some(text)),
    };

    name.and_then(|name| name.trim().parse().ok())
        .or_else(|| number.and_then(|n| n.trim().parse().ok()).and_then(from_repr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_tokens() {
        assert_eq!(parse_symbol("6:ISO15765", ProtocolId::from_repr), Some(ProtocolId::ISO15765));
        assert_eq!(parse_symbol("5", ProtocolId::from_repr), Some(ProtocolId::CAN));
        assert_eq!(parse_symbol("J1850VPW", ProtocolId::from_repr), Some(ProtocolId::J1850VPW));
        assert_eq!(parse_symbol("99:BOGUS", ProtocolId::from_repr), None);
    }

    #[test]
    fn filter_type_tokens() {
        assert_eq!(
            parse_symbol("3:FLOW_CONTROL_FILTER", FilterType::from_repr),
            Some(FilterType::FlowControl)
        );
        assert_eq!(FilterType::Pass.to_string(), "PASS_FILTER");
    }

    #[test]
    fn connect_flags_names() {
        assert_eq!(ConnectFlags::NONE.to_string(), "NONE");

        let flags = ConnectFlags(0x0000_0900);
        assert_eq!(flags.to_string(), "CAN_29BIT_ID | CAN_ID_BOTH");
        assert_eq!("CAN_29BIT_ID | CAN_ID_BOTH".parse::<ConnectFlags>(), Ok(flags));
        assert_eq!("0x00000100".parse::<ConnectFlags>(), Ok(ConnectFlags::CAN_29BIT_ID));
        assert!("NOT_A_FLAG".parse::<ConnectFlags>().is_err());
    }
}
