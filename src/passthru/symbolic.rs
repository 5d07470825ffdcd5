//! Serde encoding for J2534 enums. Values are written as `{ "name": ..., "value": ... }` and read back from
//! that object, a bare symbolic name, or a bare number.
use serde::{Deserialize, Serialize};

use super::constants::{ConnectFlags, FilterType, ProtocolId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolicValue {
    Named { name: String, value: u32 },
    Value(u32),
    Name(String),
}

/// Enums with both a symbolic name and a raw J2534 value.
pub trait Symbolic: Sized {
    fn symbol(&self) -> String;
    fn value(&self) -> u32;
    fn from_symbol(name: &str) -> Option<Self>;
    fn from_value(value: u32) -> Option<Self>;

    fn to_symbolic(&self) -> SymbolicValue {
        SymbolicValue::Named {
            name: self.symbol(),
            value: self.value(),
        }
    }

    fn from_symbolic(symbolic: SymbolicValue) -> Result<Self, String> {
        let resolved = match &symbolic {
            SymbolicValue::Named { name, value } => Self::from_value(*value).or_else(|| Self::from_symbol(name)),
            SymbolicValue::Value(value) => Self::from_value(*value),
            SymbolicValue::Name(name) => Self::from_symbol(name),
        };
        resolved.ok_or_else(|| format!("Unrecognized value {:?}", symbolic))
    }
}

impl Symbolic for ProtocolId {
    fn symbol(&self) -> String {
        self.to_string()
    }
    fn value(&self) -> u32 {
        *self as u32
    }
    fn from_symbol(name: &str) -> Option<Self> {
        super::constants::parse_symbol(name, ProtocolId::from_repr)
    }
    fn from_value(value: u32) -> Option<Self> {
        ProtocolId::from_repr(value)
    }
}

impl Symbolic for FilterType {
    fn symbol(&self) -> String {
        self.to_string()
    }
    fn value(&self) -> u32 {
        *self as u32
    }
    fn from_symbol(name: &str) -> Option<Self> {
        super::constants::parse_symbol(name, FilterType::from_repr)
    }
    fn from_value(value: u32) -> Option<Self> {
        FilterType::from_repr(value)
    }
}

impl Symbolic for ConnectFlags {
    fn symbol(&self) -> String {
        self.to_string()
    }
    fn value(&self) -> u32 {
        self.bits()
    }
    fn from_symbol(name: &str) -> Option<Self> {
        name.parse().ok()
    }
    fn from_value(value: u32) -> Option<Self> {
        Some(ConnectFlags(value))
    }
}

macro_rules! symbolic_serde {
    ($($ty:ty),*) => {$(
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.to_symbolic().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let symbolic = SymbolicValue::deserialize(deserializer)?;
                <$ty>::from_symbolic(symbolic).map_err(serde::de::Error::custom)
            }
        }
    )*};
}

symbolic_serde!(ProtocolId, FilterType, ConnectFlags);

/// Baud rates are named after the protocol they run on, e.g. `ISO15765_500000`.
pub fn baud_rate_symbolic(protocol: ProtocolId, baud_rate: u32) -> SymbolicValue {
    SymbolicValue::Named {
        name: format!("{}_{}", protocol, baud_rate),
        value: baud_rate,
    }
}

pub fn baud_rate_from_symbolic(symbolic: &SymbolicValue) -> Result<u32, String> {
    match symbolic {
        SymbolicValue::Named { value, .. } | SymbolicValue::Value(value) => Ok(*value),
        SymbolicValue::Name(name) => name
            .rsplit('_')
            .next()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| format!("Unrecognized baud rate {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_written_with_name_and_value() {
        let json = serde_json::to_string(&ProtocolId::ISO15765).unwrap();
        assert_eq!(json, r#"{"name":"ISO15765","value":6}"#);
    }

    #[test]
    fn protocol_read_from_any_form() {
        let from_name: ProtocolId = serde_json::from_str(r#""CAN""#).unwrap();
        let from_value: ProtocolId = serde_json::from_str("6").unwrap();
        let from_token: ProtocolId = serde_json::from_str(r#""6:ISO15765""#).unwrap();
        assert_eq!(from_name, ProtocolId::CAN);
        assert_eq!(from_value, ProtocolId::ISO15765);
        assert_eq!(from_token, ProtocolId::ISO15765);

        assert!(serde_json::from_str::<ProtocolId>("1234").is_err());
    }

    #[test]
    fn filter_type_and_flags() {
        let filter: FilterType = serde_json::from_str(r#""FLOW_CONTROL_FILTER""#).unwrap();
        assert_eq!(filter, FilterType::FlowControl);

        let flags: ConnectFlags = serde_json::from_str(r#"{"name":"CAN_29BIT_ID","value":256}"#).unwrap();
        assert_eq!(flags, ConnectFlags::CAN_29BIT_ID);
        let flags: ConnectFlags = serde_json::from_str(r#""CAN_ID_BOTH""#).unwrap();
        assert_eq!(flags, ConnectFlags::CAN_ID_BOTH);
    }

    #[test]
    fn baud_rate_names() {
        let symbolic = baud_rate_symbolic(ProtocolId::ISO15765, 500000);
        assert_eq!(baud_rate_from_symbolic(&symbolic), Ok(500000));
        assert_eq!(baud_rate_from_symbolic(&SymbolicValue::Name("CAN_250000".into())), Ok(250000));
        assert!(baud_rate_from_symbolic(&SymbolicValue::Name("FAST".into())).is_err());
    }
}
