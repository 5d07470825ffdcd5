//! Rebuilds binary messages and filters from the text of parsed expressions.
//!
//! Conversions work per message: a malformed entry is logged and dropped, the other entries of the same
//! expression are still converted.

pub mod error;
pub mod frame;

use tracing::warn;

use crate::expression::{
    parse_execution_time, Command, Expression, FilterContent, FilterTag, MessageContent, StartFilterCommand,
};
use crate::passthru::{format_hex, parse_hex, parse_symbol, tx_flags, Filter, FilterType, Message, ProtocolId};
use crate::reconstruct::error::Error;

fn parse_protocol(text: &str) -> Result<ProtocolId, Error> {
    parse_symbol(text, ProtocolId::from_repr).ok_or_else(|| Error::UnknownProtocol(text.to_string()))
}

/// Flag words are always hex, with or without the `0x` prefix.
fn parse_flags(text: &str) -> Result<u32, Error> {
    let digits = text.trim();
    let digits = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits);
    u32::from_str_radix(digits, 16).map_err(|_| Error::InvalidFlags(text.to_string()))
}

/// Parses logged payload bytes, dropping frame continuation markers.
fn parse_payload(data: &str, size: &str) -> Result<Vec<u8>, Error> {
    let cleaned = data.replace(['[', ']'], " ");
    let bytes = parse_hex(&cleaned).ok_or_else(|| Error::InvalidData(data.to_string()))?;

    let declared: usize = size.trim().parse().map_err(|_| Error::InvalidData(size.to_string()))?;
    if declared != bytes.len() {
        return Err(Error::SizeMismatch {
            declared,
            found: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Converts one logged written message. Addressed ISO15765 payloads are rebuilt into their first physical frame.
pub fn write_message(content: &MessageContent) -> Result<Message, Error> {
    let protocol = parse_protocol(&content.protocol)?;
    let flags = parse_flags(&content.flag_value)?;
    let mut data = parse_payload(&content.data, &content.size)?;

    if frame::needs_framing(protocol, &data) {
        data = frame::frame(&data)?;
    }

    Ok(Message::new(protocol, &data).with_tx_flags(flags))
}

/// Converts one logged read message. Echoes of transmitted messages and start of message indications are not
/// responses and come back as `None`.
pub fn read_message(content: &MessageContent) -> Result<Option<Message>, Error> {
    let protocol = parse_protocol(&content.protocol)?;
    let status = parse_flags(&content.flag_value)?;
    let data = parse_payload(&content.data, &content.size)?;

    let mut message = Message::new(protocol, &data).with_rx_status(status);
    if message.transmitted() || message.start_of_message() {
        return Ok(None);
    }

    if protocol == ProtocolId::ISO15765 && data.len() <= frame::FRAME_LENGTH {
        message.tx_flags = tx_flags::ISO15765_FRAME_PAD;
    }
    // Microseconds since log start, saturating past the range of the J2534 field
    message.timestamp = parse_execution_time(&content.timestamp)
        .map(|t| u32::try_from(t.as_micros()).unwrap_or(u32::MAX))
        .unwrap_or_default();

    Ok(Some(message))
}

fn convert_messages<T>(
    expression: &Expression,
    convert: impl Fn(&MessageContent) -> Result<Option<T>, Error>,
) -> Vec<T> {
    expression
        .messages()
        .iter()
        .filter_map(|content| match convert(content) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping message {} of {}: {}", content.index, expression.kind(), e);
                None
            }
        })
        .collect()
}

/// Messages written by a `PTWriteMsgs` expression
pub fn convert_write_expression(expression: &Expression) -> Vec<Message> {
    match expression.command {
        Command::WriteMessages(_) => convert_messages(expression, |c| write_message(c).map(Some)),
        _ => {
            warn!("Not a write expression: {}", expression.kind());
            Vec::new()
        }
    }
}

/// Vehicle responses read by a `PTReadMsgs` expression
pub fn convert_read_expression(expression: &Expression) -> Vec<Message> {
    match expression.command {
        Command::ReadMessages(_) => convert_messages(expression, read_message),
        _ => {
            warn!("Not a read expression: {}", expression.kind());
            Vec::new()
        }
    }
}

fn find_tag(contents: &[FilterContent], tag: FilterTag) -> Option<&FilterContent> {
    contents.iter().find(|c| c.tag == tag && !c.null)
}

fn normalized_hex(content: &FilterContent) -> Result<String, Error> {
    parse_payload(&content.data, &content.size).map(|bytes| format_hex(&bytes))
}

/// Builds the filter started by a `PTStartMsgFilter` command. Mask, pattern and flow control messages are found
/// by their tag since their order differs between logging tools.
pub fn filter(command: &StartFilterCommand, inverted: bool) -> Result<Filter, Error> {
    let filter_type = parse_symbol(&command.filter_type, FilterType::from_repr)
        .ok_or_else(|| Error::UnknownFilterType(command.filter_type.clone()))?;

    let mask = find_tag(&command.contents, FilterTag::Mask).ok_or(Error::MissingFilterMessage("mask"))?;
    let pattern = find_tag(&command.contents, FilterTag::Pattern).ok_or(Error::MissingFilterMessage("pattern"))?;
    let flow_control = match filter_type {
        FilterType::FlowControl => {
            let flow = find_tag(&command.contents, FilterTag::FlowControl)
                .ok_or(Error::MissingFilterMessage("flow control"))?;
            normalized_hex(flow)?
        }
        FilterType::Pass | FilterType::Block => String::new(),
    };

    let filter = Filter {
        filter_type,
        protocol: parse_protocol(&mask.protocol)?,
        flags: parse_flags(&mask.flag_value)?,
        mask: normalized_hex(mask)?,
        pattern: normalized_hex(pattern)?,
        flow_control,
    };

    Ok(match inverted {
        true => filter.inverted(),
        false => filter,
    })
}

/// Filter started by a `PTStartMsgFilter` expression, or `None` if it cannot be rebuilt.
pub fn convert_filter_expression(expression: &Expression, inverted: bool) -> Option<Filter> {
    let Command::StartFilter(command) = &expression.command else {
        warn!("Not a filter expression: {}", expression.kind());
        return None;
    };

    match filter(command, inverted) {
        Ok(filter) => Some(filter),
        Err(e) => {
            warn!("Dropping filter started at {:?}: {}", expression.execution_time, e);
            None
        }
    }
}
