//! Typed command expressions parsed from PassThru log text.
//! ## Example
//! ```rust
//! use passthru_sim::expression::{parse_expression, CommandKind, PatternTable};
//!
//! let text = "20.742s ++ PTConnect(1, 6:ISO15765, 0x00000000, 500000, 0x0019FC18)\n  returning ChannelID: 5\n";
//! let expression = parse_expression(PatternTable::builtin(), text);
//!
//! assert_eq!(expression.kind(), CommandKind::Connect);
//! assert_eq!(expression.channel_id(), Some(5));
//! ```

pub mod content;
pub mod error;
mod file;
mod parser;
pub mod patterns;
pub mod splitter;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use content::{FilterContent, FilterTag, IoctlParameter, MessageContent};
pub use file::{expressions_from_json, expressions_to_json, load_expressions, save_expressions};
pub use parser::parse_expression;
pub(crate) use parser::parse_execution_time;
pub use patterns::{CommandKind, FieldSpec, PatternTable};
pub use splitter::{parse_log, split_log, ParseProgress};

/// Status assumed when a block has no status line
pub const DEFAULT_STATUS: &str = "0:STATUS_NOERROR";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenCommand {
    pub device_name: String,
    pub device_pointer: String,
    pub device_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectCommand {
    pub device_id: String,
    pub protocol_id: String,
    pub connect_flags: String,
    pub baud_rate: String,
    pub channel_pointer: String,
    /// Channel returned by the call
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectCommand {
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCommand {
    pub device_id: String,
}

/// `PTReadMsgs` and `PTWriteMsgs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesCommand {
    pub channel_id: String,
    pub message_pointer: String,
    pub count_pointer: String,
    pub timeout: String,
    /// Messages actually read or sent
    pub messages_processed: String,
    /// Messages asked for
    pub messages_requested: String,
    pub messages: Vec<MessageContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartFilterCommand {
    pub channel_id: String,
    pub filter_type: String,
    pub mask_pointer: String,
    pub pattern_pointer: String,
    pub flow_control_pointer: String,
    pub filter_pointer: String,
    pub filter_id: String,
    pub contents: Vec<FilterContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopFilterCommand {
    pub channel_id: String,
    pub filter_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoctlCommand {
    pub channel_id: String,
    pub ioctl_type: String,
    pub input_pointer: String,
    pub output_pointer: String,
    pub parameter_count: String,
    pub parameters: Vec<IoctlParameter>,
}

/// Per-kind fields of an expression, in the order [`CommandKind::fields`] declares them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Open(OpenCommand),
    Connect(ConnectCommand),
    Disconnect(DisconnectCommand),
    Close(CloseCommand),
    ReadMessages(MessagesCommand),
    WriteMessages(MessagesCommand),
    StartFilter(StartFilterCommand),
    StopFilter(StopFilterCommand),
    Ioctl(IoctlCommand),
    Unknown,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Open(_) => CommandKind::Open,
            Command::Connect(_) => CommandKind::Connect,
            Command::Disconnect(_) => CommandKind::Disconnect,
            Command::Close(_) => CommandKind::Close,
            Command::ReadMessages(_) => CommandKind::ReadMessages,
            Command::WriteMessages(_) => CommandKind::WriteMessages,
            Command::StartFilter(_) => CommandKind::StartFilter,
            Command::StopFilter(_) => CommandKind::StopFilter,
            Command::Ioctl(_) => CommandKind::Ioctl,
            Command::Unknown => CommandKind::Unknown,
        }
    }

    /// Assigns extracted values positionally. Missing trailing values are left empty.
    pub(crate) fn from_values(kind: CommandKind, values: Vec<String>) -> Command {
        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or_default();

        match kind {
            CommandKind::Open => Command::Open(OpenCommand {
                device_name: next(),
                device_pointer: next(),
                device_id: next(),
            }),
            CommandKind::Connect => Command::Connect(ConnectCommand {
                device_id: next(),
                protocol_id: next(),
                connect_flags: next(),
                baud_rate: next(),
                channel_pointer: next(),
                channel_id: next(),
            }),
            CommandKind::Disconnect => Command::Disconnect(DisconnectCommand { channel_id: next() }),
            CommandKind::Close => Command::Close(CloseCommand { device_id: next() }),
            CommandKind::ReadMessages | CommandKind::WriteMessages => {
                let command = MessagesCommand {
                    channel_id: next(),
                    message_pointer: next(),
                    count_pointer: next(),
                    timeout: next(),
                    messages_processed: next(),
                    messages_requested: next(),
                    messages: Vec::new(),
                };
                match kind {
                    CommandKind::ReadMessages => Command::ReadMessages(command),
                    _ => Command::WriteMessages(command),
                }
            }
            CommandKind::StartFilter => Command::StartFilter(StartFilterCommand {
                channel_id: next(),
                filter_type: next(),
                mask_pointer: next(),
                pattern_pointer: next(),
                flow_control_pointer: next(),
                filter_pointer: next(),
                filter_id: next(),
                contents: Vec::new(),
            }),
            CommandKind::StopFilter => Command::StopFilter(StopFilterCommand {
                channel_id: next(),
                filter_id: next(),
            }),
            CommandKind::Ioctl => Command::Ioctl(IoctlCommand {
                channel_id: next(),
                ioctl_type: next(),
                input_pointer: next(),
                output_pointer: next(),
                parameter_count: next(),
                parameters: Vec::new(),
            }),
            CommandKind::Unknown => Command::Unknown,
        }
    }

    fn values(&self) -> Vec<&str> {
        match self {
            Command::Open(c) => vec![&c.device_name, &c.device_pointer, &c.device_id],
            Command::Connect(c) => vec![
                &c.device_id,
                &c.protocol_id,
                &c.connect_flags,
                &c.baud_rate,
                &c.channel_pointer,
                &c.channel_id,
            ],
            Command::Disconnect(c) => vec![&c.channel_id],
            Command::Close(c) => vec![&c.device_id],
            Command::ReadMessages(c) | Command::WriteMessages(c) => vec![
                &c.channel_id,
                &c.message_pointer,
                &c.count_pointer,
                &c.timeout,
                &c.messages_processed,
                &c.messages_requested,
            ],
            Command::StartFilter(c) => vec![
                &c.channel_id,
                &c.filter_type,
                &c.mask_pointer,
                &c.pattern_pointer,
                &c.flow_control_pointer,
                &c.filter_pointer,
                &c.filter_id,
            ],
            Command::StopFilter(c) => vec![&c.channel_id, &c.filter_id],
            Command::Ioctl(c) => vec![
                &c.channel_id,
                &c.ioctl_type,
                &c.input_pointer,
                &c.output_pointer,
                &c.parameter_count,
            ],
            Command::Unknown => vec![],
        }
        .into_iter()
        .map(String::as_str)
        .collect()
    }
}

/// Which step of parsing a block failed to match.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ParseStage {
    Header,
    Primary,
    Secondary,
}

/// A recorded pattern mismatch. The affected fields hold their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub kind: CommandKind,
    pub stage: ParseStage,
    pub fields: Vec<String>,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} pattern did not match, defaulted [{}]", self.kind, self.stage, self.fields.join(", "))
    }
}

/// One parsed log command. Never modified after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    pub raw_text: String,
    /// Time since the start of the logged session
    pub execution_time: Duration,
    pub status: String,
    pub command: Command,
    pub diagnostics: Vec<ParseFailure>,
}

fn normalize(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

impl Expression {
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }

    /// Ordered field name and value pairs. Always holds every field declared for the kind.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        self.kind()
            .fields()
            .iter()
            .map(|spec| spec.name)
            .zip(self.command.values())
            .collect()
    }

    /// Field lookup ignoring case and whitespace
    pub fn field(&self, name: &str) -> Option<&str> {
        let name = normalize(name);
        self.fields()
            .into_iter()
            .find(|(field, _)| normalize(field) == name)
            .map(|(_, value)| value)
    }

    /// The channel this command ran on. `None` when the kind has no channel field, `Some(0)` when the field did
    /// not hold a usable id.
    pub fn channel_id(&self) -> Option<u32> {
        self.field("ChannelID").map(|value| value.parse().unwrap_or(0))
    }

    pub fn is_parsed_cleanly(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn messages(&self) -> &[MessageContent] {
        match &self.command {
            Command::ReadMessages(c) | Command::WriteMessages(c) => &c.messages,
            _ => &[],
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s {}", self.execution_time.as_secs_f64(), self.kind())?;
        for (name, value) in self.fields() {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}
