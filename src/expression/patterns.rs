//! Table of extraction patterns used to parse PassThru log blocks.
//!
//! Every [`CommandKind`] declares an ordered list of fields. A command pattern is a primary extraction, pulling
//! the arguments of the call, and an optional secondary extraction pulling a trailing value such as the channel
//! returned by `PTConnect` or the `sent N of M messages` count. The group lists of both extractions together must
//! cover every declared field of the kind.
//!
//! The built-in table understands logs in the form
//! ```text
//! 20.742s ++ PTConnect(1, 6:ISO15765, 0x00000000, 500000, 0x0019FC18)
//!   returning ChannelID: 5
//! 20.743s   0:STATUS_NOERROR
//! ```
//! and can be replaced per kind from JSON with [`PatternTable::from_json`].
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::expression::error::Error;

/// Command named in a log block header
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize)]
pub enum CommandKind {
    #[strum(serialize = "PTOpen")]
    Open,
    #[strum(serialize = "PTConnect")]
    Connect,
    #[strum(serialize = "PTDisconnect")]
    Disconnect,
    #[strum(serialize = "PTClose")]
    Close,
    #[strum(serialize = "PTReadMsgs")]
    ReadMessages,
    #[strum(serialize = "PTWriteMsgs")]
    WriteMessages,
    #[strum(serialize = "PTStartMsgFilter")]
    StartFilter,
    #[strum(serialize = "PTStopMsgFilter")]
    StopFilter,
    #[strum(serialize = "PTIoctl")]
    Ioctl,
    Unknown,
}

/// A declared field. Numeric fields default to `-1` when extraction fails, descriptive ones to [`REGEX_FAILED`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub numeric: bool,
}

pub const REGEX_FAILED: &str = "REGEX_FAILED";
pub const NUMERIC_DEFAULT: &str = "-1";

impl FieldSpec {
    const fn numeric(name: &'static str) -> Self {
        FieldSpec { name, numeric: true }
    }

    const fn text(name: &'static str) -> Self {
        FieldSpec { name, numeric: false }
    }

    pub fn default_value(&self) -> &'static str {
        match self.numeric {
            true => NUMERIC_DEFAULT,
            false => REGEX_FAILED,
        }
    }
}

static OPEN_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("DeviceName"),
    FieldSpec::text("DevicePointer"),
    FieldSpec::numeric("DeviceId"),
];
static CONNECT_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("DeviceId"),
    FieldSpec::text("ProtocolId"),
    FieldSpec::text("ConnectFlags"),
    FieldSpec::numeric("BaudRate"),
    FieldSpec::text("ChannelPointer"),
    FieldSpec::numeric("ChannelId"),
];
static DISCONNECT_FIELDS: &[FieldSpec] = &[FieldSpec::numeric("ChannelId")];
static CLOSE_FIELDS: &[FieldSpec] = &[FieldSpec::numeric("DeviceId")];
static MESSAGES_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("ChannelId"),
    FieldSpec::text("MessagePointer"),
    FieldSpec::text("CountPointer"),
    FieldSpec::numeric("Timeout"),
    FieldSpec::numeric("MessagesProcessed"),
    FieldSpec::numeric("MessagesRequested"),
];
static START_FILTER_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("ChannelId"),
    FieldSpec::text("FilterType"),
    FieldSpec::text("MaskPointer"),
    FieldSpec::text("PatternPointer"),
    FieldSpec::text("FlowControlPointer"),
    FieldSpec::text("FilterPointer"),
    FieldSpec::numeric("FilterId"),
];
static STOP_FILTER_FIELDS: &[FieldSpec] = &[FieldSpec::numeric("ChannelId"), FieldSpec::numeric("FilterId")];
static IOCTL_FIELDS: &[FieldSpec] = &[
    FieldSpec::numeric("ChannelId"),
    FieldSpec::text("IoctlType"),
    FieldSpec::text("InputPointer"),
    FieldSpec::text("OutputPointer"),
    FieldSpec::numeric("ParameterCount"),
];

impl CommandKind {
    /// Fields every expression of this kind carries, in order.
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            CommandKind::Open => OPEN_FIELDS,
            CommandKind::Connect => CONNECT_FIELDS,
            CommandKind::Disconnect => DISCONNECT_FIELDS,
            CommandKind::Close => CLOSE_FIELDS,
            CommandKind::ReadMessages | CommandKind::WriteMessages => MESSAGES_FIELDS,
            CommandKind::StartFilter => START_FILTER_FIELDS,
            CommandKind::StopFilter => STOP_FILTER_FIELDS,
            CommandKind::Ioctl => IOCTL_FIELDS,
            CommandKind::Unknown => &[],
        }
    }
}

/// A compiled pattern and the capture groups holding its values.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub regex: Regex,
    pub groups: Vec<usize>,
    /// A missing match fills zero values instead of failure defaults, and is not reported.
    pub optional: bool,
}

impl Extraction {
    /// Returns the trimmed group values, or `None` when the pattern does not match.
    pub fn evaluate(&self, text: &str) -> Option<Vec<String>> {
        let captures = self.regex.captures(text)?;
        let values = self
            .groups
            .iter()
            .map(|idx| captures.get(*idx).map(|m| m.as_str().trim().to_string()).unwrap_or_default())
            .collect();
        Some(values)
    }
}

#[derive(Debug, Clone)]
pub struct CommandPattern {
    pub primary: Extraction,
    pub secondary: Option<Extraction>,
}

/// Patterns shared by all kinds: block headers, status lines and the nested message, filter and parameter blocks.
#[derive(Debug, Clone)]
pub struct SupportPatterns {
    /// Block header. Group 1 is the execution time in seconds, group 2 the command name.
    pub header: Regex,
    /// Trailing status line. Group 1 is the status, e.g. `0:STATUS_NOERROR`.
    pub status: Regex,
    /// Message header after the `Msg` marker: index, timestamp, protocol, size, flag kind, flag value, flag names.
    pub message: Regex,
    /// Filter message header: tag, index, protocol, size, flag value, flag names.
    pub filter_message: Regex,
    pub filter_null: Regex,
    /// Splits filter contents at each tag.
    pub filter_tag: Regex,
    /// A line of payload bytes, optionally led by the `\__` marker.
    pub data_line: Regex,
    /// Ioctl parameter line: id, name, value.
    pub ioctl_parameter: Regex,
}

#[derive(Debug, Clone)]
pub struct PatternTable {
    commands: HashMap<CommandKind, CommandPattern>,
    pub support: SupportPatterns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionDef {
    pub pattern: String,
    pub groups: Vec<usize>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPatternDef {
    pub primary: ExtractionDef,
    #[serde(default)]
    pub secondary: Option<ExtractionDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportPatternsDef {
    pub header: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub filter_message: Option<String>,
    pub filter_null: Option<String>,
    pub filter_tag: Option<String>,
    pub data_line: Option<String>,
    pub ioctl_parameter: Option<String>,
}

/// JSON form of a [`PatternTable`]. Kinds or support patterns left out keep their built-in definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternTableDef {
    #[serde(default)]
    pub commands: HashMap<CommandKind, CommandPatternDef>,
    #[serde(default)]
    pub support: SupportPatternsDef,
}

const POINTER: &str = r"(0x[0-9A-Fa-f]+)";

fn extraction(pattern: String, groups: &[usize]) -> ExtractionDef {
    ExtractionDef {
        pattern,
        groups: groups.to_vec(),
        optional: false,
    }
}

fn builtin_commands() -> HashMap<CommandKind, CommandPatternDef> {
    let messages = |name: &str, verb: &str| CommandPatternDef {
        primary: extraction(
            format!(r"{}\((\d+),\s*{POINTER},\s*{POINTER},\s*(\d+)\)", name),
            &[1, 2, 3, 4],
        ),
        secondary: Some(extraction(format!(r"{}\s+(\d+)\s+of\s+(\d+)\s+messages", verb), &[1, 2])),
    };

    HashMap::from([
        (
            CommandKind::Open,
            CommandPatternDef {
                primary: extraction(format!(r"PTOpen\(([^,]*),\s*{POINTER}\)"), &[1, 2]),
                secondary: Some(extraction(r"returning DeviceID:\s*(\d+)".into(), &[1])),
            },
        ),
        (
            CommandKind::Connect,
            CommandPatternDef {
                primary: extraction(
                    format!(r"PTConnect\((\d+),\s*(\d+:\w+),\s*{POINTER},\s*(\d+),\s*{POINTER}\)"),
                    &[1, 2, 3, 4, 5],
                ),
                secondary: Some(extraction(r"returning ChannelID:\s*(\d+)".into(), &[1])),
            },
        ),
        (
            CommandKind::Disconnect,
            CommandPatternDef {
                primary: extraction(r"PTDisconnect\((\d+)\)".into(), &[1]),
                secondary: None,
            },
        ),
        (
            CommandKind::Close,
            CommandPatternDef {
                primary: extraction(r"PTClose\((\d+)\)".into(), &[1]),
                secondary: None,
            },
        ),
        (CommandKind::ReadMessages, messages("PTReadMsgs", "read")),
        (CommandKind::WriteMessages, messages("PTWriteMsgs", "sent")),
        (
            CommandKind::StartFilter,
            CommandPatternDef {
                primary: extraction(
                    format!(
                        r"PTStartMsgFilter\((\d+),\s*(\d+:\w+),\s*{POINTER},\s*{POINTER},\s*{POINTER},\s*{POINTER}\)"
                    ),
                    &[1, 2, 3, 4, 5, 6],
                ),
                secondary: Some(extraction(r"returning FilterID:\s*(\d+)".into(), &[1])),
            },
        ),
        (
            CommandKind::StopFilter,
            CommandPatternDef {
                primary: extraction(r"PTStopMsgFilter\((\d+),\s*(\d+)\)".into(), &[1, 2]),
                secondary: None,
            },
        ),
        (
            CommandKind::Ioctl,
            CommandPatternDef {
                primary: extraction(
                    format!(r"PTIoctl\((\d+),\s*(\w+),\s*{POINTER},\s*{POINTER}\)"),
                    &[1, 2, 3, 4],
                ),
                secondary: Some(ExtractionDef {
                    pattern: r"(\d+)\s+parameter\(s\)".into(),
                    groups: vec![1],
                    optional: true,
                }),
            },
        ),
    ])
}

const HEADER: &str = r"(?m)^[ \t]*(\d+\.\d+)s[ \t]+\+\+[ \t]+(PT\w+)\(";
const STATUS: &str = r"(?m)^[ \t]*\d+\.\d+s[ \t]+(\d+:[A-Za-z0-9_]+)[ \t]*\r?$";
const MESSAGE: &str = r"^\[(\d+)\][ \t]+(\d+\.\d+)s\.[ \t]+(\d+:\w+)\.[ \t]+(\d+)[ \t]+bytes\.[ \t]+(TxF|RxS)=((?:0x)?[0-9A-Fa-f]+)[ \t]*(?:=[ \t]*([^\r\n]*))?";
const FILTER_MESSAGE: &str = r"^(Mask|Pattern|FlowControl)\[(\d+)\][ \t]+(\d+:\w+)\.[ \t]+(\d+)[ \t]+bytes\.[ \t]+TxF=((?:0x)?[0-9A-Fa-f]+)[ \t]*(?:=[ \t]*([^\r\n]*))?";
const FILTER_NULL: &str = r"^FlowControl[ \t]+is[ \t]+NULL";
const FILTER_TAG: &str = r"\s(Mask|Pattern|FlowControl)\b";
const DATA_LINE: &str = r"^[ \t]*(?:\\__)?[ \t]*((?:\[?[0-9A-Fa-f]{2}\]?[ \t]*)+)\r?$";
const IOCTL_PARAMETER: &str = r"(?m)^[ \t]*(\d+):(\w+)[ \t]*=[ \t]*(\S+)";

static BUILTIN: LazyLock<PatternTable> =
    LazyLock::new(|| PatternTable::compile(PatternTableDef::default()).expect("built-in patterns compile"));

fn compile_regex(name: &str, pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern).map_err(|e| Error::InvalidPattern {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn compile_extraction(kind: CommandKind, def: &ExtractionDef) -> Result<Extraction, Error> {
    let regex = compile_regex(&kind.to_string(), &def.pattern)?;
    if let Some(group) = def.groups.iter().find(|g| **g >= regex.captures_len()) {
        return Err(Error::InvalidPattern {
            name: kind.to_string(),
            reason: format!("group {} does not exist in {}", group, def.pattern),
        });
    }
    Ok(Extraction {
        regex,
        groups: def.groups.clone(),
        optional: def.optional,
    })
}

impl PatternTable {
    /// The built-in table
    pub fn builtin() -> &'static PatternTable {
        &BUILTIN
    }

    /// Compiles a table. Kinds missing from `def` use the built-in definitions.
    pub fn compile(def: PatternTableDef) -> Result<PatternTable, Error> {
        let mut definitions = builtin_commands();
        definitions.extend(def.commands);

        let mut commands = HashMap::new();
        for kind in CommandKind::iter().filter(|k| *k != CommandKind::Unknown) {
            let definition = definitions.get(&kind).ok_or(Error::MissingPattern(kind))?;
            let pattern = CommandPattern {
                primary: compile_extraction(kind, &definition.primary)?,
                secondary: definition
                    .secondary
                    .as_ref()
                    .map(|secondary| compile_extraction(kind, secondary))
                    .transpose()?,
            };

            let covered = pattern.primary.groups.len() + pattern.secondary.as_ref().map_or(0, |s| s.groups.len());
            if covered != kind.fields().len() {
                return Err(Error::FieldCount {
                    kind,
                    expected: kind.fields().len(),
                    found: covered,
                });
            }
            commands.insert(kind, pattern);
        }

        let support = def.support;
        let pick = |name: &str, custom: Option<String>, builtin: &str| {
            compile_regex(name, custom.as_deref().unwrap_or(builtin))
        };

        Ok(PatternTable {
            commands,
            support: SupportPatterns {
                header: pick("header", support.header, HEADER)?,
                status: pick("status", support.status, STATUS)?,
                message: pick("message", support.message, MESSAGE)?,
                filter_message: pick("filter_message", support.filter_message, FILTER_MESSAGE)?,
                filter_null: pick("filter_null", support.filter_null, FILTER_NULL)?,
                filter_tag: pick("filter_tag", support.filter_tag, FILTER_TAG)?,
                data_line: pick("data_line", support.data_line, DATA_LINE)?,
                ioctl_parameter: pick("ioctl_parameter", support.ioctl_parameter, IOCTL_PARAMETER)?,
            },
        })
    }

    pub fn from_json(json: &str) -> Result<PatternTable, Error> {
        let def: PatternTableDef = serde_json::from_str(json).map_err(|e| Error::InvalidDefinition(e.to_string()))?;
        Self::compile(def)
    }

    pub fn command(&self, kind: CommandKind) -> Option<&CommandPattern> {
        self.commands.get(&kind)
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        BUILTIN.clone()
    }
}
