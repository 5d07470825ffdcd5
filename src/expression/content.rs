//! Decomposition of the nested blocks inside a command: messages, filter messages and ioctl parameters.
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::expression::patterns::SupportPatterns;

/// One `Msg[N]` entry of a read or write command, as logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub index: String,
    pub timestamp: String,
    pub protocol: String,
    pub size: String,
    /// `TxF` for written messages, `RxS` for read ones
    pub flag_kind: String,
    pub flag_value: String,
    pub flag_names: String,
    /// Uppercase, space separated bytes. Frame continuation markers (`[` `]`) are kept.
    pub data: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum FilterTag {
    Mask,
    Pattern,
    FlowControl,
}

/// One of the mask, pattern and flow control messages of a filter start command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterContent {
    pub tag: FilterTag,
    pub index: String,
    pub protocol: String,
    pub size: String,
    pub flag_value: String,
    pub flag_names: String,
    pub data: String,
    /// Logged as `FlowControl is NULL`
    pub null: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoctlParameter {
    pub id: u32,
    pub name: String,
    pub value: String,
}

/// Collects the payload lines following a message header. The first line has to carry the `\__` marker.
fn collect_data<'a>(support: &SupportPatterns, mut lines: impl Iterator<Item = &'a str>) -> Option<String> {
    let first = lines.next()?;
    if !first.contains("\\__") {
        return None;
    }

    let mut tokens: Vec<String> = Vec::new();
    for line in std::iter::once(first).chain(lines) {
        let Some(captures) = support.data_line.captures(line) else {
            break;
        };
        let Some(bytes) = captures.get(1) else {
            break;
        };
        tokens.extend(bytes.as_str().split_whitespace().map(str::to_uppercase));
    }

    match tokens.is_empty() {
        true => None,
        false => Some(tokens.join(" ")),
    }
}

pub fn find_message_contents(support: &SupportPatterns, text: &str) -> Vec<MessageContent> {
    let mut contents = Vec::new();

    for segment in text.split("Msg").filter(|s| s.starts_with('[')) {
        let Some(captures) = support.message.captures(segment) else {
            debug!("Dropping unparseable message segment {:?}", segment.lines().next());
            continue;
        };
        let group = |idx: usize| captures.get(idx).map(|m| m.as_str().trim().to_string()).unwrap_or_default();

        let Some(data) = collect_data(support, segment.lines().skip(1)) else {
            debug!("Dropping message segment without payload {:?}", segment.lines().next());
            continue;
        };

        contents.push(MessageContent {
            index: group(1),
            timestamp: group(2),
            protocol: group(3),
            size: group(4),
            flag_kind: group(5),
            flag_value: group(6),
            flag_names: group(7),
            data,
        });
    }

    contents
}

pub fn find_filter_contents(support: &SupportPatterns, text: &str) -> Vec<FilterContent> {
    let starts: Vec<usize> = support
        .filter_tag
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.start()))
        .collect();

    let mut contents = Vec::new();
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let segment = &text[*start..end];

        if support.filter_null.is_match(segment) {
            contents.push(FilterContent {
                tag: FilterTag::FlowControl,
                index: "-1".into(),
                protocol: String::new(),
                size: "0".into(),
                flag_value: String::new(),
                flag_names: String::new(),
                data: String::new(),
                null: true,
            });
            continue;
        }

        let Some(captures) = support.filter_message.captures(segment) else {
            debug!("Dropping unparseable filter segment {:?}", segment.lines().next());
            continue;
        };
        let group = |idx: usize| captures.get(idx).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        let Ok(tag) = group(1).parse::<FilterTag>() else {
            continue;
        };
        let Some(data) = collect_data(support, segment.lines().skip(1)) else {
            debug!("Dropping filter segment without payload {:?}", segment.lines().next());
            continue;
        };

        contents.push(FilterContent {
            tag,
            index: group(2),
            protocol: group(3),
            size: group(4),
            flag_value: group(5),
            flag_names: group(6),
            data,
            null: false,
        });
    }

    contents
}

pub fn find_ioctl_parameters(support: &SupportPatterns, text: &str) -> Vec<IoctlParameter> {
    support
        .ioctl_parameter
        .captures_iter(text)
        .filter_map(|captures| {
            let id = captures.get(1)?.as_str().parse().ok()?;
            Some(IoctlParameter {
                id,
                name: captures.get(2)?.as_str().to_string(),
                value: captures.get(3)?.as_str().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::PatternTable;

    fn support() -> &'static SupportPatterns {
        &PatternTable::builtin().support
    }

    static READ_BLOCK: &str = "\
23.288s ++ PTReadMsgs(5, 0x0019FBF8, 0x0019FBF4, 100)
  Msg[0] 23.287s. 6:ISO15765. 4 bytes. RxS=0x00000009 = TX_MSG_TYPE | TX_INDICATION
  \\__ 00 00 07 df
  Msg[1] 23.290s. 6:ISO15765. 12 bytes. RxS=0x00000000
  \\__ [00 00 07 e8] 10 14 49 02
       01 31 47 31
  Msg[2] garbage
  read 3 of 3 messages
23.291s   0:STATUS_NOERROR
";

    #[test]
    fn read_messages_decomposed() {
        let contents = find_message_contents(support(), READ_BLOCK);
        assert_eq!(contents.len(), 2);

        assert_eq!(contents[0].index, "0");
        assert_eq!(contents[0].timestamp, "23.287");
        assert_eq!(contents[0].protocol, "6:ISO15765");
        assert_eq!(contents[0].size, "4");
        assert_eq!(contents[0].flag_kind, "RxS");
        assert_eq!(contents[0].flag_value, "0x00000009");
        assert_eq!(contents[0].flag_names, "TX_MSG_TYPE | TX_INDICATION");
        assert_eq!(contents[0].data, "00 00 07 DF");

        assert_eq!(contents[1].data, "[00 00 07 E8] 10 14 49 02 01 31 47 31");
        assert_eq!(contents[1].flag_names, "");
    }

    #[test]
    fn payload_stops_at_status_line() {
        let text = "  Msg[0] 0.000000s. 6:ISO15765. 2 bytes. TxF=0x00000040\n  \\__ 01 00\n20.743s   0:STATUS_NOERROR\n";
        let contents = find_message_contents(support(), text);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].data, "01 00");
    }

    #[test]
    fn filter_contents_by_tag() {
        let text = "\
20.745s ++ PTStartMsgFilter(5, 3:FLOW_CONTROL_FILTER, 0x0019FC00, 0x0019FC10, 0x0019FC20, 0x0019FC30)
  Mask[0] 6:ISO15765. 4 bytes. TxF=0x00000040 = ISO15765_FRAME_PAD
  \\__ ff ff ff ff
  Pattern[0] 6:ISO15765. 4 bytes. TxF=0x00000040
  \\__ 00 00 07 e8
  FlowControl is NULL
  returning FilterID: 0
";
        let contents = find_filter_contents(support(), text);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].tag, FilterTag::Mask);
        assert_eq!(contents[0].data, "FF FF FF FF");
        assert_eq!(contents[0].flag_names, "ISO15765_FRAME_PAD");
        assert_eq!(contents[1].tag, FilterTag::Pattern);
        assert_eq!(contents[1].data, "00 00 07 E8");
        assert_eq!(contents[2].tag, FilterTag::FlowControl);
        assert!(contents[2].null);
        assert_eq!(contents[2].index, "-1");
    }

    #[test]
    fn ioctl_parameters() {
        let text = "\
20.747s ++ PTIoctl(5, SET_CONFIG, 0x0019FC18, 0x00000000)
  2 parameter(s):
  1:DATA_RATE = 500000
  3:LOOPBACK = 0
20.748s   0:STATUS_NOERROR
";
        let parameters = find_ioctl_parameters(support(), text);
        assert_eq!(
            parameters,
            vec![
                IoctlParameter {
                    id: 1,
                    name: "DATA_RATE".into(),
                    value: "500000".into()
                },
                IoctlParameter {
                    id: 3,
                    name: "LOOPBACK".into(),
                    value: "0".into()
                },
            ]
        );
    }
}
