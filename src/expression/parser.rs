use std::time::Duration;

use tracing::warn;

use crate::expression::content::{find_filter_contents, find_ioctl_parameters, find_message_contents};
use crate::expression::patterns::{CommandKind, Extraction, FieldSpec, PatternTable};
use crate::expression::{Command, Expression, ParseFailure, ParseStage, DEFAULT_STATUS};

/// Markers of a read that timed out without data. Such blocks carry no `read N of M` line. [`parse_log`] already
/// drops `complete` blocks before parsing, the marker matters only to blocks handed to [`parse_expression`] directly.
///
/// [`parse_log`]: crate::expression::parse_log
const EMPTY_READ_MARKERS: &[&str] = &["PTReadMsgs() complete", "Zero messages received"];

/// Parses `seconds.fraction` into a duration with microsecond resolution.
pub(crate) fn parse_execution_time(text: &str) -> Option<Duration> {
    let (secs, frac) = text.trim().trim_end_matches('s').split_once('.')?;
    let secs: u64 = secs.parse().ok()?;

    let digits: String = frac.chars().take(6).collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let micros: u64 = format!("{:0<6}", digits).parse().ok()?;

    Some(Duration::from_secs(secs) + Duration::from_micros(micros))
}

fn defaults(fields: &[FieldSpec]) -> Vec<String> {
    fields.iter().map(|f| f.default_value().to_string()).collect()
}

fn zeroes(fields: &[FieldSpec]) -> Vec<String> {
    fields
        .iter()
        .map(|f| match f.numeric {
            true => "0".to_string(),
            false => String::new(),
        })
        .collect()
}

fn fail(kind: CommandKind, stage: ParseStage, fields: &[FieldSpec], diagnostics: &mut Vec<ParseFailure>) -> Vec<String> {
    let failure = ParseFailure {
        kind,
        stage,
        fields: fields.iter().map(|f| f.name.to_string()).collect(),
    };
    warn!("{}", failure);
    diagnostics.push(failure);
    defaults(fields)
}

fn extract(
    kind: CommandKind,
    stage: ParseStage,
    extraction: &Extraction,
    fields: &[FieldSpec],
    text: &str,
    diagnostics: &mut Vec<ParseFailure>,
) -> Vec<String> {
    match extraction.evaluate(text) {
        Some(values) => values,
        None if extraction.optional => zeroes(fields),
        None if kind == CommandKind::ReadMessages
            && stage == ParseStage::Secondary
            && EMPTY_READ_MARKERS.iter().any(|m| text.contains(m)) =>
        {
            zeroes(fields)
        }
        None => fail(kind, stage, fields, diagnostics),
    }
}

/// Parses one log block. Mismatches never abort: the affected fields get their defaults and the failure is
/// recorded on the expression and logged.
pub fn parse_expression(table: &PatternTable, text: &str) -> Expression {
    let mut diagnostics = Vec::new();

    let header = table.support.header.captures(text);
    let execution_time = header
        .as_ref()
        .and_then(|c| c.get(1))
        .and_then(|m| parse_execution_time(m.as_str()))
        .unwrap_or_default();
    let kind = header
        .as_ref()
        .and_then(|c| c.get(2))
        .and_then(|m| m.as_str().parse::<CommandKind>().ok())
        .unwrap_or(CommandKind::Unknown);

    if header.is_none() {
        let failure = ParseFailure {
            kind,
            stage: ParseStage::Header,
            fields: vec![],
        };
        warn!("{}", failure);
        diagnostics.push(failure);
    }

    let status = table
        .support
        .status
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_STATUS.to_string());

    let mut command = match table.command(kind) {
        Some(pattern) => {
            let fields = kind.fields();
            let (primary_fields, secondary_fields) = fields.split_at(pattern.primary.groups.len().min(fields.len()));

            let mut values = extract(kind, ParseStage::Primary, &pattern.primary, primary_fields, text, &mut diagnostics);
            if let Some(secondary) = &pattern.secondary {
                values.extend(extract(
                    kind,
                    ParseStage::Secondary,
                    secondary,
                    secondary_fields,
                    text,
                    &mut diagnostics,
                ));
            }
            Command::from_values(kind, values)
        }
        None => Command::Unknown,
    };

    match &mut command {
        Command::ReadMessages(c) | Command::WriteMessages(c) => {
            c.messages = find_message_contents(&table.support, text);
        }
        Command::StartFilter(c) => {
            c.contents = find_filter_contents(&table.support, text);
        }
        Command::Ioctl(c) => {
            c.parameters = find_ioctl_parameters(&table.support, text);
        }
        _ => {}
    }

    Expression {
        raw_text: text.to_string(),
        execution_time,
        status,
        command,
        diagnostics,
    }
}
