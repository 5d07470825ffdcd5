use thiserror::Error;

use crate::expression::CommandKind;

/// Errors building a pattern table. Parsing a log never fails, mismatches are recorded on the expression instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid pattern {name}: {reason}")]
    InvalidPattern { name: String, reason: String },
    #[error("No pattern defined for {0}")]
    MissingPattern(CommandKind),
    #[error("Pattern for {kind} extracts {found} fields, expected {expected}")]
    FieldCount {
        kind: CommandKind,
        expected: usize,
        found: usize,
    },
    #[error("Invalid pattern table definition: {0}")]
    InvalidDefinition(String),
}
