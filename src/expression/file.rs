//! Saved expression sets. A log parsed once can be regenerated from its expressions file without parsing again.
use std::path::Path;

use tracing::info;

use crate::expression::Expression;
use crate::Result;

pub fn expressions_to_json(expressions: &[Expression]) -> Result<String> {
    Ok(serde_json::to_string_pretty(expressions)?)
}

pub fn expressions_from_json(json: &str) -> Result<Vec<Expression>> {
    Ok(serde_json::from_str(json)?)
}

pub fn save_expressions(path: impl AsRef<Path>, expressions: &[Expression]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, expressions_to_json(expressions)?)?;
    info!("Saved {} expressions to {}", expressions.len(), path.display());
    Ok(())
}

pub fn load_expressions(path: impl AsRef<Path>) -> Result<Vec<Expression>> {
    let path = path.as_ref();
    let expressions = expressions_from_json(&std::fs::read_to_string(path)?)?;
    info!("Loaded {} expressions from {}", expressions.len(), path.display());
    Ok(expressions)
}
