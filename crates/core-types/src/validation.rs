use crate::error::CoreError;
use crate::structs::TradeLine;
use std::collections::HashSet;

pub const MAX_MESSAGE_LEN: usize = 500;
pub const MAX_CANCEL_REASON_LEN: usize = 200;

/// Checks a line list: every quantity positive, no item listed twice, and at
/// least one line when `required` is set.
pub fn validate_lines(label: &str, lines: &[TradeLine], required: bool) -> Result<(), CoreError> {
    if required && lines.is_empty() {
        return Err(CoreError::Validation(format!("{label} must contain at least one item")));
    }
    let mut seen = HashSet::new();
    for line in lines {
        if line.item_id.trim().is_empty() {
            return Err(CoreError::Validation(format!("{label} contains an empty item id")));
        }
        if line.quantity == 0 {
            return Err(CoreError::Validation(format!(
                "{label}: quantity for item {} must be positive",
                line.item_id
            )));
        }
        if !seen.insert(line.item_id.as_str()) {
            return Err(CoreError::Validation(format!(
                "{label}: item {} is listed more than once",
                line.item_id
            )));
        }
    }
    Ok(())
}

/// Rejects free text longer than `max` characters.
pub fn validate_text(label: &str, text: Option<&str>, max: usize) -> Result<(), CoreError> {
    match text {
        Some(value) if value.chars().count() > max => Err(CoreError::Validation(format!(
            "{label} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}
