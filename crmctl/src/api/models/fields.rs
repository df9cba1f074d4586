//! Input normalisation shared by the request models.

use crate::errors::{Error, Result};

/// Trim a free-text field; blank becomes absent.
pub fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Same as [`trimmed`] for a patch field: a blank value clears the column.
pub fn trimmed_patch(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(trimmed)
}

/// A required, non-blank text field.
pub fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::invalid_field(field, "must not be empty"));
    }
    Ok(value.to_string())
}

pub fn check_email(field: &str, email: Option<&str>) -> Result<()> {
    match email {
        Some(email) if !email.contains('@') => Err(Error::invalid_field(field, "must be an email address")),
        _ => Ok(()),
    }
}

/// `#rrggbb` colors only.
pub fn check_color(field: &str, color: Option<&str>) -> Result<()> {
    match color {
        Some(c) if !(c.len() == 7 && c.starts_with('#') && c[1..].chars().all(|ch| ch.is_ascii_hexdigit())) => {
            Err(Error::invalid_field(field, "must be a #rrggbb color"))
        }
        _ => Ok(()),
    }
}

pub fn check_probability(probability: Option<i32>) -> Result<()> {
    match probability {
        Some(p) if !(0..=100).contains(&p) => Err(Error::invalid_field("probability", "must be between 0 and 100")),
        _ => Ok(()),
    }
}
