//! JSON body extractor whose rejections use the API error shape.
//!
//! Plain `axum::Json` answers malformed bodies with a 4xx plain-text message. Request bodies here
//! go through [`ApiJson`] instead, so a bad body is a `VALIDATION_ERROR` naming the offending
//! field where serde reports one (unknown keys in patch bodies, wrong types, missing fields).

use axum::extract::{FromRequest, rejection::JsonRejection};

use crate::errors::{Error, FieldError};

#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct ApiJson<T>(pub T);

/// Pull the field name out of serde messages such as ``unknown field `foo`, expected ...``.
fn offending_field(message: &str) -> Option<(&str, &'static str)> {
    const KINDS: [(&str, &str); 3] = [
        ("unknown field `", "unknown field"),
        ("missing field `", "required"),
        ("duplicate field `", "given twice"),
    ];
    KINDS.iter().find_map(|(prefix, label)| {
        let start = message.find(prefix)? + prefix.len();
        let len = message[start..].find('`')?;
        Some((&message[start..start + len], *label))
    })
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        let fields = offending_field(&message)
            .map(|(field, label)| vec![FieldError::new(field, label)])
            .unwrap_or_default();
        Error::Validation { message, fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_field_names_from_serde_messages() {
        assert_eq!(
            offending_field("Failed to deserialize the JSON body into the target type: unknown field `orgId`, expected one of `name`"),
            Some(("orgId", "unknown field"))
        );
        assert_eq!(
            offending_field("missing field `title` at line 1 column 2"),
            Some(("title", "required"))
        );
        assert_eq!(offending_field("expected value at line 1 column 1"), None);
    }
}
