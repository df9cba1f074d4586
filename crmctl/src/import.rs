//! Bulk contact import from pre-mapped CSV rows.
//!
//! The client parses the file and maps its columns onto contact fields; each row arrives as a
//! JSON object. Only the fields in [`IMPORT_FIELDS`] are read, anything else in a row is ignored.
//! Rows are inserted one by one, so a bad row never takes the rest of the file down with it.

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgConnection;
use utoipa::ToSchema;

use crate::{
    db::{
        handlers::{Contacts, Repository},
        models::contacts::ContactCreateDBRequest,
    },
    errors::{Error, Result},
    types::{ContactStatus, OrganizationId, UserId},
};

/// Largest file accepted in one request
pub const MAX_IMPORT_ROWS: usize = 5000;

/// Errors reported back per import; the rest are only counted
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Row keys read by the importer. `jobTitle` is also accepted as `job_title`.
pub const IMPORT_FIELDS: [&str; 8] = ["name", "email", "phone", "company", "jobTitle", "status", "source", "notes"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub total: usize,
    /// First few failures, as `Row N: reason`
    pub errors: Vec<String>,
}

impl ImportSummary {
    fn skip(&mut self, row: usize, reason: impl std::fmt::Display) {
        self.skipped += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("Row {}: {reason}", row + 1));
        }
    }
}

/// Normalise one cell. Multi-valued cells (`a/b`, `a|b`) keep their first value.
pub fn clean_value(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    let first = raw.split(['/', '|']).next().unwrap_or_default().trim();
    (!first.is_empty()).then(|| first.to_string())
}

fn field(row: &Map<String, Value>, key: &str) -> Option<String> {
    let value = row.get(key).or_else(|| match key {
        "jobTitle" => row.get("job_title"),
        _ => None,
    })?;
    clean_value(value)
}

/// Turn a row into a create request, or explain why it cannot be imported.
pub fn parse_row(row: &Map<String, Value>, created_by: Option<UserId>) -> std::result::Result<ContactCreateDBRequest, String> {
    let name = field(row, "name");
    let email = field(row, "email");

    if name.is_none() && email.is_none() {
        return Err("missing both name and email".to_string());
    }
    if let Some(email) = &email
        && !email.contains('@')
    {
        return Err(format!("invalid email '{email}'"));
    }

    // Unrecognised statuses fall back to `new` rather than rejecting the row
    let status = field(row, "status")
        .and_then(|s| serde_json::from_value::<ContactStatus>(Value::String(s.to_lowercase())).ok())
        .unwrap_or(ContactStatus::New);

    Ok(ContactCreateDBRequest {
        created_by,
        name,
        email,
        phone: field(row, "phone"),
        company: field(row, "company"),
        job_title: field(row, "jobTitle"),
        status,
        source: field(row, "source").or_else(|| Some("import".to_string())),
        notes: field(row, "notes"),
        group_id: None,
        tags: vec![],
    })
}

/// Import rows into the tenant's contacts.
///
/// Always accounts for every row: `imported + skipped == total`.
#[tracing::instrument(skip(db, rows), fields(org_id = %org_id, rows = rows.len()), err)]
pub async fn import_contacts(
    db: &mut PgConnection,
    org_id: OrganizationId,
    user_id: UserId,
    rows: &[Map<String, Value>],
) -> Result<ImportSummary> {
    if rows.len() > MAX_IMPORT_ROWS {
        return Err(Error::invalid_field(
            "rows",
            format!("at most {MAX_IMPORT_ROWS} rows can be imported at once"),
        ));
    }

    let mut summary = ImportSummary {
        total: rows.len(),
        ..Default::default()
    };

    for (index, row) in rows.iter().enumerate() {
        let request = match parse_row(row, Some(user_id)) {
            Ok(request) => request,
            Err(reason) => {
                summary.skip(index, reason);
                continue;
            }
        };

        match Contacts::new(db, org_id).create(&request).await {
            Ok(_) => summary.imported += 1,
            Err(e) => {
                tracing::debug!(row = index + 1, error = %e, "Import row failed");
                summary.skip(index, "could not be saved");
            }
        }
    }

    tracing::info!(imported = summary.imported, skipped = summary.skipped, "Contact import finished");
    Ok(summary)
}
