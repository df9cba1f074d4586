//! API request/response models for contacts.

use super::{
    fields::{check_email, trimmed, trimmed_patch},
    pagination::Pagination,
};
use crate::db::models::contacts::{ContactCreateDBRequest, ContactDBResponse, ContactSort, ContactUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::{ContactId, ContactStatus, GroupId, SortOrder, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::rust::double_option;
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing contacts
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListContactsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    pub status: Option<ContactStatus>,
    pub source: Option<String>,
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub group_id: Option<GroupId>,
    /// Only contacts carrying this tag name
    pub tag: Option<String>,
    /// Case-insensitive substring match on name, email, company and phone
    pub search: Option<String>,
    pub sort: Option<ContactSort>,
    pub order: Option<SortOrder>,
}

/// Request body for creating a contact. At least one of `name` and `email` is required.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactCreate {
    #[schema(example = "Ada Lovelace")]
    pub name: Option<String>,
    #[schema(example = "ada@example.com")]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    /// Defaults to `new`
    pub status: Option<ContactStatus>,
    pub source: Option<String>,
    pub notes: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub group_id: Option<GroupId>,
    /// Tag names; unknown tags are created
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ContactCreate {
    pub fn into_db(self, created_by: UserId) -> Result<ContactCreateDBRequest> {
        let name = trimmed(self.name);
        let email = trimmed(self.email);
        if name.is_none() && email.is_none() {
            return Err(Error::invalid_field("name", "a contact needs a name or an email"));
        }
        check_email("email", email.as_deref())?;

        Ok(ContactCreateDBRequest {
            created_by: Some(created_by),
            name,
            email,
            phone: trimmed(self.phone),
            company: trimmed(self.company),
            job_title: trimmed(self.job_title),
            status: self.status.unwrap_or(ContactStatus::New),
            source: trimmed(self.source),
            notes: trimmed(self.notes),
            group_id: self.group_id,
            tags: self.tags,
        })
    }
}

/// Partial contact update. Absent fields are untouched; `null` clears a field.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactUpdate {
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub name: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub company: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub job_title: Option<Option<String>>,
    pub status: Option<ContactStatus>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub source: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub notes: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub group_id: Option<Option<GroupId>>,
    /// Replaces the contact's tag set
    pub tags: Option<Vec<String>>,
}

impl ContactUpdate {
    pub fn into_db(self) -> Result<ContactUpdateDBRequest> {
        let name = trimmed_patch(self.name);
        let email = trimmed_patch(self.email);
        if matches!((&name, &email), (Some(None), Some(None))) {
            return Err(Error::invalid_field("name", "a contact needs a name or an email"));
        }
        if let Some(Some(email)) = &email {
            check_email("email", Some(email))?;
        }
        Ok(ContactUpdateDBRequest {
            name,
            email,
            phone: trimmed_patch(self.phone),
            company: trimmed_patch(self.company),
            job_title: trimmed_patch(self.job_title),
            status: self.status,
            source: trimmed_patch(self.source),
            notes: trimmed_patch(self.notes),
            group_id: self.group_id,
            tags: self.tags,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ContactId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub status: ContactStatus,
    pub source: Option<String>,
    pub notes: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub group_id: Option<GroupId>,
    pub tags: Vec<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ContactDBResponse> for ContactResponse {
    fn from(db: ContactDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            phone: db.phone,
            company: db.company,
            job_title: db.job_title,
            status: db.status,
            source: db.source,
            notes: db.notes,
            group_id: db.group_id,
            tags: db.tags,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Request body for a CSV import: rows already mapped onto contact fields by the client
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ContactImport {
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: ContactUpdate = serde_json::from_value(json!({"company": null, "name": "New"})).unwrap();
        assert_eq!(patch.company, Some(None));
        assert_eq!(patch.name, Some(Some("New".to_string())));
        assert_eq!(patch.phone, None);
    }

    #[test]
    fn patch_rejects_unknown_keys() {
        let err = serde_json::from_value::<ContactUpdate>(json!({"organizationId": "x"})).unwrap_err();
        assert!(err.to_string().contains("unknown field `organizationId`"));
    }

    #[test]
    fn create_needs_name_or_email() {
        let empty: ContactCreate = serde_json::from_value(json!({"company": "Acme"})).unwrap();
        assert!(empty.into_db(uuid::Uuid::new_v4()).is_err());

        let named: ContactCreate = serde_json::from_value(json!({"name": " X "})).unwrap();
        let db = named.into_db(uuid::Uuid::new_v4()).unwrap();
        assert_eq!(db.name.as_deref(), Some("X"));
        assert_eq!(db.status, ContactStatus::New);
    }

    #[test]
    fn patch_cannot_clear_both_name_and_email() {
        let patch: ContactUpdate = serde_json::from_str(r#"{"name": null, "email": "  "}"#).unwrap();
        let err = patch.into_db().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }), "{err:?}");

        let patch: ContactUpdate = serde_json::from_str(r#"{"name": null, "email": "ada@example.com"}"#).unwrap();
        assert!(patch.into_db().is_ok());
    }

    #[test]
    fn list_query_parses_from_query_string() {
        let query: ListContactsQuery =
            serde_urlencoded::from_str("page=2&limit=10&status=qualified&sort=name&order=asc&search=ada").unwrap();
        assert_eq!(query.pagination.page(), 2);
        assert_eq!(query.status, Some(ContactStatus::Qualified));
        assert_eq!(query.sort, Some(ContactSort::Name));
        assert_eq!(query.order, Some(SortOrder::Asc));
    }
}
