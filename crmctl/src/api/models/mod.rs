//! API request and response data models.
//!
//! API models are distinct from the database models in [`crate::db::models`]: they carry the
//! camelCase wire names, the OpenAPI annotations and the input validation, and convert into the
//! database requests with `into_db`.
//!
//! Patch bodies (`*Update`) reject unknown keys. In a patch, an absent field is left alone and an
//! explicit `null` clears a nullable field.

pub mod activities;
pub mod contacts;
pub mod dashboard;
pub mod deals;
pub mod fields;
pub mod organizations;
pub mod pagination;
pub mod pipeline;
pub mod tags;
pub mod tasks;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Response for a successful delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeletedResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub deleted: bool,
}

impl DeletedResponse {
    pub fn new(id: Uuid) -> Self {
        Self { id, deleted: true }
    }
}
