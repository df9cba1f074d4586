use crate::{
    AppState,
    api::{
        json::ApiJson,
        models::{
            DeletedResponse,
            activities::ActivityResponse,
            contacts::{ContactCreate, ContactImport, ContactResponse, ContactUpdate, ListContactsQuery},
            fields::trimmed,
            pagination::{PaginatedResponse, Pagination},
        },
    },
    auth::{subscription::ActiveTenant, tenant::TenantContext},
    db::handlers::{Activities, Contacts, Repository, activities::ActivityFilter, contacts::ContactFilter},
    errors::{Error, ErrorBody, Result},
    import::{ImportSummary, import_contacts},
    types::ContactId,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/contacts",
    tag = "contacts",
    summary = "List contacts",
    params(ListContactsQuery),
    responses(
        (status = 200, description = "Page of contacts", body = PaginatedResponse<ContactResponse>),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_contacts(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListContactsQuery>,
) -> Result<Json<PaginatedResponse<ContactResponse>>> {
    let filter = ContactFilter {
        skip: query.pagination.offset(),
        limit: query.pagination.limit(),
        status: query.status,
        source: trimmed(query.source),
        group_id: query.group_id,
        tag: trimmed(query.tag),
        search: trimmed(query.search),
        sort: query.sort.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Contacts::new(&mut conn, tenant.org_id);
    let contacts = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        contacts.into_iter().map(ContactResponse::from).collect(),
        &query.pagination,
        total,
    )))
}

#[utoipa::path(
    post,
    path = "/contacts",
    tag = "contacts",
    summary = "Create a contact",
    request_body = ContactCreate,
    responses(
        (status = 201, description = "Contact created", body = ContactResponse),
        (status = 400, description = "Invalid contact", body = ErrorBody),
        (status = 403, description = "Subscription expired", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_contact(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    ApiJson(body): ApiJson<ContactCreate>,
) -> Result<(StatusCode, Json<ContactResponse>)> {
    let request = body.into_db(tenant.user_id)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let contact = Contacts::new(&mut conn, tenant.org_id).create(&request).await?;

    Ok((StatusCode::CREATED, Json(contact.into())))
}

#[utoipa::path(
    get,
    path = "/contacts/{id}",
    tag = "contacts",
    summary = "Get a contact",
    params(("id" = String, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Contact", body = ContactResponse),
        (status = 404, description = "Contact not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_contact(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<ContactId>,
) -> Result<Json<ContactResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let contact = Contacts::new(&mut conn, tenant.org_id)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Contact", id))?;

    Ok(Json(contact.into()))
}

#[utoipa::path(
    patch,
    path = "/contacts/{id}",
    tag = "contacts",
    summary = "Update a contact",
    params(("id" = String, Path, description = "Contact ID")),
    request_body = ContactUpdate,
    responses(
        (status = 200, description = "Updated contact", body = ContactResponse),
        (status = 400, description = "Invalid patch", body = ErrorBody),
        (status = 404, description = "Contact not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_contact(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<ContactId>,
    ApiJson(body): ApiJson<ContactUpdate>,
) -> Result<Json<ContactResponse>> {
    let request = body.into_db()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let contact = Contacts::new(&mut conn, tenant.org_id).update(id, &request).await?;

    Ok(Json(contact.into()))
}

#[utoipa::path(
    delete,
    path = "/contacts/{id}",
    tag = "contacts",
    summary = "Delete a contact",
    description = "Hides the contact from every read. The row is kept.",
    params(("id" = String, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Contact deleted", body = DeletedResponse),
        (status = 404, description = "Contact not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_contact(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    Path(id): Path<ContactId>,
) -> Result<Json<DeletedResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Contacts::new(&mut conn, tenant.org_id).delete(id).await? {
        return Err(Error::not_found("Contact", id));
    }

    Ok(Json(DeletedResponse::new(id)))
}

#[utoipa::path(
    post,
    path = "/contacts/import",
    tag = "contacts",
    summary = "Import contacts",
    description = "Rows missing both name and email are skipped. Values containing `/` or `|` keep their first part.",
    request_body = ContactImport,
    responses(
        (status = 200, description = "Import summary", body = ImportSummary),
        (status = 400, description = "Too many rows", body = ErrorBody),
        (status = 403, description = "Subscription expired", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(rows = body.rows.len()))]
pub async fn import_contacts_csv(
    State(state): State<AppState>,
    ActiveTenant(tenant): ActiveTenant,
    ApiJson(body): ApiJson<ContactImport>,
) -> Result<Json<ImportSummary>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let summary = import_contacts(&mut conn, tenant.org_id, tenant.user_id, &body.rows).await?;

    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/contacts/{id}/activities",
    tag = "contacts",
    summary = "List a contact's activities",
    params(("id" = String, Path, description = "Contact ID"), Pagination),
    responses(
        (status = 200, description = "Page of activities, newest first", body = PaginatedResponse<ActivityResponse>),
        (status = 404, description = "Contact not found", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_contact_activities(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(id): Path<ContactId>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PaginatedResponse<ActivityResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Contacts::new(&mut conn, tenant.org_id).get_by_id(id).await?.is_none() {
        return Err(Error::not_found("Contact", id));
    }

    let filter = ActivityFilter {
        contact_id: Some(id),
        ..ActivityFilter::new(pagination.offset(), pagination.limit())
    };
    let mut repo = Activities::new(&mut conn, tenant.org_id);
    let activities = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        activities.into_iter().map(ActivityResponse::from).collect(),
        &pagination,
        total,
    )))
}
