//! OpenAPI documentation for the tenant API, the billing webhook and the job routes.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Bearer schemes: identity-provider tokens for tenants, a shared secret for the scheduler.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token from the identity provider:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```\n\n\
                            The first request for a new identity provisions its organization.",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CronSecret".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("The `jobs.cron_secret` configured for the deployment."))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "crmctl", description = "Multi-tenant CRM API: contacts, sales pipeline, tasks and activities."),
    servers(
        (url = "/api/v1", description = "Tenant API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::organizations::get_me,
        api::handlers::organizations::get_organization,
        api::handlers::organizations::update_organization,
        api::handlers::organizations::list_members,
        api::handlers::contacts::list_contacts,
        api::handlers::contacts::create_contact,
        api::handlers::contacts::get_contact,
        api::handlers::contacts::update_contact,
        api::handlers::contacts::delete_contact,
        api::handlers::contacts::import_contacts_csv,
        api::handlers::contacts::list_contact_activities,
        api::handlers::pipeline::list_stages,
        api::handlers::pipeline::update_stage,
        api::handlers::deals::list_deals,
        api::handlers::deals::create_deal,
        api::handlers::deals::get_deal,
        api::handlers::deals::update_deal,
        api::handlers::deals::move_deal_stage,
        api::handlers::deals::delete_deal,
        api::handlers::tasks::list_tasks,
        api::handlers::tasks::create_task,
        api::handlers::tasks::get_task,
        api::handlers::tasks::update_task,
        api::handlers::tasks::complete_task,
        api::handlers::tasks::delete_task,
        api::handlers::activities::list_activities,
        api::handlers::activities::create_activity,
        api::handlers::tags::list_tags,
        api::handlers::tags::create_tag,
        api::handlers::tags::delete_tag,
        api::handlers::contact_groups::list_groups,
        api::handlers::contact_groups::create_group,
        api::handlers::contact_groups::update_group,
        api::handlers::contact_groups::delete_group,
        api::handlers::dashboard::get_dashboard,
        api::handlers::billing::create_checkout,
        api::handlers::billing::create_portal,
        api::handlers::billing::billing_webhook,
        api::handlers::jobs::trial_warnings,
        api::handlers::jobs::task_reminders,
    ),
    components(
        schemas(
            crate::errors::ErrorBody,
            crate::types::PlanTier,
            crate::types::SubscriptionStatus,
            crate::types::Role,
            crate::types::ContactStatus,
            crate::types::TaskPriority,
            crate::types::ActivityType,
            crate::types::SortOrder,
            api::models::DeletedResponse,
            api::models::pagination::PageInfo,
        )
    ),
    tags(
        (name = "organization", description = "The caller, their organization and its members"),
        (name = "contacts", description = "Contacts and CSV import"),
        (name = "pipeline", description = "Pipeline stages"),
        (name = "deals", description = "Deals and stage moves"),
        (name = "tasks", description = "Tasks"),
        (name = "activities", description = "Activity timeline"),
        (name = "tags", description = "Contact tags"),
        (name = "groups", description = "Contact groups"),
        (name = "dashboard", description = "Summary figures"),
        (name = "billing", description = "Subscription billing"),
        (name = "jobs", description = "Periodic jobs, called by an external scheduler"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_declares_both_security_schemes() {
        let doc = ApiDoc::openapi();
        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("BearerAuth"));
        assert!(schemes.contains_key("CronSecret"));
    }

    #[test]
    fn document_covers_tenant_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/contacts", "/deals/{id}/stage", "/tasks/{id}/complete", "/dashboard", "/me"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
