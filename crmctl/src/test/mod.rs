//! End-to-end tests through the full router: token verification, tenant resolution, the
//! subscription gate, handlers and repositories against a real database.

use crate::test_utils::{TEST_CRON_SECRET, bearer, create_test_app, create_test_app_with_config, create_test_config};
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Value, json};
use sqlx::PgPool;
use std::time::Duration;

async fn stage_id(server: &axum_test::TestServer, who: &str, pick: impl Fn(&Value) -> bool) -> String {
    let stages: Value = server.get("/api/v1/pipeline/stages").add_header("authorization", bearer(who)).await.json();
    let stage = stages.as_array().unwrap().iter().find(|s| pick(s)).expect("stage exists");
    stage["id"].as_str().unwrap().to_string()
}

#[sqlx::test]
#[test_log::test]
async fn test_e2e_new_identity_gets_a_tenant_and_isolation_holds(pool: PgPool) {
    let server = create_test_app(pool.clone()).await;

    let me = server.get("/api/v1/me").add_header("authorization", bearer("ext|abc")).await;
    me.assert_status_ok();
    let me: Value = me.json();
    assert_eq!(me["role"], "admin");
    assert_eq!(me["plan"], "trial");
    assert_eq!(me["subscriptionStatus"], "trialing");
    assert_eq!(me["isExpired"], false);

    let created = server
        .post("/api/v1/contacts")
        .add_header("authorization", bearer("ext|abc"))
        .json(&json!({"name": "X"}))
        .await;
    created.assert_status(StatusCode::CREATED);
    let contact: Value = created.json();
    let id = contact["id"].as_str().unwrap().to_string();
    assert_eq!(contact["status"], "new");

    server
        .get(&format!("/api/v1/contacts/{id}"))
        .add_header("authorization", bearer("ext|abc"))
        .await
        .assert_status_ok();

    // A second identity gets its own organization and cannot see the first one's data
    let other: Value = server
        .post("/api/v1/contacts")
        .add_header("authorization", bearer("ext|other"))
        .json(&json!({"name": "Y"}))
        .await
        .json();
    let other_id = other["id"].as_str().unwrap();

    let cross = server
        .get(&format!("/api/v1/contacts/{other_id}"))
        .add_header("authorization", bearer("ext|abc"))
        .await;
    cross.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(cross.json::<Value>()["error"]["code"], "NOT_FOUND");

    server
        .delete(&format!("/api/v1/contacts/{other_id}"))
        .add_header("authorization", bearer("ext|abc"))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let organizations = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM organizations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(organizations, 2);
}

#[sqlx::test]
#[test_log::test]
async fn test_expired_subscription_blocks_writes_but_not_reads(pool: PgPool) {
    let server = create_test_app(pool.clone()).await;
    let tenant = crate::test_utils::provision_test_tenant(&pool, "ext|lapsed").await;

    sqlx::query("UPDATE organizations SET trial_ends_at = $2 WHERE id = $1")
        .bind(tenant.org_id)
        .bind(Utc::now() - chrono::Duration::days(1))
        .execute(&pool)
        .await
        .unwrap();

    let me: Value = server.get("/api/v1/me").add_header("authorization", bearer("ext|lapsed")).await.json();
    assert_eq!(me["isExpired"], true);

    let write = server
        .post("/api/v1/contacts")
        .add_header("authorization", bearer("ext|lapsed"))
        .json(&json!({"name": "Blocked"}))
        .await;
    write.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(write.json::<Value>()["error"]["code"], "SUBSCRIPTION_EXPIRED");

    server
        .get("/api/v1/contacts")
        .add_header("authorization", bearer("ext|lapsed"))
        .await
        .assert_status_ok();

    // Expired admins can still reach checkout
    server
        .post("/api/v1/billing/checkout")
        .add_header("authorization", bearer("ext|lapsed"))
        .json(&json!({"plan": "basic"}))
        .await
        .assert_status_ok();
}

#[sqlx::test]
#[test_log::test]
async fn test_list_pagination_envelope(pool: PgPool) {
    let server = create_test_app(pool).await;

    for name in ["A", "B", "C"] {
        server
            .post("/api/v1/contacts")
            .add_header("authorization", bearer("ext|pages"))
            .json(&json!({"name": name}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let page: Value = server
        .get("/api/v1/contacts?page=2&limit=2")
        .add_header("authorization", bearer("ext|pages"))
        .await
        .json();
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["pagination"], json!({"page": 2, "limit": 2, "total": 3, "totalPages": 2}));

    let clamped: Value = server
        .get("/api/v1/contacts?limit=1000")
        .add_header("authorization", bearer("ext|pages"))
        .await
        .json();
    assert_eq!(clamped["pagination"]["limit"], 100);
    assert_eq!(clamped["pagination"]["page"], 1);
}

#[sqlx::test]
#[test_log::test]
async fn test_patch_rejects_unknown_fields(pool: PgPool) {
    let server = create_test_app(pool).await;
    let contact: Value = server
        .post("/api/v1/contacts")
        .add_header("authorization", bearer("ext|patch"))
        .json(&json!({"name": "Ada"}))
        .await
        .json();
    let id = contact["id"].as_str().unwrap();

    let response = server
        .patch(&format!("/api/v1/contacts/{id}"))
        .add_header("authorization", bearer("ext|patch"))
        .json(&json!({"nickname": "A"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "VALIDATION_ERROR");

    let cleared: Value = server
        .patch(&format!("/api/v1/contacts/{id}"))
        .add_header("authorization", bearer("ext|patch"))
        .json(&json!({"company": "Analytical Engines", "phone": null}))
        .await
        .json();
    assert_eq!(cleared["company"], "Analytical Engines");
    assert_eq!(cleared["name"], "Ada");

    // Ada has no email, so the name cannot be cleared
    let nameless = server
        .patch(&format!("/api/v1/contacts/{id}"))
        .add_header("authorization", bearer("ext|patch"))
        .json(&json!({"name": null}))
        .await;
    nameless.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = nameless.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "name");
}

#[sqlx::test]
#[test_log::test]
async fn test_winning_a_deal_closes_it_and_updates_the_contact(pool: PgPool) {
    let server = create_test_app(pool).await;
    let who = "ext|pipeline";

    let contact: Value = server
        .post("/api/v1/contacts")
        .add_header("authorization", bearer(who))
        .json(&json!({"name": "Buyer", "email": "buyer@example.com"}))
        .await
        .json();
    let contact_id = contact["id"].as_str().unwrap();

    let first_stage = stage_id(&server, who, |s| s["position"] == 1).await;
    let won_stage = stage_id(&server, who, |s| s["isWon"] == true).await;

    let deal = server
        .post("/api/v1/deals")
        .add_header("authorization", bearer(who))
        .json(&json!({"title": "Annual licence", "stageId": first_stage, "contactId": contact_id, "value": 1200}))
        .await;
    deal.assert_status(StatusCode::CREATED);
    let deal: Value = deal.json();
    let deal_id = deal["id"].as_str().unwrap();
    assert_eq!(deal["probability"], 10);
    assert_eq!(deal["actualClose"], Value::Null);

    let moved = server
        .patch(&format!("/api/v1/deals/{deal_id}/stage"))
        .add_header("authorization", bearer(who))
        .json(&json!({"stageId": won_stage}))
        .await;
    moved.assert_status_ok();
    let moved: Value = moved.json();
    assert_eq!(moved["contactStatus"], "customer");
    assert_eq!(moved["fromStageId"], first_stage.as_str());
    assert!(moved["deal"]["actualClose"].is_string());
    assert_eq!(moved["deal"]["probability"], 100);

    let contact: Value = server
        .get(&format!("/api/v1/contacts/{contact_id}"))
        .add_header("authorization", bearer(who))
        .await
        .json();
    assert_eq!(contact["status"], "customer");

    let timeline: Value = server
        .get(&format!("/api/v1/activities?dealId={deal_id}"))
        .add_header("authorization", bearer(who))
        .await
        .json();
    let mut types: Vec<&str> = timeline["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["type"].as_str().unwrap())
        .collect();
    types.sort_unstable();
    assert_eq!(types, vec!["deal_created", "deal_won"]);
}

#[sqlx::test]
#[test_log::test]
async fn test_archived_deals_leave_lists_but_stay_readable(pool: PgPool) {
    let server = create_test_app(pool).await;
    let who = "ext|archive";
    let stage = stage_id(&server, who, |s| s["position"] == 1).await;

    let deal: Value = server
        .post("/api/v1/deals")
        .add_header("authorization", bearer(who))
        .json(&json!({"title": "Old deal", "stageId": stage}))
        .await
        .json();
    let deal_id = deal["id"].as_str().unwrap();

    let deleted: Value = server
        .delete(&format!("/api/v1/deals/{deal_id}"))
        .add_header("authorization", bearer(who))
        .await
        .json();
    assert_eq!(deleted, json!({"id": deal_id, "deleted": true}));

    let listed: Value = server.get("/api/v1/deals").add_header("authorization", bearer(who)).await.json();
    assert_eq!(listed["pagination"]["total"], 0);

    let with_archived: Value = server
        .get("/api/v1/deals?includeArchived=true")
        .add_header("authorization", bearer(who))
        .await
        .json();
    assert_eq!(with_archived["pagination"]["total"], 1);

    let fetched: Value = server
        .get(&format!("/api/v1/deals/{deal_id}"))
        .add_header("authorization", bearer(who))
        .await
        .json();
    assert_eq!(fetched["isArchived"], true);
}

#[sqlx::test]
#[test_log::test]
async fn test_completing_a_task_twice_logs_one_activity(pool: PgPool) {
    let server = create_test_app(pool).await;
    let who = "ext|tasks";

    let task: Value = server
        .post("/api/v1/tasks")
        .add_header("authorization", bearer(who))
        .json(&json!({"title": "Call back", "priority": "high"}))
        .await
        .json();
    let task_id = task["id"].as_str().unwrap();
    assert_eq!(task["isCompleted"], false);

    for _ in 0..2 {
        let done: Value = server
            .post(&format!("/api/v1/tasks/{task_id}/complete"))
            .add_header("authorization", bearer(who))
            .await
            .json();
        assert_eq!(done["isCompleted"], true);
    }

    let completions: Value = server
        .get("/api/v1/activities?type=task_completed")
        .add_header("authorization", bearer(who))
        .await
        .json();
    assert_eq!(completions["pagination"]["total"], 1);

    server
        .delete(&format!("/api/v1/tasks/{task_id}"))
        .add_header("authorization", bearer(who))
        .await
        .assert_status_ok();
    server
        .get(&format!("/api/v1/tasks/{task_id}"))
        .add_header("authorization", bearer(who))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[sqlx::test]
#[test_log::test]
async fn test_import_skips_rows_without_name_or_email(pool: PgPool) {
    let server = create_test_app(pool).await;

    let summary: Value = server
        .post("/api/v1/contacts/import")
        .add_header("authorization", bearer("ext|import"))
        .json(&json!({"rows": [
            {"name": "Grace Hopper", "company": "Navy / Harvard"},
            {"email": "alan@example.com"},
            {"phone": "555-0100"},
        ]}))
        .await
        .json();
    assert_eq!(summary["imported"], 2);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["errors"].as_array().unwrap().len(), 1);

    let contacts: Value = server
        .get("/api/v1/contacts?search=grace")
        .add_header("authorization", bearer("ext|import"))
        .await
        .json();
    assert_eq!(contacts["items"][0]["company"], "Navy");
    assert_eq!(contacts["items"][0]["source"], "import");
}

#[sqlx::test]
#[test_log::test]
async fn test_admin_only_routes_refuse_members(pool: PgPool) {
    let server = create_test_app(pool.clone()).await;
    let tenant = crate::test_utils::provision_test_tenant(&pool, "ext|member").await;
    sqlx::query("UPDATE users SET role = 'user' WHERE id = $1")
        .bind(tenant.user_id)
        .execute(&pool)
        .await
        .unwrap();

    let response = server
        .patch("/api/v1/organization")
        .add_header("authorization", bearer("ext|member"))
        .json(&json!({"name": "Renamed"}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"]["code"], "FORBIDDEN");

    // Ordinary writes are still allowed
    server
        .post("/api/v1/contacts")
        .add_header("authorization", bearer("ext|member"))
        .json(&json!({"name": "Z"}))
        .await
        .assert_status(StatusCode::CREATED);
}

#[sqlx::test]
#[test_log::test]
async fn test_checkout_and_webhook_activate_the_plan(pool: PgPool) {
    let server = create_test_app(pool).await;
    let who = "ext|billing";

    let checkout: Value = server
        .post("/api/v1/billing/checkout")
        .add_header("authorization", bearer(who))
        .json(&json!({"plan": "pro"}))
        .await
        .json();
    let url = checkout["url"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:5173/settings/billing?session_id=dummy_session_"), "{url}");

    let organization: Value = server.get("/api/v1/organization").add_header("authorization", bearer(who)).await.json();
    assert_eq!(organization["hasBillingAccount"], true);

    let ack: Value = server
        .post("/webhooks/billing")
        .json(&json!({
            "kind": "checkout_completed",
            "organization_id": organization["id"],
            "plan": "pro",
            "subscription_ref": "sub_123",
        }))
        .await
        .json();
    assert_eq!(ack, json!({"received": true, "applied": true}));

    let organization: Value = server.get("/api/v1/organization").add_header("authorization", bearer(who)).await.json();
    assert_eq!(organization["plan"], "pro");
    assert_eq!(organization["subscriptionStatus"], "active");

    let ignored: Value = server
        .post("/webhooks/billing")
        .json(&json!({"kind": "customer_created", "id": "cus_1"}))
        .await
        .json();
    assert_eq!(ignored["applied"], false);

    server
        .post("/api/v1/billing/portal")
        .add_header("authorization", bearer(who))
        .await
        .assert_status_ok();
}

#[sqlx::test]
#[test_log::test]
async fn test_job_routes_require_the_cron_secret(pool: PgPool) {
    let server = create_test_app(pool).await;

    server
        .post("/internal/jobs/task-reminders")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .post("/internal/jobs/task-reminders")
        .add_header("authorization", "Bearer wrong")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let report: Value = server
        .post("/internal/jobs/task-reminders")
        .add_header("authorization", format!("Bearer {TEST_CRON_SECRET}"))
        .await
        .json();
    assert_eq!(report, json!({"processed": 0, "sent": 0, "failed": 0}));

    server
        .post("/internal/jobs/trial-warnings")
        .add_header("authorization", format!("Bearer {TEST_CRON_SECRET}"))
        .await
        .assert_status_ok();
}

#[sqlx::test]
#[test_log::test]
async fn test_rate_limit_applies_to_tenant_api(pool: PgPool) {
    let mut config = create_test_config();
    config.limits.rate_limit.enabled = true;
    config.limits.rate_limit.max_requests = 2;
    config.limits.rate_limit.window = Duration::from_secs(60);
    let server = create_test_app_with_config(pool, config).await;

    for _ in 0..2 {
        server
            .get("/api/v1/me")
            .add_header("authorization", bearer("ext|busy"))
            .await
            .assert_status_ok();
    }

    let limited = server.get("/api/v1/me").add_header("authorization", bearer("ext|busy")).await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key("retry-after"));
    assert_eq!(limited.json::<Value>()["error"]["code"], "RATE_LIMITED");

    // Health checks are not limited
    server.get("/healthz").await.assert_status_ok();
}

#[sqlx::test]
#[test_log::test]
async fn test_dashboard_summarises_the_tenant(pool: PgPool) {
    let server = create_test_app(pool).await;
    let who = "ext|dash";

    server
        .post("/api/v1/contacts")
        .add_header("authorization", bearer(who))
        .json(&json!({"name": "Lead"}))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/api/v1/tasks")
        .add_header("authorization", bearer(who))
        .json(&json!({"title": "Overdue", "dueDate": "2020-01-01"}))
        .await
        .assert_status(StatusCode::CREATED);

    let stats: Value = server.get("/api/v1/dashboard").add_header("authorization", bearer(who)).await.json();
    assert_eq!(stats["newContacts"], 1);
    assert_eq!(stats["openDeals"], 0);
    assert_eq!(stats["conversionRate"], 0.0);
    assert_eq!(stats["dealsByStage"].as_array().unwrap().len(), 6);
    assert_eq!(stats["dueTasks"].as_array().unwrap().len(), 1);

    server
        .get("/api/v1/dashboard?from=2025-02-01&to=2025-01-01")
        .add_header("authorization", bearer(who))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
