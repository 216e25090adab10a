//! API routes

use axum::{
    routing::{get, patch, post},
    Router,
};
use serde::Serialize;

use crate::extractors::AppState;
use crate::handlers::{accounts, auth, documents, functions, members, quality, tasks};

/// Create the complete API router
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", api_v1_router())
        .nest("/functions/v1", functions_router())
}

fn api_v1_router() -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        .route("/signup", post(accounts::signup))
        .route("/auth/otp/request", post(auth::request_otp))
        .route("/auth/otp/verify", post(auth::verify_otp))
        .nest("/tasks", tasks_router())
        .nest("/documents", documents_router())
        .nest("/account-approvals", account_approvals_router())
        .nest("/team-members", team_members_router())
        .nest("/departments", departments_router())
        .nest("/audits", audits_router())
        .nest("/non-conformances", non_conformances_router())
}

fn tasks_router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/:id/status", post(tasks::set_task_status))
        .route("/:id/approve", post(tasks::approve_task))
        .route("/:id/reject", post(tasks::reject_task))
        .route("/:id/instances", get(tasks::list_task_instances))
}

fn documents_router() -> Router<AppState> {
    Router::new()
        .route("/", get(documents::list_documents).post(documents::create_document))
        .route("/:id", get(documents::get_document))
        .route(
            "/:id/revisions",
            get(documents::list_revisions).post(documents::add_revision),
        )
        .route("/:id/submit", post(documents::submit_document))
        .route("/:id/check", post(documents::check_document))
        .route("/:id/approve", post(documents::approve_document))
        .route("/:id/reject", post(documents::reject_document))
}

fn account_approvals_router() -> Router<AppState> {
    Router::new()
        .route("/", get(accounts::list_approvals))
        .route("/:id/approve", post(accounts::approve_account))
        .route("/:id/reject", post(accounts::reject_account))
}

fn team_members_router() -> Router<AppState> {
    Router::new()
        .route("/", get(members::list_members))
        .route("/:id", get(members::get_member).patch(members::update_member))
}

fn departments_router() -> Router<AppState> {
    Router::new()
        .route("/", get(members::list_departments).post(members::create_department))
        .route(
            "/:id",
            patch(members::update_department).delete(members::delete_department),
        )
}

fn audits_router() -> Router<AppState> {
    Router::new()
        .route("/", get(quality::list_audits).post(quality::create_audit))
        .route("/:id", get(quality::get_audit).patch(quality::update_audit))
}

fn non_conformances_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(quality::list_non_conformances).post(quality::create_non_conformance),
        )
        .route(
            "/:id",
            get(quality::get_non_conformance).patch(quality::update_non_conformance),
        )
        .route("/:id/advance", post(quality::advance_non_conformance))
}

fn functions_router() -> Router<AppState> {
    Router::new()
        .route("/send-email", post(functions::send_email))
        .route("/send-invitation", post(functions::send_invitation))
        .route("/send-dashboard-report", post(functions::send_dashboard_report))
        .route("/hrone-integration", post(functions::hrone_integration))
        .route("/task-automation", post(functions::task_automation))
        .route("/database-utils", get(functions::database_utils))
        .route("/create-admin", post(functions::create_admin))
}

async fn api_root() -> axum::Json<ApiRoot> {
    axum::Json(ApiRoot {
        instance_name: "QMS RS".into(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRoot {
    instance_name: String,
    version: &'static str,
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use qms_core::config::AppConfig;
    use qms_db::OtpStore;
    use qms_models::MemberRole;
    use serde_json::json;

    use crate::test_support::{json, TestApp};

    #[tokio::test]
    async fn test_api_root_is_public() {
        let app = TestApp::new();
        let response = app.request(Method::GET, "/api/v1", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["instanceName"], "QMS RS");
    }

    #[tokio::test]
    async fn test_resources_require_a_token() {
        let app = TestApp::new();
        let response = app.request(Method::GET, "/api/v1/tasks", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let app = TestApp::new();
        let (_, token) = app.login("user@example.com", MemberRole::User).await;
        let response = app
            .request(Method::GET, "/api/v1/tasks/999", Some(&token), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_task_completion_and_approval() {
        let app = TestApp::new();
        let (user, user_token) = app.login("user@example.com", MemberRole::User).await;
        let (approver, approver_token) = app.login("boss@example.com", MemberRole::Manager).await;

        let response = app
            .request(
                Method::POST,
                "/api/v1/tasks",
                Some(&user_token),
                Some(json!({
                    "title": "Calibrate scale",
                    "assigneeId": user.id,
                    "approverId": approver.id,
                    "dueDate": "2030-01-10"
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json(response).await;
        let id = created["task"]["id"].as_i64().unwrap();

        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/tasks/{id}/status"),
                Some(&user_token),
                Some(json!({ "status": "completed" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let change = json(response).await;
        assert_eq!(change["task"]["approvalStatus"], "pending");
        assert_eq!(app.outbox.sent_to("boss@example.com").len(), 1);

        // only the approver decides
        let response = app
            .request(Method::POST, &format!("/api/v1/tasks/{id}/approve"), Some(&user_token), None)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/tasks/{id}/approve"),
                Some(&approver_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["approvalStatus"], "approved");
    }

    #[tokio::test]
    async fn test_recurring_task_returns_first_instance() {
        let app = TestApp::new();
        let (_, token) = app.login("manager@example.com", MemberRole::Manager).await;

        let response = app
            .request(
                Method::POST,
                "/api/v1/tasks",
                Some(&token),
                Some(json!({
                    "title": "Weekly walkthrough",
                    "isRecurring": true,
                    "frequency": "weekly",
                    "startDate": "2030-03-04"
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json(response).await;
        let root = created["task"]["id"].as_i64().unwrap();
        assert_eq!(created["firstInstance"]["parentTaskId"].as_i64(), Some(root));

        let response = app
            .request(Method::GET, &format!("/api/v1/tasks/{root}/instances"), Some(&token), None)
            .await;
        assert_eq!(json(response).await.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_recurring_task_without_frequency_is_rejected() {
        let app = TestApp::new();
        let (_, token) = app.login("manager@example.com", MemberRole::Manager).await;

        let response = app
            .request(
                Method::POST,
                "/api/v1/tasks",
                Some(&token),
                Some(json!({ "title": "Broken series", "isRecurring": true })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(response).await;
        assert!(body["details"]["frequency"].is_array());
    }

    #[tokio::test]
    async fn test_document_steps_must_run_in_order() {
        let app = TestApp::new();
        let (_, initiator) = app.login("author@example.com", MemberRole::User).await;
        let (checker, _) = app.login("checker@example.com", MemberRole::User).await;
        let (approver, approver_token) = app.login("approver@example.com", MemberRole::Manager).await;

        let response = app
            .request(
                Method::POST,
                "/api/v1/documents",
                Some(&initiator),
                Some(json!({
                    "title": "Cleaning SOP",
                    "documentNumber": "SOP-001",
                    "checkerId": checker.id,
                    "approverId": approver.id,
                    "filePath": "docs/sop-001.pdf",
                    "fileName": "sop-001.pdf"
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json(response).await["document"]["id"].as_i64().unwrap();

        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/documents/{id}/approve"),
                Some(&approver_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .request(Method::POST, &format!("/api/v1/documents/{id}/submit"), Some(&initiator), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "pending-checker");
    }

    #[tokio::test]
    async fn test_signup_then_admin_approval() {
        let app = TestApp::new();
        let (_, admin) = app.login("admin@example.com", MemberRole::Admin).await;

        let response = app
            .request(
                Method::POST,
                "/api/v1/signup",
                None,
                Some(json!({
                    "email": "New.Hire@example.com",
                    "fullName": "New Hire",
                    "requestedRole": "user"
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json(response).await["id"].as_i64().unwrap();

        let response = app
            .request(
                Method::GET,
                "/api/v1/account-approvals?status=pending",
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(json(response).await["total"], 1);

        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/account-approvals/{id}/approve"),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let member = json(response).await;
        assert_eq!(member["email"], "new.hire@example.com");
        assert_eq!(member["status"], "active");
    }

    #[tokio::test]
    async fn test_otp_login_issues_token() {
        let app = TestApp::new();
        app.login("member@example.com", MemberRole::User).await;

        let response = app
            .request(
                Method::POST,
                "/api/v1/auth/otp/request",
                None,
                Some(json!({ "email": "member@example.com" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let code = app
            .stores
            .otp
            .latest_usable("member@example.com", chrono::Utc::now())
            .await
            .unwrap()
            .unwrap()
            .code;

        let response = app
            .request(
                Method::POST,
                "/api/v1/auth/otp/verify",
                None,
                Some(json!({ "email": "member@example.com", "code": "000000x" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .request(
                Method::POST,
                "/api/v1/auth/otp/verify",
                None,
                Some(json!({ "email": "member@example.com", "code": code })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["verified"], true);
        let token = body["token"].as_str().unwrap().to_string();

        let response = app
            .request(Method::GET, "/api/v1/team-members", Some(&token), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_conformance_close_needs_corrective_action() {
        let app = TestApp::new();
        let (_, manager) = app.login("qa@example.com", MemberRole::Manager).await;

        let response = app
            .request(
                Method::POST,
                "/api/v1/non-conformances",
                Some(&manager),
                Some(json!({ "title": "Expired reagent", "severity": "major" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json(response).await["id"].as_i64().unwrap();

        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/non-conformances/{id}/advance"),
                Some(&manager),
                Some(json!({ "status": "closed" })),
            )
            .await;
        assert!(response.status().is_client_error());

        let response = app
            .request(
                Method::GET,
                "/api/v1/non-conformances?severity=major",
                Some(&manager),
                None,
            )
            .await;
        assert_eq!(json(response).await["total"], 1);
    }

    #[tokio::test]
    async fn test_task_automation_is_manager_only() {
        let app = TestApp::new();
        let (_, user) = app.login("user@example.com", MemberRole::User).await;
        let (_, manager) = app.login("manager@example.com", MemberRole::Manager).await;

        let response = app
            .request(Method::POST, "/functions/v1/task-automation", Some(&user), None)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .request(Method::POST, "/functions/v1/task-automation", Some(&manager), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["markedOverdue"], 0);
    }

    #[tokio::test]
    async fn test_database_utils_lists_tables() {
        let app = TestApp::new();
        let (_, admin) = app.login("admin@example.com", MemberRole::Admin).await;

        let response = app
            .request(Method::GET, "/functions/v1/database-utils", Some(&admin), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        let tables = body["tables"].as_array().unwrap();
        assert!(tables.iter().any(|t| t["table"] == "team_members" && t["rows"] == 1));
        assert!(body.get("pool").is_none());
    }

    #[tokio::test]
    async fn test_create_admin_checks_setup_token() {
        let mut config = AppConfig::default();
        config.auth.setup_token = Some("bootstrap-secret".into());
        let app = TestApp::with_config(config);
        let body = json!({ "email": "root@example.com", "fullName": "Root" });

        let response = app
            .request(Method::POST, "/functions/v1/create-admin", None, Some(body.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/functions/v1/create-admin")
            .header("content-type", "application/json")
            .header(crate::handlers::functions::SETUP_TOKEN_HEADER, "bootstrap-secret")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json(response).await["role"], "admin");
    }

    #[tokio::test]
    async fn test_invitation_emails_signup_link() {
        let app = TestApp::new();
        let (_, manager) = app.login("manager@example.com", MemberRole::Manager).await;

        let response = app
            .request(
                Method::POST,
                "/functions/v1/send-invitation",
                Some(&manager),
                Some(json!({ "email": "invitee@example.com", "fullName": "Invitee", "role": "user" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json(response).await["status"], "invited");

        let sent = app.outbox.sent_to("invitee@example.com");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text_body.contains("/signup?email=invitee@example.com"));
    }
}
