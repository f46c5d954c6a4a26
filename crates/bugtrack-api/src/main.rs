//! bugtrack-api: REST API server for the bugtrack bug tracker
//!
//! Provides HTTP endpoints for bugs, developers, exports and a mail check.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bugtrack_core::export::{self, Export, pdf::PdfOptions};
use bugtrack_core::{BugChanges, BugService, Config, NewBug, NewDeveloper, Store, notify};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Response header reporting what happened to the update notification
const NOTIFICATION_HEADER: HeaderName = HeaderName::from_static("x-notification");

/// Shared application state
struct AppState {
    service: BugService,
    test_recipient: Option<String>,
    pdf_options: PdfOptions,
}

/// Body of error responses and of the mail check
#[derive(Debug, Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error, mapped onto a status code
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Core(bugtrack_core::Error),
}

impl From<bugtrack_core::Error> for ApiError {
    fn from(e: bugtrack_core::Error) -> Self {
        ApiError::Core(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use bugtrack_core::Error;

        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Core(Error::BugNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Bug not found".to_string())
            }
            ApiError::Core(e) if e.is_validation() => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Core(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ApiResponse::err(message))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid id: {}", raw)))
}

fn download(export: Export) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, export.content_type.to_string()),
            (header::CONTENT_DISPOSITION, export.disposition()),
        ],
        export.bytes,
    )
        .into_response()
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// List all bugs
async fn list_bugs(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.list_bugs()?))
}

/// Create a new bug
async fn create_bug(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewBug>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new) = payload?;
    let bug = state.service.create_bug(&new)?;
    Ok((StatusCode::CREATED, Json(bug)))
}

/// Get a single bug by ID
async fn get_bug(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bug = state.service.get_bug(parse_id(&id)?)?;
    Ok(Json(bug))
}

/// Update a bug and notify its developer when the change calls for it
async fn update_bug(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<BugChanges>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let Json(changes) = payload?;
    let outcome = state.service.update_bug(id, &changes).await?;
    Ok((
        StatusCode::OK,
        [(NOTIFICATION_HEADER, outcome.notification.as_str())],
        Json(outcome.bug),
    ))
}

/// Delete a bug
async fn delete_bug(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.service.delete_bug(parse_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Download all bugs as CSV
async fn export_csv(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let bugs = state.service.list_bugs()?;
    Ok(download(export::csv(&bugs)))
}

/// Download all bugs as a PDF report
async fn export_pdf(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let bugs = state.service.list_bugs()?;
    Ok(download(export::pdf(&bugs, &state.pdf_options)))
}

/// List all developers
async fn list_developers(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.list_developers()?))
}

/// Create a developer
async fn create_developer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewDeveloper>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new) = payload?;
    let developer = state.service.create_developer(&new)?;
    Ok((StatusCode::CREATED, Json(developer)))
}

/// Send a test email to the configured recipient
async fn test_email(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(recipient) = state.test_recipient.as_deref() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::err(format!(
                "{} is not set.",
                bugtrack_core::config::ENV_TEST_RECIPIENT
            ))),
        );
    };

    match state.service.send_test_email(recipient).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(format!(
                "Test email sent successfully to {}",
                recipient
            ))),
        ),
        Err(e) => {
            tracing::error!(to = %recipient, error = %e, "test email failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(e.to_string())),
            )
        }
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/bugs", get(list_bugs).post(create_bug))
        .route("/bugs/export/csv", get(export_csv))
        .route("/bugs/export/pdf", get(export_pdf))
        .route(
            "/bugs/{id}",
            get(get_bug).put(update_bug).delete(delete_bug),
        )
        .route("/developers", get(list_developers).post(create_developer))
        .route("/test-email", get(test_email))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load_default()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // Open the store
    let store = Store::open(&config.database.path)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    let notifier = notify::from_config(&config.smtp)
        .map_err(|e| anyhow::anyhow!("Failed to set up mail relay: {}", e))?;
    if !config.smtp.is_configured() {
        tracing::warn!("smtp.host is not set; notifications will only be logged");
    }

    let service = BugService::new(Arc::new(store), Arc::from(notifier))
        .with_notifications(config.notifications.enabled);

    let state = Arc::new(AppState {
        service,
        test_recipient: config.test_recipient.clone(),
        pdf_options: PdfOptions::from(&config.export),
    });

    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting bugtrack-api on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use bugtrack_core::{Notification, Notifier};
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> bugtrack_core::Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                return Err(bugtrack_core::Error::Mail("connection refused".into()));
            }
            Ok(())
        }
    }

    fn app_with(notifier: Arc<RecordingNotifier>, test_recipient: Option<&str>) -> Router {
        let store = Arc::new(Store::open_in_memory().unwrap());
        router(Arc::new(AppState {
            service: BugService::new(store, notifier),
            test_recipient: test_recipient.map(String::from),
            pdf_options: PdfOptions::default(),
        }))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_assignment_scenario() {
        let notifier = Arc::new(RecordingNotifier::default());
        let app = app_with(notifier.clone(), None);

        let response = call(
            &app,
            "POST",
            "/developers",
            Some(json!({ "name": "Ada", "email": "ada@x.com" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["id"], 1);

        let response = call(
            &app,
            "POST",
            "/bugs",
            Some(json!({ "title": "Crash on save", "description": "...", "priority": "HIGH" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let bug = body_json(response).await;
        assert_eq!(bug["id"], 1);
        assert_eq!(bug["status"], "OPEN");
        assert!(bug["developerId"].is_null());

        let response = call(
            &app,
            "PUT",
            "/bugs/1",
            Some(json!({
                "title": "Crash on save",
                "description": "...",
                "priority": "HIGH",
                "status": "OPEN",
                "developerId": 1
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&NOTIFICATION_HEADER], "sent");
        let bug = body_json(response).await;
        assert_eq!(bug["developer"]["name"], "Ada");

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@x.com");
        assert!(sent[0].subject.starts_with("New Bug Assigned"));
    }

    #[tokio::test]
    async fn test_create_forces_open_status() {
        let app = app_with(Arc::default(), None);
        let response = call(
            &app,
            "POST",
            "/bugs",
            Some(json!({ "title": "Typo", "description": "", "status": "CLOSED", "developerId": "" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let bug = body_json(response).await;
        assert_eq!(bug["status"], "OPEN");
        assert_eq!(bug["priority"], "MEDIUM");

        let list = body_json(call(&app, "GET", "/bugs", None).await).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_bug_is_404_with_error() {
        let app = app_with(Arc::default(), None);

        let response = call(&app, "GET", "/bugs/42", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Bug not found");

        let response = call(&app, "PUT", "/bugs/42", Some(json!({ "title": "x" }))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = call(&app, "DELETE", "/bugs/42", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_returns_no_content() {
        let app = app_with(Arc::default(), None);
        call(&app, "POST", "/bugs", Some(json!({ "title": "Typo" }))).await;

        let response = call(&app, "DELETE", "/bugs/1", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(body_bytes(response).await.is_empty());

        let response = call(&app, "GET", "/bugs/1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_errors_are_400() {
        let app = app_with(Arc::default(), None);

        let response = call(&app, "POST", "/bugs", Some(json!({ "title": " " }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["success"], false);

        let response = call(
            &app,
            "POST",
            "/bugs",
            Some(json!({ "title": "Crash", "priority": "URGENT" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = call(
            &app,
            "POST",
            "/bugs",
            Some(json!({ "title": "Crash", "developerId": 9 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = call(
            &app,
            "POST",
            "/developers",
            Some(json!({ "name": "Ada", "email": "" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = call(&app, "GET", "/bugs/abc", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_failed_notification_does_not_fail_update() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let app = app_with(notifier.clone(), None);
        call(
            &app,
            "POST",
            "/developers",
            Some(json!({ "name": "Ada", "email": "ada@x.com" })),
        )
        .await;
        call(&app, "POST", "/bugs", Some(json!({ "title": "Crash" }))).await;

        let response = call(&app, "PUT", "/bugs/1", Some(json!({ "developerId": "1" }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&NOTIFICATION_HEADER], "failed");
        assert_eq!(body_json(response).await["developerId"], 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_csv_export_headers_and_body() {
        let app = app_with(Arc::default(), None);
        call(&app, "POST", "/bugs", Some(json!({ "title": "Crash, badly" }))).await;

        let response = call(&app, "GET", "/bugs/export/csv", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"bugs.csv\""
        );
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let mut lines = body.split("\r\n");
        assert_eq!(
            lines.next(),
            Some("ID,Title,Status,Priority,Assigned To,Created At")
        );
        assert!(lines.next().unwrap().starts_with("1,\"Crash, badly\",OPEN,MEDIUM,Unassigned,"));
    }

    #[tokio::test]
    async fn test_pdf_export() {
        let app = app_with(Arc::default(), None);
        let response = call(&app, "GET", "/bugs/export/pdf", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"bugs.pdf\""
        );
        assert!(body_bytes(response).await.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_developer_listing() {
        let app = app_with(Arc::default(), None);
        call(
            &app,
            "POST",
            "/developers",
            Some(json!({ "name": "Grace", "email": "grace@x.com" })),
        )
        .await;
        let list = body_json(call(&app, "GET", "/developers", None).await).await;
        assert_eq!(list, json!([{ "id": 1, "name": "Grace", "email": "grace@x.com" }]));
    }

    #[tokio::test]
    async fn test_mail_check() {
        let app = app_with(Arc::default(), None);
        let response = call(&app, "GET", "/test-email", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["success"], false);

        let notifier = Arc::new(RecordingNotifier::default());
        let app = app_with(notifier.clone(), Some("ops@x.com"));
        let response = call(&app, "GET", "/test-email", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Test email sent successfully to ops@x.com");
        assert_eq!(notifier.sent.lock().unwrap()[0].to, "ops@x.com");
    }
}
