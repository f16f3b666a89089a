use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use mergington_core::mcp::{McpClient, McpError, SearchSort};
use mergington_core::registry::{Activity, ActivityRegistry, RegistryError};

use crate::config::MergingtonConfig;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared handler state. Cloned per request; the registry and MCP client
/// are shared behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ActivityRegistry>,
    pub mcp: Arc<McpClient>,
}

impl AppState {
    pub fn new(registry: ActivityRegistry, mcp: McpClient) -> Self {
        Self {
            registry: Arc::new(registry),
            mcp: Arc::new(mcp),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Error response rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    pub fn search(err: McpError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("Error searching GitHub issues: {err}"),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        let status = match err {
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::AlreadyRegistered { .. }
            | RegistryError::NotRegistered { .. }
            | RegistryError::ActivityFull { .. } => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub sort: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/activities", get(list_activities))
        .route("/activities/{name}/signup", post(signup))
        .route("/activities/{name}/unregister", delete(unregister))
        .route("/github/search-issues", get(search_issues))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(config: &MergingtonConfig) -> Result<()> {
    let registry = ActivityRegistry::seeded().with_capacity_policy(config.capacity_policy);
    let mcp = McpClient::from_config(&config.mcp)?;
    tracing::info!(
        activities = registry.len(),
        capacity_policy = ?config.capacity_policy,
        mcp_transports = ?mcp.transport_names(),
        "registry ready"
    );

    let app = build_router(AppState::new(registry, mcp), &config.static_dir);
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    tracing::info!("mergington serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("mergington serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Redirect {
    Redirect::temporary("/static/index.html")
}

async fn list_activities(State(state): State<AppState>) -> Json<IndexMap<String, Activity>> {
    Json(state.registry.list_all())
}

async fn signup(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Value>, AppError> {
    state.registry.signup(&name, &query.email)?;
    Ok(Json(json!({
        "message": format!("Signed up {} for {}", query.email, name)
    })))
}

async fn unregister(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Value>, AppError> {
    state.registry.unregister(&name, &query.email)?;
    Ok(Json(json!({
        "message": format!("Unregistered {} from {}", query.email, name)
    })))
}

async fn search_issues(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let sort = query
        .sort
        .as_deref()
        .map(SearchSort::parse_lenient)
        .unwrap_or_default();

    let result = state.mcp.search_issues(&query.q, sort).await.map_err(|e| {
        tracing::warn!(error = %e, "issue search failed");
        AppError::search(e)
    })?;
    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use tower::ServiceExt;

    use mergington_core::mcp::{BridgeConfig, LocalService, SubprocessBridge};
    use mergington_core::registry::{Activity, ActivityRegistry, CapacityPolicy};
    use mergington_test_utils::{StubMcpServer, unreachable_url, write_bridge_script};

    use super::*;

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn seeded_state() -> AppState {
        AppState::new(ActivityRegistry::seeded(), McpClient::new(vec![]))
    }

    async fn send(
        state: AppState,
        method: Method,
        uri: &str,
    ) -> axum::response::Response {
        let app = super::build_router(state, Path::new("static"));
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // -----------------------------------------------------------------------
    // Activities
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_activities_returns_catalog() {
        let resp = send(seeded_state(), Method::GET, "/activities").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        let obj = json.as_object().expect("response should be an object");
        assert_eq!(obj.len(), 9);
        assert_eq!(
            json["Chess Club"],
            serde_json::json!({
                "description": "Learn strategies and compete in chess tournaments",
                "schedule": "Fridays, 3:30 PM - 5:00 PM",
                "max_participants": 12,
                "participants": ["michael@mergington.edu", "daniel@mergington.edu"],
            })
        );
    }

    #[tokio::test]
    async fn test_list_activities_keeps_catalog_order() {
        let resp = send(seeded_state(), Method::GET, "/activities").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), 1_048_576)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let positions: Vec<usize> = ["Chess Club", "Programming Class", "Art Club", "Debate Team"]
            .iter()
            .map(|name| {
                text.find(&format!("\"{name}\":"))
                    .unwrap_or_else(|| panic!("{name} missing from {text}"))
            })
            .collect();
        assert!(
            positions.windows(2).all(|w| w[0] < w[1]),
            "activities out of catalog order: {text}"
        );
    }

    #[tokio::test]
    async fn test_signup_success() {
        let state = seeded_state();
        let resp = send(
            state.clone(),
            Method::POST,
            "/activities/Chess%20Club/signup?email=new@mergington.edu",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(
            json["message"],
            "Signed up new@mergington.edu for Chess Club"
        );

        let chess = state.registry.get("Chess Club").unwrap();
        assert_eq!(
            chess.participants.last().map(String::as_str),
            Some("new@mergington.edu")
        );
    }

    #[tokio::test]
    async fn test_signup_duplicate_is_bad_request() {
        let resp = send(
            seeded_state(),
            Method::POST,
            "/activities/Chess%20Club/signup?email=michael@mergington.edu",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["detail"], "Student is already signed up");
    }

    #[tokio::test]
    async fn test_signup_unknown_activity_is_not_found() {
        let resp = send(
            seeded_state(),
            Method::POST,
            "/activities/Unknown%20Club/signup?email=x@mergington.edu",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["detail"], "Activity not found");
    }

    #[tokio::test]
    async fn test_signup_full_activity_when_enforced() {
        let registry = ActivityRegistry::from_activities([(
            "Tiny",
            Activity::new("Small", "Mondays", 1).with_participants(["a@mergington.edu"]),
        )])
        .with_capacity_policy(CapacityPolicy::Enforce);
        let state = AppState::new(registry, McpClient::new(vec![]));

        let resp = send(state, Method::POST, "/activities/Tiny/signup?email=b@mergington.edu").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["detail"], "Activity is full");
    }

    #[tokio::test]
    async fn test_signup_without_email_is_rejected() {
        let resp = send(seeded_state(), Method::POST, "/activities/Chess%20Club/signup").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unregister_success() {
        let state = seeded_state();
        let resp = send(
            state.clone(),
            Method::DELETE,
            "/activities/Chess%20Club/unregister?email=daniel@mergington.edu",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(
            json["message"],
            "Unregistered daniel@mergington.edu from Chess Club"
        );
        assert_eq!(
            state.registry.get("Chess Club").unwrap().participants,
            vec!["michael@mergington.edu"]
        );
    }

    #[tokio::test]
    async fn test_unregister_not_signed_up_is_bad_request() {
        let resp = send(
            seeded_state(),
            Method::DELETE,
            "/activities/Chess%20Club/unregister?email=ghost@mergington.edu",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["detail"], "Student is not signed up for this activity");
    }

    #[tokio::test]
    async fn test_unregister_unknown_activity_is_not_found() {
        let resp = send(
            seeded_state(),
            Method::DELETE,
            "/activities/Nope/unregister?email=michael@mergington.edu",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_signup_is_visible_in_listing() {
        let state = seeded_state();
        send(
            state.clone(),
            Method::POST,
            "/activities/Art%20Club/signup?email=painter@mergington.edu",
        )
        .await;

        let resp = send(state, Method::GET, "/activities").await;
        let json = body_json(resp).await;
        assert_eq!(
            json["Art Club"]["participants"],
            serde_json::json!([
                "amelia@mergington.edu",
                "harper@mergington.edu",
                "painter@mergington.edu"
            ])
        );
    }

    // -----------------------------------------------------------------------
    // Root and static assets
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_root_redirects_to_static_index() {
        let resp = send(seeded_state(), Method::GET, "/").await;
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/static/index.html"
        );
    }

    #[tokio::test]
    async fn test_static_files_are_served() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("index.html"), "<h1>Mergington</h1>").unwrap();

        let app = super::build_router(seeded_state(), tmp.path());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/static/index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1_048_576)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"<h1>Mergington</h1>");
    }

    // -----------------------------------------------------------------------
    // Issue search
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_search_passes_through_local_response() {
        let server = StubMcpServer::start(200, serde_json::json!({"items": [{"number": 1}]})).await;
        let local = LocalService::new(server.url(), Duration::from_secs(5)).unwrap();
        let state = AppState::new(ActivityRegistry::seeded(), McpClient::new(vec![local.into()]));

        let resp = send(state, Method::GET, "/github/search-issues?q=bug&sort=stars").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["items"][0]["number"], 1);

        let received = server.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["parameters"]["sort"], "created");
        assert_eq!(received[0]["parameters"]["q"], "bug");
    }

    #[tokio::test]
    async fn test_search_upstream_error_is_internal_error() {
        let server = StubMcpServer::start_raw(401, "Bad credentials").await;
        let local = LocalService::new(server.url(), Duration::from_secs(5)).unwrap();
        let state = AppState::new(ActivityRegistry::seeded(), McpClient::new(vec![local.into()]));

        let resp = send(state, Method::GET, "/github/search-issues?q=bug").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        let detail = json["detail"].as_str().unwrap();
        assert!(detail.starts_with("Error searching GitHub issues:"), "{detail}");
        assert!(detail.contains("401"), "{detail}");
        assert!(detail.contains("Bad credentials"), "{detail}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_search_bridge_failure_is_internal_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let script = write_bridge_script(tmp.path(), "bridge", "", "token expired", 1);
        let (command, args) = script.command();
        let local = LocalService::new(unreachable_url().await, Duration::from_secs(5)).unwrap();
        let bridge = SubprocessBridge::new(BridgeConfig {
            command,
            args,
            credential_env: None,
            timeout: Duration::from_secs(10),
        });
        let state = AppState::new(
            ActivityRegistry::seeded(),
            McpClient::new(vec![local.into(), bridge.into()]),
        );

        let resp = send(state, Method::GET, "/github/search-issues?q=bug&sort=updated").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        let detail = json["detail"].as_str().unwrap();
        assert!(detail.contains("token expired"), "{detail}");

        let sent: serde_json::Value =
            serde_json::from_str(&script.captured_stdin().unwrap()).unwrap();
        assert_eq!(sent["parameters"]["sort"], "updated");
    }

    #[tokio::test]
    async fn test_search_without_query_is_rejected() {
        let resp = send(seeded_state(), Method::GET, "/github/search-issues").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
