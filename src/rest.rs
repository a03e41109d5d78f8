//! REST API layer (Axum).
//!
//! Public routes: `/signup`, `/login`, `/health`. Everything else sits behind
//! `auth_middleware`, which resolves the bearer token into a `Subject` request
//! extension; handlers pass that subject explicitly to the ownership guard.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::auth::{hash_password, verify_password, TokenService};
use crate::error::{require_text, ApiError};
use crate::guard::OwnershipGuard;
use crate::models::{Board, Container, Subject, Task, UserSnapshot, DEFAULT_BACKGROUND};
use crate::storage::Storage;
use crate::sync::{ReconciliationEngine, SyncRequest};

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
pub struct AppState {
    pub storage: Storage,
    pub tokens: TokenService,
}

/// JSON body extractor that reports every decoding failure as `BadRequest`.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Numeric `:id` path segment; a non-numeric segment is a JSON `BadRequest`.
pub struct PathId(pub u64);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<u64>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(Self(id))
    }
}

#[derive(Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub token: String,
}

#[derive(Serialize, Deserialize)]
pub struct CreateBoardRequest {
    pub title: String,
    #[serde(default = "default_background")]
    pub background: String,
}

#[derive(Serialize, Deserialize)]
pub struct UpdateBoardRequest {
    pub title: String,
    pub background: String,
}

fn default_background() -> String {
    DEFAULT_BACKGROUND.to_string()
}

#[derive(Serialize, Deserialize)]
pub struct ContainerRequest {
    pub title: String,
}

#[derive(Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub container_id: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: String,
    pub description: String,
    pub completed: bool,
}

#[derive(Serialize, Deserialize)]
pub struct ReserveIdsRequest {
    pub count: u64,
}

#[derive(Serialize, Deserialize)]
pub struct ReservedIds {
    pub ids: Vec<u64>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("missing authorization header".into()))?;

    let malformed = || ApiError::bad_request("invalid authorization header");
    let value = auth_header.to_str().map_err(|_| malformed())?;
    let mut parts = value.split_whitespace();
    let token = match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => token,
        _ => return Err(malformed()),
    };

    let user_id = state.tokens.verify(token)?;
    req.extensions_mut().insert(Subject { user_id });
    Ok(next.run(req).await)
}

/// Create the Axum router with all board endpoints
pub fn create_router(storage: Storage, tokens: TokenService) -> Router {
    let state = Arc::new(AppState { storage, tokens });

    let auth_routes = Router::new()
        .route("/logout", post(logout_handler))
        .route("/boards", get(list_boards_handler).post(create_board_handler))
        .route("/boards/:id", put(update_board_handler).delete(delete_board_handler))
        .route(
            "/boards/:id/containers",
            get(list_containers_handler).post(create_container_handler),
        )
        .route(
            "/containers/:id",
            put(update_container_handler).delete(delete_container_handler),
        )
        .route(
            "/containers/:id/tasks",
            get(list_tasks_handler).post(create_task_handler),
        )
        .route("/tasks/:id", put(update_task_handler).delete(delete_task_handler))
        .route("/user-data", get(user_data_handler))
        .route("/update-user-data", post(update_user_data_handler))
        .route("/ids", post(reserve_ids_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/signup", post(signup_handler))
        .route("/login", post(login_handler))
        .route("/health", get(health_handler))
        .merge(auth_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn signup_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    require_text("username", &payload.username)?;
    require_text("email", &payload.email)?;
    require_text("password", &payload.password)?;

    let password = payload.password.clone();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    let user = state
        .storage
        .create_user(&payload.username, &payload.email, &hash)?;
    let token = state.tokens.issue(user.id)?;

    Ok(Json(AuthResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        token,
    }))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let invalid = || ApiError::Unauthorized("invalid username or password".into());

    let user = state
        .storage
        .user_by_username(&payload.username)?
        .ok_or_else(invalid)?;
    let password = payload.password;
    let password_hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await?
        .unwrap_or(false);
    if !verified {
        tracing::info!(user_id = user.id, "login rejected");
        return Err(invalid());
    }

    let token = state.tokens.issue(user.id)?;
    Ok(Json(AuthResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        token,
    }))
}

/// Tokens cannot be revoked; the client simply forgets its token.
async fn logout_handler(Extension(subject): Extension<Subject>) -> StatusCode {
    tracing::debug!(user_id = subject.user_id, "logout");
    StatusCode::OK
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// --- Boards ---

async fn list_boards_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
) -> Result<Json<Vec<Board>>, ApiError> {
    Ok(Json(state.storage.list_boards(subject.user_id)?))
}

async fn create_board_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    JsonBody(payload): JsonBody<CreateBoardRequest>,
) -> Result<Json<Board>, ApiError> {
    require_text("title", &payload.title)?;
    let board = state
        .storage
        .create_board(subject.user_id, &payload.title, &payload.background)?;
    Ok(Json(board))
}

async fn update_board_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(board_id): PathId,
    JsonBody(payload): JsonBody<UpdateBoardRequest>,
) -> Result<Json<Board>, ApiError> {
    require_text("title", &payload.title)?;
    require_text("background", &payload.background)?;
    OwnershipGuard::new(&state.storage).authorize_board(subject, board_id)?;
    let board = state
        .storage
        .update_board(board_id, &payload.title, &payload.background)?;
    Ok(Json(board))
}

async fn delete_board_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(board_id): PathId,
) -> Result<StatusCode, ApiError> {
    OwnershipGuard::new(&state.storage).authorize_board(subject, board_id)?;
    state.storage.delete_board(board_id)?;
    Ok(StatusCode::OK)
}

// --- Containers ---

async fn list_containers_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(board_id): PathId,
) -> Result<Json<Vec<Container>>, ApiError> {
    let guard = OwnershipGuard::new(&state.storage);
    match guard.scope_board_read(subject, board_id)? {
        Some(_) => Ok(Json(state.storage.list_containers(board_id)?)),
        None => Ok(Json(vec![])),
    }
}

async fn create_container_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(board_id): PathId,
    JsonBody(payload): JsonBody<ContainerRequest>,
) -> Result<Json<Container>, ApiError> {
    require_text("title", &payload.title)?;
    OwnershipGuard::new(&state.storage).authorize_board(subject, board_id)?;
    Ok(Json(state.storage.create_container(board_id, &payload.title)?))
}

async fn update_container_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(container_id): PathId,
    JsonBody(payload): JsonBody<ContainerRequest>,
) -> Result<StatusCode, ApiError> {
    require_text("title", &payload.title)?;
    OwnershipGuard::new(&state.storage).authorize_container(subject, container_id)?;
    state.storage.update_container(container_id, &payload.title)?;
    Ok(StatusCode::OK)
}

async fn delete_container_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(container_id): PathId,
) -> Result<StatusCode, ApiError> {
    OwnershipGuard::new(&state.storage).authorize_container(subject, container_id)?;
    state.storage.delete_container(container_id)?;
    Ok(StatusCode::OK)
}

// --- Tasks ---

async fn list_tasks_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(container_id): PathId,
) -> Result<Json<Vec<Task>>, ApiError> {
    let guard = OwnershipGuard::new(&state.storage);
    match guard.scope_container_read(subject, container_id)? {
        Some(_) => Ok(Json(state.storage.list_tasks(container_id)?)),
        None => Ok(Json(vec![])),
    }
}

async fn create_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(container_id): PathId,
    JsonBody(payload): JsonBody<CreateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    require_text("title", &payload.title)?;
    if payload.container_id.is_some_and(|id| id != container_id) {
        return Err(ApiError::bad_request("container_id does not match the path"));
    }
    OwnershipGuard::new(&state.storage).authorize_container(subject, container_id)?;
    let task = state.storage.create_task(
        container_id,
        &payload.title,
        &payload.description,
        payload.completed,
    )?;
    Ok(Json(task))
}

async fn update_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(task_id): PathId,
    JsonBody(payload): JsonBody<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    require_text("title", &payload.title)?;
    OwnershipGuard::new(&state.storage).authorize_task(subject, task_id)?;
    let task = state.storage.update_task(
        task_id,
        &payload.title,
        &payload.description,
        payload.completed,
    )?;
    Ok(Json(task))
}

async fn delete_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    PathId(task_id): PathId,
) -> Result<StatusCode, ApiError> {
    OwnershipGuard::new(&state.storage).authorize_task(subject, task_id)?;
    state.storage.delete_task(task_id)?;
    Ok(StatusCode::OK)
}

// --- Whole-user views ---

async fn user_data_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
) -> Result<Json<UserSnapshot>, ApiError> {
    Ok(Json(state.storage.user_snapshot(subject.user_id)?))
}

async fn update_user_data_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<Subject>,
    JsonBody(payload): JsonBody<SyncRequest>,
) -> Result<StatusCode, ApiError> {
    ReconciliationEngine::new(&state.storage).reconcile(subject, &payload)?;
    Ok(StatusCode::OK)
}

async fn reserve_ids_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<ReserveIdsRequest>,
) -> Result<Json<ReservedIds>, ApiError> {
    let ids = state.storage.reserve_ids(payload.count)?;
    Ok(Json(ReservedIds { ids }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use serde_json::{json, Value};
    use tower::ServiceExt; // For .oneshot() testing

    fn app() -> Router {
        let storage = Storage::temporary().expect("Storage for REST test");
        let tokens = TokenService::new(b"rest-test-secret").unwrap();
        create_router(storage, tokens)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().uri(uri).method(method);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn signup(app: &Router, username: &str) -> AuthResponse {
        let (status, body) = send(
            app,
            "POST",
            "/signup",
            None,
            Some(json!({"username": username, "email": "a@x.com", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body).unwrap()
    }

    async fn first_board_id(app: &Router, token: &str) -> u64 {
        let (_, boards) = send(app, "GET", "/boards", Some(token), None).await;
        boards[0]["id"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_signup_then_boards_lists_default_board() {
        let app = app();
        let ann = signup(&app, "ann").await;
        assert_eq!(ann.username, "ann");

        let (status, boards) = send(&app, "GET", "/boards", Some(&ann.token), None).await;
        assert_eq!(status, StatusCode::OK);
        let boards = boards.as_array().unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0]["title"], "ann's Board");
        assert_eq!(boards[0]["user_id"], ann.id);
        assert!(boards[0].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_login_and_duplicate_signup() {
        let app = app();
        signup(&app, "ann").await;

        let (status, _) = send(
            &app,
            "POST",
            "/signup",
            None,
            Some(json!({"username": "ann", "email": "b@x.com", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "POST",
            "/login",
            None,
            Some(json!({"username": "ann", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());
        assert!(body.get("password").is_none());

        let (status, _) = send(
            &app,
            "POST",
            "/login",
            None,
            Some(json!({"username": "ann", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authorization_header_handling() {
        let app = app();
        let (status, _) = send(&app, "GET", "/boards", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = HttpRequest::builder()
            .uri("/boards")
            .header(header::AUTHORIZATION, "Token abc")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "GET", "/boards", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHORIZED");

        let (status, _) = send(&app, "POST", "/logout", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sync_then_containers_reflect_snapshot() {
        let app = app();
        let ann = signup(&app, "ann").await;
        let board_id = first_board_id(&app, &ann.token).await;

        let (status, body) = send(
            &app,
            "POST",
            "/update-user-data",
            Some(&ann.token),
            Some(json!({
                "boardId": board_id,
                "containers": [{"id": 1, "title": "Todo"}],
                "tasks": [{"id": 10, "container_id": 1, "title": "Write spec"}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);

        let uri = format!("/boards/{board_id}/containers");
        let (status, containers) = send(&app, "GET", &uri, Some(&ann.token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(containers, json!([{"id": 1, "board_id": board_id, "title": "Todo", "task_ids": [10]}]));

        let (_, tasks) = send(&app, "GET", "/containers/1/tasks", Some(&ann.token), None).await;
        assert_eq!(tasks[0]["title"], "Write spec");

        let (_, data) = send(&app, "GET", "/user-data", Some(&ann.token), None).await;
        assert_eq!(data["boards"][0]["container_ids"], json!([1]));
        assert_eq!(data["tasks"].as_array().unwrap().len(), 1);
        assert_eq!(data["background"], DEFAULT_BACKGROUND);
    }

    #[tokio::test]
    async fn test_sync_malformed_payload_is_bad_request() {
        let app = app();
        let ann = signup(&app, "ann").await;

        let (status, body) = send(
            &app,
            "POST",
            "/update-user-data",
            Some(&ann.token),
            Some(json!({"boardId": 2, "containers": [{"id": "x", "title": "Todo"}], "tasks": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");

        let (status, _) = send(
            &app,
            "POST",
            "/update-user-data",
            Some(&ann.token),
            Some(json!({"boardId": 2, "containers": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_board_then_containers_is_empty() {
        let app = app();
        let ann = signup(&app, "ann").await;
        let board_id = first_board_id(&app, &ann.token).await;

        let uri = format!("/boards/{board_id}/containers");
        let (_, container) =
            send(&app, "POST", &uri, Some(&ann.token), Some(json!({"title": "Todo"}))).await;
        let container_id = container["id"].as_u64().unwrap();
        let tasks_uri = format!("/containers/{container_id}/tasks");
        let (status, _) = send(
            &app,
            "POST",
            &tasks_uri,
            Some(&ann.token),
            Some(json!({"title": "Write", "description": "", "completed": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            send(&app, "DELETE", &format!("/boards/{board_id}"), Some(&ann.token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, containers) = send(&app, "GET", &uri, Some(&ann.token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(containers, json!([]));
        let (_, tasks) = send(&app, "GET", &tasks_uri, Some(&ann.token), None).await;
        assert_eq!(tasks, json!([]));
        let (_, boards) = send(&app, "GET", "/boards", Some(&ann.token), None).await;
        assert_eq!(boards, json!([]));
    }

    #[tokio::test]
    async fn test_non_owner_is_forbidden() {
        let app = app();
        let ann = signup(&app, "ann").await;
        let bob = signup(&app, "bob").await;
        let board_id = first_board_id(&app, &ann.token).await;

        let uri = format!("/boards/{board_id}/containers");
        let (_, container) =
            send(&app, "POST", &uri, Some(&ann.token), Some(json!({"title": "Todo"}))).await;
        let container_id = container["id"].as_u64().unwrap();
        let (_, task) = send(
            &app,
            "POST",
            &format!("/containers/{container_id}/tasks"),
            Some(&ann.token),
            Some(json!({"title": "Write"})),
        )
        .await;
        let task_id = task["id"].as_u64().unwrap();

        let board_uri = format!("/boards/{board_id}");
        let attempts = [
            ("PUT", board_uri.clone(), Some(json!({"title": "Mine", "background": "x"}))),
            ("DELETE", board_uri.clone(), None),
            ("POST", uri.clone(), Some(json!({"title": "Sneaky"}))),
            ("GET", uri.clone(), None),
            ("PUT", format!("/containers/{container_id}"), Some(json!({"title": "Mine"}))),
            ("DELETE", format!("/containers/{container_id}"), None),
            ("PUT", format!("/tasks/{task_id}"), Some(json!({"title": "Mine", "description": "", "completed": true}))),
            ("DELETE", format!("/tasks/{task_id}"), None),
        ];
        for (method, uri, body) in attempts {
            let (status, _) = send(&app, method, &uri, Some(&bob.token), body).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
        }

        let (status, _) = send(
            &app,
            "POST",
            "/update-user-data",
            Some(&bob.token),
            Some(json!({"boardId": board_id, "containers": [], "tasks": []})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, containers) = send(&app, "GET", &uri, Some(&ann.token), None).await;
        assert_eq!(containers[0]["task_ids"], json!([task_id]));
    }

    #[tokio::test]
    async fn test_task_update_and_path_mismatch() {
        let app = app();
        let ann = signup(&app, "ann").await;
        let board_id = first_board_id(&app, &ann.token).await;
        let (_, container) = send(
            &app,
            "POST",
            &format!("/boards/{board_id}/containers"),
            Some(&ann.token),
            Some(json!({"title": "Todo"})),
        )
        .await;
        let container_id = container["id"].as_u64().unwrap();
        let tasks_uri = format!("/containers/{container_id}/tasks");

        let (status, _) = send(
            &app,
            "POST",
            &tasks_uri,
            Some(&ann.token),
            Some(json!({"title": "Write", "container_id": container_id + 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, task) = send(&app, "POST", &tasks_uri, Some(&ann.token), Some(json!({"title": "Write"}))).await;
        let task_id = task["id"].as_u64().unwrap();
        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/tasks/{task_id}"),
            Some(&ann.token),
            Some(json!({"title": "Written", "description": "done", "completed": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["completed"], true);
        assert_eq!(updated["container_id"], container_id);

        let (status, _) = send(&app, "PUT", "/tasks/99999", Some(&ann.token), Some(json!({"title": "x", "description": "", "completed": false}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_numeric_path_id_is_json_bad_request() {
        let app = app();
        let ann = signup(&app, "ann").await;

        for (method, uri) in [
            ("GET", "/boards/abc/containers"),
            ("DELETE", "/containers/-1"),
            ("GET", "/containers/18446744073709551616/tasks"),
        ] {
            let (status, body) = send(&app, method, uri, Some(&ann.token), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
            assert_eq!(body["error"], "BAD_REQUEST");
            assert!(body["message"].as_str().is_some());
        }
    }

    #[tokio::test]
    async fn test_board_update_requires_background_and_keeps_it() {
        let app = app();
        let ann = signup(&app, "ann").await;
        let (_, board) = send(
            &app,
            "POST",
            "/boards",
            Some(&ann.token),
            Some(json!({"title": "Work", "background": "img-7.jpg"})),
        )
        .await;
        let board_uri = format!("/boards/{}", board["id"]);

        let (status, body) =
            send(&app, "PUT", &board_uri, Some(&ann.token), Some(json!({"title": "Renamed"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");

        let (status, updated) = send(
            &app,
            "PUT",
            &board_uri,
            Some(&ann.token),
            Some(json!({"title": "Renamed", "background": "img-7.jpg"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Renamed");
        assert_eq!(updated["background"], "img-7.jpg");

        let (_, boards) = send(&app, "GET", "/boards", Some(&ann.token), None).await;
        let stored = boards
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["id"] == board["id"])
            .unwrap();
        assert_eq!(stored["background"], "img-7.jpg");
    }

    #[tokio::test]
    async fn test_sync_with_oversized_id_is_rejected() {
        let app = app();
        let ann = signup(&app, "ann").await;
        let bob = signup(&app, "bob").await;
        let ann_board = first_board_id(&app, &ann.token).await;
        let bob_board = first_board_id(&app, &bob.token).await;
        let (_, bob_container) = send(
            &app,
            "POST",
            &format!("/boards/{bob_board}/containers"),
            Some(&bob.token),
            Some(json!({"title": "Bob's"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            "/update-user-data",
            Some(&ann.token),
            Some(json!({
                "boardId": ann_board,
                "containers": [{"id": u64::MAX, "title": "Huge"}],
                "tasks": []
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BAD_REQUEST");

        let (_, ids) = send(&app, "POST", "/ids", Some(&ann.token), Some(json!({"count": 5}))).await;
        let ids: Vec<u64> = serde_json::from_value(ids["ids"].clone()).unwrap();
        let bob_container_id = bob_container["id"].as_u64().unwrap();
        assert!(ids.iter().all(|id| *id > bob_container_id));

        let (_, containers) = send(
            &app,
            "GET",
            &format!("/boards/{bob_board}/containers"),
            Some(&bob.token),
            None,
        )
        .await;
        assert_eq!(containers, json!([bob_container]));
    }

    #[tokio::test]
    async fn test_reserved_ids_are_fresh() {
        let app = app();
        let ann = signup(&app, "ann").await;

        let (status, body) = send(&app, "POST", "/ids", Some(&ann.token), Some(json!({"count": 3}))).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<u64> = serde_json::from_value(body["ids"].clone()).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| *id > ann.id));

        let (status, _) = send(&app, "POST", "/ids", Some(&ann.token), Some(json!({"count": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
