// HTTP transport: a thin REST mirror of the operation layer plus the SSE
// event stream. Decodes, dispatches, encodes; no business logic lives here.
//
// Auth is bearer-token when tokens are configured. The SSE endpoint also
// accepts `?token=` because EventSource cannot set headers.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use atelier_common::error::{OpError, OpResult};
use atelier_common::types::Workspace;

use crate::ops::fs::{
    CreateDirectoryRequest, DeletePathRequest, DirectoryTreeRequest, EditFileRequest,
    FileInfoRequest, ListDirectoryRequest, ListDirectoryWithSizesRequest, MovePathRequest,
    ReadMediaFileRequest, ReadMultipleFilesRequest, ReadTextFileRequest, SearchFilesRequest,
    WriteFileRequest,
};
use crate::ops::history::{CommitHistoryRequest, ReadFileAtCommitRequest};
use crate::ops::Ops;

/// Per-subscriber SSE delivery buffer.
const SSE_SUBSCRIBER_BUFFER: usize = 128;
/// SSE heartbeat interval.
const SSE_HEARTBEAT: Duration = Duration::from_secs(25);

#[derive(Clone)]
pub struct AppState {
    pub ops: Ops,
    pub auth_tokens: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(ops: Ops, auth_tokens: Vec<String>) -> Self {
        Self { ops, auth_tokens: Arc::new(auth_tokens) }
    }
}

/// Build the full router. `/healthz` is unauthenticated; `/api/events`
/// authenticates inside the handler; everything else under `/api` goes
/// through the bearer middleware.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/workspaces", post(create_workspace).get(list_workspaces))
        .route("/api/fs/{op}", post(fs_dispatch))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/events", get(events_stream))
        .merge(api)
        .layer(cors_layer_from_env(std::env::var(CORS_ORIGINS_ENV).ok()))
        .with_state(state)
}

/// Overrides the allowed browser origins (comma separated, or `*`).
const CORS_ORIGINS_ENV: &str = "ATELIER_CORS_ORIGINS";

const DEFAULT_DEV_ORIGINS: &[&str] =
    &["http://localhost:3000", "http://localhost:5173", "http://127.0.0.1:3000", "http://127.0.0.1:5173"];

fn cors_layer_from_env(env_value: Option<String>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    match env_value.as_deref() {
        Some("*") => base.allow_origin(AllowOrigin::any()),
        Some(origins) => base.allow_origin(parse_origins(origins)),
        None => base.allow_origin(parse_origins(&DEFAULT_DEV_ORIGINS.join(","))),
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect()
}

// ── Error mapping ──────────────────────────────────────────────────

pub struct ApiError(pub OpError);

impl From<OpError> for ApiError {
    fn from(e: OpError) -> Self {
        ApiError(e)
    }
}

fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "INVALID_INPUT" | "OUT_OF_BOUNDS" => StatusCode::BAD_REQUEST,
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "ALREADY_EXISTS" | "CONFLICT" => StatusCode::CONFLICT,
        "UNSUPPORTED" => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for_kind(self.0.kind());
        let body = json!({ "error": { "code": self.0.kind(), "message": self.0.to_string() } });
        (status, Json(body)).into_response()
    }
}

// ── Auth ───────────────────────────────────────────────────────────

async fn require_bearer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.auth_tokens.is_empty() {
        return next.run(req).await;
    }
    let allowed = bearer_token(req.headers())
        .map(|t| token_allowed(t, &state.auth_tokens))
        .unwrap_or(false);
    if allowed {
        next.run(req).await
    } else {
        unauthorized()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer realm=\"atelier\", error=\"invalid_token\"")],
        "unauthorized",
    )
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn token_allowed(candidate: &str, tokens: &[String]) -> bool {
    tokens.iter().any(|t| constant_time_eq(candidate, t.trim()))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() || b.is_empty() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Handlers ───────────────────────────────────────────────────────

async fn healthz() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceBody {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateWorkspaceResponse {
    workspace_id: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct ListWorkspacesResponse {
    workspaces: Vec<Workspace>,
}

async fn create_workspace(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkspaceBody>,
) -> Result<Json<CreateWorkspaceResponse>, ApiError> {
    let ops = state.ops.clone();
    let ws = run_blocking(move || ops.create_workspace(&body.name)).await?;
    Ok(Json(CreateWorkspaceResponse { workspace_id: ws.id, path: ws.path }))
}

async fn list_workspaces(
    State(state): State<AppState>,
) -> Result<Json<ListWorkspacesResponse>, ApiError> {
    let ops = state.ops.clone();
    let workspaces = run_blocking(move || ops.list_workspaces()).await?;
    Ok(Json(ListWorkspacesResponse { workspaces }))
}

/// REST mirror: `POST /api/fs/{op}` with the operation's request as the
/// JSON body.
async fn fs_dispatch(
    State(state): State<AppState>,
    axum::extract::Path(op): axum::extract::Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let ops = state.ops.clone();
    match op.as_str() {
        "write_file" => call(ops, body, |o, r: WriteFileRequest| o.write_file(&r)).await,
        "read_text_file" => call(ops, body, |o, r: ReadTextFileRequest| o.read_text_file(&r)).await,
        "edit_file" => call(ops, body, |o, r: EditFileRequest| o.edit_file(&r)).await,
        "create_directory" => {
            call(ops, body, |o, r: CreateDirectoryRequest| o.create_directory(&r)).await
        }
        "list_directory" => {
            call(ops, body, |o, r: ListDirectoryRequest| o.list_directory(&r)).await
        }
        "list_directory_with_sizes" => {
            call(ops, body, |o, r: ListDirectoryWithSizesRequest| o.list_directory_with_sizes(&r))
                .await
        }
        "move_path" => call(ops, body, |o, r: MovePathRequest| o.move_path(&r)).await,
        "delete_path" => call(ops, body, |o, r: DeletePathRequest| o.delete_path(&r)).await,
        "search_files" => call(ops, body, |o, r: SearchFilesRequest| o.search_files(&r)).await,
        "directory_tree" => {
            call(ops, body, |o, r: DirectoryTreeRequest| o.directory_tree(&r)).await
        }
        "file_info" => call(ops, body, |o, r: FileInfoRequest| o.file_info(&r)).await,
        "read_media_file" => {
            call(ops, body, |o, r: ReadMediaFileRequest| o.read_media_file(&r)).await
        }
        "read_multiple_files" => {
            call(ops, body, |o, r: ReadMultipleFilesRequest| o.read_multiple_files(&r)).await
        }
        "commit_history" => {
            call(ops, body, |o, r: CommitHistoryRequest| o.commit_history(&r)).await
        }
        "read_file_at_commit" => {
            call(ops, body, |o, r: ReadFileAtCommitRequest| o.read_file_at_commit(&r)).await
        }
        _ => Err(ApiError(OpError::not_found(format!("unknown operation '{op}'")))),
    }
}

async fn call<Req, Resp, F>(ops: Ops, body: Value, f: F) -> Result<Response, ApiError>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: FnOnce(&Ops, Req) -> OpResult<Resp> + Send + 'static,
{
    let req: Req = serde_json::from_value(body)
        .map_err(|e| ApiError(OpError::invalid_input(format!("failed to parse parameters: {e}"))))?;
    let out = run_blocking(move || f(&ops, req)).await?;
    Ok(Json(out).into_response())
}

/// Operations shell out to git; keep them off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> OpResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(OpError::internal(format!("operation task failed: {e}"))))?
        .map_err(ApiError)
}

// ── SSE ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsQuery {
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default)]
    since: Option<u64>,
    #[serde(default)]
    token: Option<String>,
}

/// `GET /api/events?workspaceId=&since=`: replays buffered events with
/// id > since, then streams live. `Last-Event-ID` (sent by EventSource on
/// reconnect) wins over `since` when larger.
async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Response {
    if !state.auth_tokens.is_empty() && !sse_authorized(&query, &headers, &state.auth_tokens) {
        return unauthorized();
    }

    let Some(workspace_id) = query.workspace_id.as_deref().map(str::trim).filter(|w| !w.is_empty())
    else {
        return ApiError(OpError::invalid_input("'workspaceId' is required")).into_response();
    };
    let since = resolve_since(query.since, &headers);

    let (mut rx, subscription) =
        state.ops.hub().subscribe(workspace_id, since, SSE_SUBSCRIBER_BUFFER);

    let (tx, out) = tokio::sync::mpsc::channel::<Result<SseEvent, Infallible>>(32);
    tokio::spawn(async move {
        // Keeps the hub registration alive for the life of the stream.
        let _subscription = subscription;
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(data) => {
                    SseEvent::default().id(event.id.to_string()).event("workspace.event").data(data)
                }
                Err(e) => {
                    warn!(error = %e, "failed to serialize event");
                    continue;
                }
            };
            if tx.send(Ok(frame)).await.is_err() {
                // Client went away.
                break;
            }
        }
    });

    Sse::new(ReceiverStream::new(out))
        .keep_alive(KeepAlive::new().interval(SSE_HEARTBEAT).text("ping"))
        .into_response()
}

fn sse_authorized(query: &EventsQuery, headers: &HeaderMap, tokens: &[String]) -> bool {
    if let Some(t) = query.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        if token_allowed(t, tokens) {
            return true;
        }
    }
    bearer_token(headers).map(|t| token_allowed(t, tokens)).unwrap_or(false)
}

fn resolve_since(query_since: Option<u64>, headers: &HeaderMap) -> u64 {
    let mut since = query_since.unwrap_or(0);
    if let Some(v) = headers
        .get("last-event-id")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    {
        since = since.max(v);
    }
    since
}
