//! HTTP API
//!
//! JSON routes over the session store. Handlers only translate between the
//! wire and [`SessionStore`]; every rule lives in the game module.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::Credential;
use crate::config::schema::HttpConfig;
use crate::error::{GameError, ServerError};
use crate::game::phase::Phase;
use crate::game::session::{Message, SessionId};
use crate::game::store::SessionStore;
use crate::persona::PersonaId;

// ============================================================================
// State & Errors
// ============================================================================

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// All live sessions
    pub store: Arc<SessionStore>,
}

impl AppState {
    /// Wraps a store.
    #[must_use]
    pub const fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

/// Error returned by a handler.
#[derive(Debug)]
pub enum ApiError {
    /// Game operation failed
    Game(GameError),
    /// Malformed request
    BadRequest(String),
    /// Path does not name a session id
    UnknownGame(String),
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        Self::Game(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownGame(_) => StatusCode::NOT_FOUND,
            Self::Game(err) => match err {
                GameError::NotFound(_) => StatusCode::NOT_FOUND,
                GameError::Phase(_) => StatusCode::CONFLICT,
                GameError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                GameError::Generation(_) | GameError::Verification(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GameError::Initialization(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (category, message, retryable) = match &self {
            Self::BadRequest(m) => ("invalid_input", m.clone(), false),
            Self::UnknownGame(id) => ("not_found", format!("game not found: {id}"), false),
            Self::Game(err) => (err.category(), err.to_string(), err.is_retryable()),
        };
        debug!(status = status.as_u16(), category, "request failed");
        (
            status,
            Json(json!({
                "success": false,
                "error": category,
                "message": message,
                "retryable": retryable,
            })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("empty request body".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

fn parse_game_id(raw: &str) -> ApiResult<SessionId> {
    raw.parse()
        .map_err(|_| ApiError::UnknownGame(raw.to_string()))
}

fn parse_persona(raw: &str) -> ApiResult<PersonaId> {
    raw.parse()
        .map_err(|e: crate::persona::UnknownPersona| ApiError::BadRequest(e.to_string()))
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct InitRequest {
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct InitResponse {
    success: bool,
    message: &'static str,
    game_id: SessionId,
    personas: Vec<PersonaId>,
    questions_remaining: u32,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    game_id: String,
    color: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    color: PersonaId,
    questions_remaining: u32,
    phase: Phase,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    game_id: SessionId,
    color: PersonaId,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct GuessQuery {
    guess: String,
}

// ============================================================================
// Router
// ============================================================================

/// Builds the API router.
pub fn build_router(state: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/api/game/init", post(handle_init))
        .route("/api/game/chat", post(handle_chat))
        .route("/api/game/{id}", delete(handle_delete))
        .route("/api/game/{id}/state", get(handle_state))
        .route("/api/game/{id}/history/{color}", get(handle_history))
        .route("/api/game/{id}/accuse", post(handle_accuse))
        .route("/api/game/{id}/back", post(handle_back))
        .route("/api/game/{id}/verify", post(handle_verify))
        .route("/api/game/{id}/verdict", get(handle_verdict))
        .layer(axum::extract::DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

async fn handle_root() -> impl IntoResponse {
    Json(json!({
        "message": "Impostor game API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_init(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> ApiResult<Json<InitResponse>> {
    let request: InitRequest = if body.is_empty() {
        InitRequest::default()
    } else {
        parse_body(&body)?
    };
    debug!(peer = %addr, "game init requested");
    let credential = Credential::new(request.api_key.unwrap_or_default());
    let snapshot = state.store.create(credential).await?;
    Ok(Json(InitResponse {
        success: true,
        message: "Game initialized successfully",
        game_id: snapshot.session_id,
        personas: snapshot.personas,
        questions_remaining: snapshot.questions_remaining,
    }))
}

async fn handle_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ChatResponse>> {
    let request: ChatRequest = parse_body(&body)?;
    let id = parse_game_id(&request.game_id)?;
    let persona = parse_persona(&request.color)?;
    let exchange = state.store.ask(id, persona, &request.message).await?;
    Ok(Json(ChatResponse {
        response: exchange.reply.content,
        color: exchange.persona,
        questions_remaining: exchange.questions_remaining,
        phase: exchange.phase,
    }))
}

async fn handle_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_game_id(&id)?;
    Ok(Json(state.store.snapshot(id).await?))
}

async fn handle_history(
    State(state): State<AppState>,
    Path((id, color)): Path<(String, String)>,
) -> ApiResult<Json<HistoryResponse>> {
    let game_id = parse_game_id(&id)?;
    let color = parse_persona(&color)?;
    let messages = state.store.history(game_id, color).await?;
    Ok(Json(HistoryResponse {
        game_id,
        color,
        messages,
    }))
}

async fn handle_accuse(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_game_id(&id)?;
    Ok(Json(state.store.accuse(id).await?))
}

async fn handle_back(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_game_id(&id)?;
    Ok(Json(state.store.back(id).await?))
}

async fn handle_verify(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<GuessQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) =
        query.map_err(|e| ApiError::BadRequest(format!("missing or invalid guess: {e}")))?;
    let id = parse_game_id(&id)?;
    let guess = parse_persona(&query.guess)?;
    Ok(Json(state.store.submit_guess(id, guess).await?))
}

async fn handle_verdict(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_game_id(&id)?;
    Ok(Json(state.store.verdict(id).await?))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let existed = match id.parse::<SessionId>() {
        Ok(id) => state.store.destroy(id).await,
        Err(_) => false,
    };
    Json(json!({
        "success": true,
        "message": if existed { "Game deleted" } else { "Game not found" },
    }))
}

// ============================================================================
// Server
// ============================================================================

/// Running HTTP server.
#[derive(Debug)]
pub struct HttpServer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HttpServer {
    /// Binds the listener and starts serving.
    ///
    /// Returns the server and the actual bound address (useful when binding
    /// to port 0 in tests).
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if the address is invalid or cannot be bound.
    pub async fn bind(
        config: &HttpConfig,
        state: AppState,
        cancel: CancellationToken,
    ) -> Result<(Self, SocketAddr), ServerError> {
        let addr = parse_bind_addr(&config.bind)?;
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{addr}: {e}")))?;
        let bound_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(format!("local_addr failed: {e}")))?;

        let service = build_router(state, config.max_body_size)
            .into_make_service_with_connect_info::<SocketAddr>();

        let server_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            info!(%bound_addr, "HTTP server started");
            axum::serve(listener, service)
                .with_graceful_shutdown(async move {
                    server_cancel.cancelled().await;
                })
                .await
                .ok();
            debug!("HTTP server shut down");
        });

        Ok((Self { cancel, handle }, bound_addr))
    }

    /// Requests graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for the server task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Crashed`] if the server task panicked.
    pub async fn wait(self) -> Result<(), ServerError> {
        self.handle
            .await
            .map_err(|e| ServerError::Crashed(e.to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses a bind address string into a full `host:port` form.
///
/// Accepts:
/// - `:8080` → `0.0.0.0:8080`
/// - `8080` → `0.0.0.0:8080`
/// - `1.2.3.4:8080` → as-is
///
/// # Errors
///
/// Returns [`ServerError::InvalidAddress`] if the result is not a socket
/// address.
pub fn parse_bind_addr(input: &str) -> Result<String, ServerError> {
    let addr = if input.starts_with(':') {
        format!("0.0.0.0{input}")
    } else if input.parse::<u16>().is_ok() {
        format!("0.0.0.0:{input}")
    } else {
        input.to_string()
    };
    addr.parse::<SocketAddr>()
        .map_err(|e| ServerError::InvalidAddress {
            input: input.to_string(),
            message: e.to_string(),
        })?;
    Ok(addr)
}
