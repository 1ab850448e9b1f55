use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::error::{ErrorKind, LedgerError};
use crate::ledger::{Assignment, CharacterView, Ledger, NewQuest, Quest};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    code: &'static str,
    error: String,
}

/// Handler error wrapper mapping ledger failures to HTTP statuses
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::EmptyQueue => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let message = match kind {
            ErrorKind::Infrastructure => {
                error!("Request failed: {}", self.0);
                "Internal storage error".to_string()
            }
            _ => {
                warn!("Request rejected: {}", self.0);
                self.0.to_string()
            }
        };

        (
            status_for(kind),
            Json(ErrorResponse {
                success: false,
                code: self.0.code(),
                error: message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// HTTP Handlers - Characters
// ============================================================================

#[derive(Deserialize)]
struct CreateCharacterRequest {
    name: String,
}

#[derive(Serialize)]
struct CompleteResponse {
    #[serde(flatten)]
    character: CharacterView,
    completed: Quest,
}

/// POST /characters - Create a new character
async fn create_character(
    State(state): State<AppState>,
    Json(req): Json<CreateCharacterRequest>,
) -> ApiResult<impl IntoResponse> {
    let character = state.ledger.create_character(&req.name).await?;
    let view = CharacterView {
        character,
        quests: Vec::new(),
    };
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /characters/:id
async fn get_character(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> ApiResult<Json<CharacterView>> {
    Ok(Json(state.ledger.character_view(character_id).await?))
}

/// POST /characters/:id/quests/:quest_id - Accept a quest (append to the queue)
async fn accept_quest(
    State(state): State<AppState>,
    Path((character_id, quest_id)): Path<(i64, i64)>,
) -> ApiResult<Json<CharacterView>> {
    state.ledger.accept(character_id, quest_id).await?;
    Ok(Json(state.ledger.character_view(character_id).await?))
}

/// POST /characters/:id/complete - Complete the earliest accepted quest
async fn complete_quest(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> ApiResult<Json<CompleteResponse>> {
    // Remaining quests come from the completing transaction, not a second read
    let completion = state.ledger.complete(character_id).await?;
    Ok(Json(CompleteResponse {
        character: CharacterView {
            character: completion.character,
            quests: completion.remaining,
        },
        completed: completion.quest,
    }))
}

/// GET /characters/:id/quests - Active quests in FIFO order
async fn list_character_quests(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> ApiResult<Json<Vec<Quest>>> {
    Ok(Json(state.ledger.list(character_id).await?))
}

/// GET /characters/:id/assignments - Active assignments with their FIFO positions
async fn list_assignments(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> ApiResult<Json<Vec<Assignment>>> {
    Ok(Json(state.ledger.assignments(character_id).await?))
}

// ============================================================================
// HTTP Handlers - Quests
// ============================================================================

/// POST /quests - Create a quest in the pending state
async fn create_quest(
    State(state): State<AppState>,
    Json(req): Json<NewQuest>,
) -> ApiResult<impl IntoResponse> {
    let quest = state.ledger.create_quest(req).await?;
    Ok((StatusCode::CREATED, Json(quest)))
}

async fn list_quests(State(state): State<AppState>) -> ApiResult<Json<Vec<Quest>>> {
    Ok(Json(state.ledger.list_quests().await?))
}

async fn get_quest(
    State(state): State<AppState>,
    Path(quest_id): Path<i64>,
) -> ApiResult<Json<Quest>> {
    Ok(Json(state.ledger.get_quest(quest_id).await?))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis()
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Characters
        .route("/characters", post(create_character))
        .route("/characters/:id", get(get_character))
        .route("/characters/:id/quests", get(list_character_quests))
        .route("/characters/:id/quests/:quest_id", post(accept_quest))
        .route("/characters/:id/complete", post(complete_quest))
        .route("/characters/:id/assignments", get(list_assignments))
        // Quests
        .route("/quests", get(list_quests).post(create_quest))
        .route("/quests/:id", get(get_quest))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::OPTIONS])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
        .with_state(state)
}
