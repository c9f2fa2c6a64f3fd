//! HTTP handlers and router.
//!
//! Thin delivery layer: decode the request, call the service, encode
//! the result. Domain error codes map onto transport statuses here;
//! storage failures surface as opaque internal errors.

use std::sync::Arc;

use axum::{
    extract::{FromRequest, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use rota_core::error::{ErrorCode, ServiceError};
use rota_core::models::{PullRequest, PullRequestShort, Statistics, Team, User};
use rota_core::Service;

pub struct AppState {
    pub service: Service,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/team/add", post(create_team))
        .route("/team/get", get(get_team))
        .route("/users/setIsActive", post(set_user_active))
        .route("/users/getReview", get(get_user_reviews))
        .route("/pullRequest/create", post(create_pull_request))
        .route("/pullRequest/merge", post(merge_pull_request))
        .route("/pullRequest/reassign", post(reassign_reviewer))
        .route("/statistics", get(statistics))
        .with_state(state)
}

/// JSON body extractor whose rejection is the fixed error envelope.
///
/// axum's stock `Json` answers a bad body with plain text and a
/// status that varies by failure (415 for content type, 422 for shape).
/// The wire contract collapses every body-decode failure to a 400
/// carrying `{"error": {...}}`, so every handler takes this wrapper
/// instead.
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;
        Ok(Json(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

// =========================================================================
// Request / response shapes
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    #[serde(default)]
    pub team_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetUserActiveRequest {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePullRequestRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MergePullRequestRequest {
    pub pull_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReassignReviewerRequest {
    pub pull_request_id: String,
    pub old_user_id: String,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub team: Team,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct PullRequestResponse {
    pub pr: PullRequest,
}

#[derive(Debug, Serialize)]
pub struct ReassignResponse {
    pub pr: PullRequest,
    pub replaced_by: String,
}

#[derive(Debug, Serialize)]
pub struct UserReviewsResponse {
    pub user_id: String,
    pub pull_requests: Vec<PullRequestShort>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

// =========================================================================
// Error mapping
// =========================================================================

/// Delivery-layer error wrapper. Produces the fixed wire shape
/// `{"error": {"code": ..., "message": ...}}`.
pub enum ApiError {
    Service(ServiceError),
    /// Malformed or missing request input. Carries the legacy
    /// `NOT_FOUND` code on a 400, matching the original wire contract.
    BadRequest(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, ErrorCode::NotFound, message)
            }
            ApiError::Service(ServiceError::Domain(err)) => {
                let status = match err.code {
                    ErrorCode::TeamExists => StatusCode::BAD_REQUEST,
                    ErrorCode::PrExists
                    | ErrorCode::PrMerged
                    | ErrorCode::NotAssigned
                    | ErrorCode::NoCandidate => StatusCode::CONFLICT,
                    ErrorCode::NotFound => StatusCode::NOT_FOUND,
                };
                (status, err.code, err.message)
            }
            ApiError::Service(ServiceError::Storage(err)) => {
                error!(error = %err, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::NotFound,
                    "internal server error".to_string(),
                )
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}

// =========================================================================
// Handlers
// =========================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "review-rota"
    }))
}

async fn create_team(
    State(state): State<Arc<AppState>>,
    Json(team): Json<Team>,
) -> Result<impl IntoResponse, ApiError> {
    let team = state.service.create_team(team).await?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

async fn get_team(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Team>, ApiError> {
    if query.team_name.is_empty() {
        return Err(ApiError::BadRequest("team_name is required".to_string()));
    }
    let team = state.service.get_team(&query.team_name).await?;
    Ok(Json(team))
}

async fn set_user_active(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetUserActiveRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .service
        .set_user_active(&req.user_id, req.is_active)
        .await?;
    Ok(Json(UserResponse { user }))
}

async fn get_user_reviews(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserReviewsResponse>, ApiError> {
    if query.user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }
    let pull_requests = state.service.get_user_reviews(&query.user_id).await?;
    Ok(Json(UserReviewsResponse {
        user_id: query.user_id,
        pull_requests,
    }))
}

async fn create_pull_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePullRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pr = state
        .service
        .create_pull_request(&req.pull_request_id, &req.pull_request_name, &req.author_id)
        .await?;
    Ok((StatusCode::CREATED, Json(PullRequestResponse { pr })))
}

async fn merge_pull_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MergePullRequestRequest>,
) -> Result<Json<PullRequestResponse>, ApiError> {
    let pr = state.service.merge_pull_request(&req.pull_request_id).await?;
    Ok(Json(PullRequestResponse { pr }))
}

async fn reassign_reviewer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReassignReviewerRequest>,
) -> Result<Json<ReassignResponse>, ApiError> {
    let (pr, replaced_by) = state
        .service
        .reassign_reviewer(&req.pull_request_id, &req.old_user_id)
        .await?;
    Ok(Json(ReassignResponse { pr, replaced_by }))
}

async fn statistics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Statistics>, ApiError> {
    let stats = state.service.statistics().await?;
    Ok(Json(stats))
}
