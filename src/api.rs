// REST API over the access layer (feature `server`)
//
// The session comes from `?role=...&user=...` and is resolved once per request
// before any access call. All capability checks happen in `GymAccess`.

use crate::access::{BranchDeletion, GymAccess};
use crate::audit::Event;
use crate::consistency::DanglingReference;
use crate::entities::{
    Announcement, AnnouncementDraft, Branch, BranchPatch, Instructor, InstructorPatch,
    InstructorProfile, TermsAcceptance, TermsRequest, UserPatch, UserProfile,
};
use crate::error::AccessError;
use crate::roles::Session;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    access: GymAccess,
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionParams {
    role: Option<String>,
    user: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    revision: u64,
}

// ============================================================================
// ERRORS
// ============================================================================

pub struct ApiError(AccessError);

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &AccessError) -> StatusCode {
    match err {
        AccessError::Fetch(_) => StatusCode::SERVICE_UNAVAILABLE,
        AccessError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        AccessError::NotFound { .. } => StatusCode::NOT_FOUND,
        AccessError::DanglingReference(_) => StatusCode::CONFLICT,
        AccessError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

fn found<T>(entity: &'static str, id: &str, value: Option<T>) -> ApiResult<T> {
    match value {
        Some(value) => ok(value),
        None => Err(AccessError::NotFound {
            entity,
            id: id.to_string(),
        }
        .into()),
    }
}

impl AppState {
    fn session(&self, params: &SessionParams) -> Result<Session, ApiError> {
        Ok(self
            .access
            .session_for(params.role.as_deref(), params.user.as_deref())?)
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn health_check(State(state): State<AppState>) -> ApiResult<Health> {
    ok(Health {
        status: "OK",
        revision: state.access.revision(),
    })
}

/// GET /api/session - Resolved role and capabilities
async fn get_session(State(state): State<AppState>, Query(params): Query<SessionParams>) -> ApiResult<Session> {
    ok(state.session(&params)?)
}

async fn list_branches(State(state): State<AppState>, Query(params): Query<SessionParams>) -> ApiResult<Vec<Branch>> {
    let session = state.session(&params)?;
    ok(state.access.list_branches(&session)?)
}

async fn get_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Branch> {
    let session = state.session(&params)?;
    found("branch", &id, state.access.get_branch(&session, &id)?)
}

async fn create_branch(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
    Json(branch): Json<Branch>,
) -> ApiResult<Branch> {
    let session = state.session(&params)?;
    ok(state.access.create_branch(&session, branch)?)
}

async fn update_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
    Json(patch): Json<BranchPatch>,
) -> ApiResult<Branch> {
    let session = state.session(&params)?;
    ok(state.access.update_branch(&session, &id, patch)?)
}

async fn delete_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<BranchDeletion> {
    let session = state.session(&params)?;
    ok(state.access.delete_branch(&session, &id)?)
}

async fn branch_instructors(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Vec<Instructor>> {
    let session = state.session(&params)?;
    ok(state.access.instructors_for_branch(&session, &id)?)
}

async fn list_instructors(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Vec<InstructorProfile>> {
    let session = state.session(&params)?;
    ok(state.access.list_instructor_profiles(&session)?)
}

async fn get_instructor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<InstructorProfile> {
    let session = state.session(&params)?;
    found("instructor", &id, state.access.instructor_profile(&session, &id)?)
}

async fn create_instructor(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
    Json(instructor): Json<Instructor>,
) -> ApiResult<Instructor> {
    let session = state.session(&params)?;
    ok(state.access.create_instructor(&session, instructor)?)
}

async fn update_instructor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
    Json(patch): Json<InstructorPatch>,
) -> ApiResult<Instructor> {
    let session = state.session(&params)?;
    ok(state.access.update_instructor(&session, &id, patch)?)
}

async fn delete_instructor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Instructor> {
    let session = state.session(&params)?;
    ok(state.access.delete_instructor(&session, &id)?)
}

async fn list_users(State(state): State<AppState>, Query(params): Query<SessionParams>) -> ApiResult<Vec<UserProfile>> {
    let session = state.session(&params)?;
    ok(state.access.list_users(&session)?)
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<UserProfile> {
    let session = state.session(&params)?;
    found("user", &id, state.access.get_user(&session, &id)?)
}

async fn create_user(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
    Json(user): Json<UserProfile>,
) -> ApiResult<UserProfile> {
    let session = state.session(&params)?;
    ok(state.access.create_user(&session, user)?)
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
    Json(patch): Json<UserPatch>,
) -> ApiResult<UserProfile> {
    let session = state.session(&params)?;
    ok(state.access.update_user(&session, &id, patch)?)
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<UserProfile> {
    let session = state.session(&params)?;
    ok(state.access.delete_user(&session, &id)?)
}

/// POST /api/users/:id/check-in
async fn check_in(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<UserProfile> {
    let session = state.session(&params)?;
    ok(state.access.record_check_in(&session, &id)?)
}

async fn accept_terms(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
    Json(request): Json<TermsRequest>,
) -> ApiResult<TermsAcceptance> {
    let session = state.session(&params)?;
    ok(state.access.accept_terms(&session, request)?)
}

async fn list_terms(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Vec<TermsAcceptance>> {
    let session = state.session(&params)?;
    ok(state.access.list_terms(&session)?)
}

async fn get_terms(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionParams>,
) -> ApiResult<TermsAcceptance> {
    let session = state.session(&params)?;
    found("terms acceptance", &id, state.access.get_terms(&session, &id)?)
}

async fn list_announcements(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Vec<Announcement>> {
    let session = state.session(&params)?;
    ok(state.access.list_announcements(&session)?)
}

async fn post_announcement(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
    Json(draft): Json<AnnouncementDraft>,
) -> ApiResult<Announcement> {
    let session = state.session(&params)?;
    ok(state.access.post_announcement(&session, draft)?)
}

/// GET /api/audit/references - Dangling branch references
async fn audit_references(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Vec<DanglingReference>> {
    let session = state.session(&params)?;
    ok(state.access.audit_references(&session)?)
}

/// GET /api/history/:entity_type/:id
async fn history(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
    Query(params): Query<SessionParams>,
) -> ApiResult<Vec<Event>> {
    let session = state.session(&params)?;
    ok(state.access.history(&session, &entity_type, &id)?)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(access: GymAccess) -> Router {
    let state = AppState { access };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/session", get(get_session))
        .route("/branches", get(list_branches).post(create_branch))
        .route(
            "/branches/:id",
            get(get_branch).patch(update_branch).delete(delete_branch),
        )
        .route("/branches/:id/instructors", get(branch_instructors))
        .route("/instructors", get(list_instructors).post(create_instructor))
        .route(
            "/instructors/:id",
            get(get_instructor).patch(update_instructor).delete(delete_instructor),
        )
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).patch(update_user).delete(delete_user))
        .route("/users/:id/check-in", post(check_in))
        .route("/terms", get(list_terms).post(accept_terms))
        .route("/terms/:id", get(get_terms))
        .route("/announcements", get(list_announcements).post(post_announcement))
        .route("/audit/references", get(audit_references))
        .route("/history/:entity_type/:id", get(history))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (router(GymAccess::new(store.clone())), store)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "OK");
    }

    #[tokio::test]
    async fn test_session_defaults_to_student() {
        let (app, _) = app();
        let (_, body) = send(&app, "GET", "/api/session?role=superuser", None).await;
        assert_eq!(body["data"]["role"], "student");
        assert_eq!(body["data"]["capabilities"]["canManageBranches"], false);
    }

    #[tokio::test]
    async fn test_branch_crud_over_http() {
        let (app, _) = app();
        let branch = json!({
            "name": "Kings BJJ - Sul",
            "address": "Rua X, 100",
            "phone": "11999990000",
            "hours": "Seg-Sex 9h-21h",
            "responsible": "Prof. A"
        });

        let (status, _) = send(&app, "POST", "/api/branches?role=student", Some(branch.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, "POST", "/api/branches?role=admin", Some(branch)).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "GET", &format!("/api/branches/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["address"], "Rua X, 100");

        let (status, _) = send(&app, "DELETE", &format!("/api/branches/{}?role=admin", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", &format!("/api/branches/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_referenced_branch_delete_conflicts() {
        let (app, _) = app();
        let (_, body) = send(&app, "POST", "/api/branches?role=admin", Some(json!({"name": "Centro"}))).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "POST",
            "/api/instructors?role=admin",
            Some(json!({"name": "Prof. A", "belt": "Preta", "stripes": 2, "affiliations": [id]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "DELETE", &format!("/api/branches/{}?role=admin", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("Prof. A"));
    }

    #[tokio::test]
    async fn test_store_outage_is_503() {
        let (app, store) = app();
        store.set_available(false);
        let (status, body) = send(&app, "GET", "/api/branches", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_branch_is_422() {
        let (app, _) = app();
        let (status, _) = send(&app, "POST", "/api/branches?role=admin", Some(json!({"name": ""}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
