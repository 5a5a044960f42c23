use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use consult_flow::{
    BusinessProfile, ConsultError, Consultant, FlowRunner, SessionStorage, Stage, UserAction,
    consulting_workflow,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::models::{ActionResponse, CreateConsultationRequest, SessionView};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

/// Map a workflow error onto a status code; the session is never modified on error
fn error_response(err: ConsultError) -> ApiError {
    match &err {
        ConsultError::Validation(_) | ConsultError::InvalidAction { .. } => {
            bad_request_error(&err.to_string())
        }
        ConsultError::MissingRequiredFields(fields) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": err.to_string(),
                "missing_fields": fields
            })),
        ),
        ConsultError::SessionNotFound(id) => not_found_error("Session not found", id),
        ConsultError::MalformedResponse { reason, raw } => {
            warn!(reason = %reason, "model response could not be used");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "The model response could not be understood, please try again",
                    "details": reason,
                    "raw_response": raw
                })),
            )
        }
        ConsultError::External(details) => {
            error!(error = %details, "external service call failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "An external service failed",
                    "details": details
                })),
            )
        }
        _ => {
            error!(error = %err, "request failed");
            internal_error("Internal error", &err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: FlowRunner,
    pub business: Arc<BusinessProfile>,
}

impl AppState {
    pub fn new(consultant: Arc<Consultant>, storage: Arc<dyn SessionStorage>) -> Self {
        let business = Arc::new(consultant.business.clone());
        let workflow = consulting_workflow(consultant);
        Self {
            runner: FlowRunner::new(Arc::new(workflow), storage),
            business,
        }
    }
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/suggestions", get(suggestions))
        .route("/consultations", post(create_consultation))
        .route("/consultations/{session_id}", get(get_consultation))
        .route("/consultations/{session_id}/actions", post(apply_action))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Business Consulting Assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Guided consulting workflow: frame the problem, collect data, get recommendations",
        "stages": Stage::ALL,
        "endpoints": {
            "GET /suggestions": "Research task cards and suggested challenges",
            "POST /consultations": "Start a new consultation",
            "GET /consultations/{session_id}": "Get the current state of a consultation",
            "POST /consultations/{session_id}/actions": "Apply one action to a consultation",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn suggestions(State(state): State<AppState>) -> Json<Value> {
    let business = &state.business;
    Json(json!({
        "business": business.name,
        "user": business.user,
        "quarter": business.quarter,
        "motivation": business.motivation,
        "task_cards": business.task_cards,
        "suggestions": business.suggestions
    }))
}

async fn create_consultation(
    State(state): State<AppState>,
    Json(request): Json<CreateConsultationRequest>,
) -> ApiResult<ActionResponse> {
    let action = match (request.problem, request.task_index) {
        (Some(problem), _) => Some(UserAction::StartConsultation {
            problem,
            category: request.category,
        }),
        (None, Some(index)) => Some(UserAction::StartTask {
            index,
            category: request.category,
        }),
        (None, None) => None,
    };

    let session = state.runner.create_session().await.map_err(error_response)?;
    let Some(action) = action else {
        return Ok(Json(ActionResponse::idle(&session)));
    };

    match run_action(&state, &session.id, action).await {
        Ok(response) => Ok(response),
        Err(e) => {
            // A consultation that failed to start is not kept around
            if let Err(delete_error) = state.runner.storage().delete(&session.id).await {
                error!(session_id = %session.id, error = %delete_error, "Failed to discard session");
            }
            Err(e)
        }
    }
}

async fn get_consultation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionView> {
    info!(session_id = %session_id, "Getting consultation");
    let session = state
        .runner
        .get_session(&session_id)
        .await
        .map_err(error_response)?;
    Ok(Json(SessionView::from(&session)))
}

async fn apply_action(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(action): Json<UserAction>,
) -> ApiResult<ActionResponse> {
    run_action(&state, &session_id, action).await
}

async fn run_action(
    state: &AppState,
    session_id: &str,
    action: UserAction,
) -> ApiResult<ActionResponse> {
    info!(session_id = %session_id, action = action.name(), "Applying action");

    let (result, session) = state
        .runner
        .run_with_session(session_id, action)
        .await
        .map_err(error_response)?;

    info!(
        session_id = %result.session_id,
        stage = %result.stage,
        status = ?result.status,
        "Action completed"
    );
    Ok(Json(ActionResponse::new(result, &session)))
}
