use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use netpath_core::error::{ErrorCode, NetpathError};
use netpath_core::schedule::PreferenceSchedule;
use query::{OntologyError, OntologyLookup, QueryError, QueryOrchestrator, RawQueryParameters};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const NETWORK_PART: &str = "network_cx";
pub const SCHEDULE_PART: &str = "pref_schedule";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    orchestrator: QueryOrchestrator,
    ontology: Arc<dyn OntologyLookup>,
    preference_schedule: Arc<PreferenceSchedule>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(orchestrator: QueryOrchestrator, ontology: Arc<dyn OntologyLookup>) -> Self {
        Self {
            orchestrator,
            ontology,
            preference_schedule: Arc::new(PreferenceSchedule::default()),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    Router::new()
        .route("/statuscheck", get(status_check))
        .route("/ontologysub/:uuid/query/:node_id", get(ontology_subnetwork))
        .route("/directedpath/query", post(directed_path_query))
        .route("/getPreferenceSchedule", get(preference_schedule))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Ontology(#[from] OntologyError),
    #[error("Could not read uploaded files. Error --> {0}")]
    Upload(String),
    #[error("Query string is malformed. Error --> {0}")]
    QueryString(String),
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::QueryString(rejection.body_text())
    }
}

impl NetpathError for ApiError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::Query(err) => err.error_code(),
            ApiError::Ontology(err) => err.error_code(),
            ApiError::Upload(_) | ApiError::QueryString(_) => ErrorCode::InvalidArgument,
        }
    }
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Unavailable => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        // Upstream failures are already logged where the fetch failed.
        if code == ErrorCode::Internal {
            error!(error = %self, "request failed");
        }
        let body = Json(json!({ "message": self.to_string() }));
        (status_for(code), body).into_response()
    }
}

async fn status_check() -> Html<&'static str> {
    Html("<b>Service is up and running</b>!")
}

async fn ontology_subnetwork(
    State(state): State<AppState>,
    Path((uuid, node_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let data = state.ontology.subnetwork(&uuid, &node_id)?;
    Ok(Json(json!({ "data": data })))
}

async fn preference_schedule(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.preference_schedule.as_value() }))
}

async fn directed_path_query(
    State(state): State<AppState>,
    params: Result<Query<RawQueryParameters>, QueryRejection>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let uploads = read_uploads(&state, request).await?;
    let paths = state
        .orchestrator
        .execute(
            &params,
            uploads.network.as_deref(),
            uploads.schedule.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "data": paths })))
}

#[derive(Default)]
struct Uploads {
    network: Option<Vec<u8>>,
    schedule: Option<Vec<u8>>,
}

/// Non-multipart bodies carry no files; the query string alone must suffice.
async fn read_uploads(state: &AppState, request: Request) -> Result<Uploads, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));
    if !is_multipart {
        return Ok(Uploads::default());
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|err| ApiError::Upload(err.body_text()))?;

    let mut uploads = Uploads::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::Upload(err.body_text()))?
    {
        let name = field.name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::Upload(err.body_text()))?;
        match name.as_deref() {
            Some(NETWORK_PART) => uploads.network = Some(bytes.to_vec()),
            Some(SCHEDULE_PART) => uploads.schedule = Some(bytes.to_vec()),
            _ => {}
        }
    }
    Ok(uploads)
}
