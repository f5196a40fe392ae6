//! Embedded HTTP front-end: a thin axum layer over [`TokenService`].
//!
//! Two routes only — `GET /models` and `POST /tokenize`. Handlers parse the
//! request, call the service, and serialize JSON; every error becomes
//! `{"error": <message>}` with a status code matching its kind.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use crate::model::ModelSpec;
use crate::service::{Calculation, ServiceError, TokenService};
use crate::tokenize::TokenizeError;

/// JSON error payload with a transport status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Tokenize(cause) => match cause {
                TokenizeError::MissingDependency
                | TokenizeError::Download(_)
                | TokenizeError::LocalFileNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<ModelSpec>,
}

#[derive(Deserialize)]
struct TokenizeRequest {
    #[serde(alias = "model_id")]
    model: Option<String>,
    #[serde(default)]
    text: String,
}

/// Build the router over a shared service.
pub fn router(service: Arc<TokenService>) -> Router {
    Router::new()
        .route("/models", get(list_models))
        .route("/tokenize", post(tokenize))
        .with_state(service)
}

/// Bind `host:port` and serve until the process exits.
pub async fn serve(service: Arc<TokenService>, host: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving token API");
    axum::serve(listener, router(service)).await
}

/// GET /models
async fn list_models(State(service): State<Arc<TokenService>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: service.list_models().to_vec(),
    })
}

/// POST /tokenize
///
/// Tokenization of an uncached remote model can block on a download, so the
/// service call runs on the blocking pool.
async fn tokenize(
    State(service): State<Arc<TokenService>>,
    payload: Result<Json<TokenizeRequest>, JsonRejection>,
) -> Result<Json<Calculation>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(format!("invalid request body: {rejection}")))?;
    let model = request
        .model
        .filter(|model| !model.is_empty())
        .ok_or_else(|| ApiError::bad_request("'model' is required"))?;
    let text = request.text;

    let result = tokio::task::spawn_blocking(move || service.calculate(&model, &text))
        .await
        .map_err(|e| ApiError::internal(format!("tokenization task failed: {e}")))??;
    Ok(Json(result))
}
