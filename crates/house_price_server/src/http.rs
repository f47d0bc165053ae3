//! HTTP routes of the model server.
//!
//! Every failure, including unreadable bodies, is answered with
//! `{"error": "<message>"}` and the status of its [`PredictionError`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prediction_structs::{PredictionError, PredictionValue, RawFields, RawValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::dispatch;
use crate::registry::ModelRegistry;

/// Largest request body accepted, sized for full-resolution photos.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    registry: Arc<ModelRegistry>,
    tabular_model: Option<String>,
    image_model: Option<String>,
}

impl AppState {
    /// `tabular_model` and `image_model` name the models behind the fixed
    /// `/predict`, `/xgboost_predict` and `/image_predict` routes.
    #[must_use]
    pub const fn new(
        registry: Arc<ModelRegistry>,
        tabular_model: Option<String>,
        image_model: Option<String>,
    ) -> Self {
        Self {
            registry,
            tabular_model,
            image_model,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/predict", post(tabular_predict))
        .route("/xgboost_predict", post(positional_predict))
        .route("/image_predict", post(image_predict))
        .route("/models", get(list_models))
        .route("/models/{name}/predict", post(model_predict))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// A failed request, rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(PredictionError);

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

async fn ping() -> Json<Value> {
    Json(json!({ "message": "Model server is running" }))
}

async fn tabular_predict(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let result = async {
        let name = configured(state.tabular_model.as_deref(), "tabular")?;
        let fields = json_fields(&body)?;
        dispatch::predict(&state.registry, name, &fields).await
    }
    .await;

    respond("/predict", state.tabular_model.as_deref(), result)
}

#[derive(Deserialize)]
struct PositionalRequest {
    input: Vec<Value>,
}

async fn positional_predict(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let result = async {
        let name = configured(state.tabular_model.as_deref(), "tabular")?;
        let request: PositionalRequest = serde_json::from_slice(&body).map_err(|e| {
            PredictionError::MalformedRequest(format!("Expected {{\"input\": [...]}}: {e}"))
        })?;
        let value = dispatch::predict_positional(&state.registry, name, &request.input).await?;

        // This route always answers with a list, one entry per input row.
        Ok::<_, PredictionError>(match value {
            scalar @ PredictionValue::Scalar(_) => PredictionValue::List(vec![scalar]),
            list @ PredictionValue::List(_) => list,
        })
    }
    .await;

    respond("/xgboost_predict", state.tabular_model.as_deref(), result)
}

async fn image_predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let result = async {
        let name = configured(state.image_model.as_deref(), "image")?;
        let multipart = multipart.map_err(|e| PredictionError::MalformedRequest(e.body_text()))?;
        let fields = multipart_fields(multipart).await?;
        dispatch::predict(&state.registry, name, &fields).await
    }
    .await;

    respond("/image_predict", state.image_model.as_deref(), result)
}

/// Predicts with any registered model. Multipart bodies are read as form
/// parts, anything else as a JSON object of named fields.
async fn model_predict(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> ApiResult {
    let result = async {
        let fields = request_fields(request).await?;
        dispatch::predict(&state.registry, &name, &fields).await
    }
    .await;

    respond("/models/{name}/predict", Some(name.as_str()), result)
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let models: Vec<Value> = state
        .registry
        .entries()
        .map(|entry| {
            json!({
                "name": entry.name(),
                "schema": entry.schema().fields(),
            })
        })
        .collect();

    Json(json!({ "models": models }))
}

fn configured<'a>(name: Option<&'a str>, family: &str) -> Result<&'a str, PredictionError> {
    name.ok_or_else(|| PredictionError::NotFound(format!("no {family} model is configured")))
}

fn respond(
    route: &str,
    model: Option<&str>,
    result: Result<PredictionValue, PredictionError>,
) -> ApiResult {
    let model = model.unwrap_or("-");

    match result {
        Ok(prediction) => {
            info!(route, model, "Prediction served");
            Ok(Json(json!({ "prediction": prediction })))
        }
        Err(err) => {
            if err.is_client_error() {
                warn!(route, model, kind = %err.kind(), error = %err, "Prediction rejected");
            } else {
                error!(route, model, kind = %err.kind(), error = %err, "Prediction failed");
            }
            Err(err.into())
        }
    }
}

async fn request_fields(request: Request) -> Result<RawFields, PredictionError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| PredictionError::MalformedRequest(e.body_text()))?;
        multipart_fields(multipart).await
    } else {
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|e| PredictionError::MalformedRequest(e.body_text()))?;
        json_fields(&body)
    }
}

/// Reads a JSON object of named fields.
fn json_fields(body: &[u8]) -> Result<RawFields, PredictionError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PredictionError::MalformedRequest(format!("Invalid JSON body: {e}")))?;

    let Value::Object(object) = value else {
        return Err(PredictionError::MalformedRequest(
            "Request body must be a JSON object of named fields".to_string(),
        ));
    };

    Ok(object
        .into_iter()
        .map(|(name, value)| (name, RawValue::Json(value)))
        .collect())
}

/// Reads every named part of a multipart form as a binary payload.
async fn multipart_fields(mut multipart: Multipart) -> Result<RawFields, PredictionError> {
    let mut fields = RawFields::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PredictionError::MalformedRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| PredictionError::MalformedRequest(e.body_text()))?;
        fields.insert(name, RawValue::Binary(data));
    }

    Ok(fields)
}
