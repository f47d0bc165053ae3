//! Turns validated fields into a model call and its JSON-ready result.

use std::sync::Arc;

use feature_extractor::{assemble_feature_row, validate, validate_positional};
use ml_model::{ModelInput, ModelOutput};
use prediction_structs::{
    FieldType, PredictionError, PredictionValue, RawFields, SchemaKind, TypedFields, TypedValue,
};
use serde_json::Value;
use tracing::debug;

use crate::registry::{ModelEntry, ModelRegistry};

/// Runs one prediction on already validated fields.
///
/// This call is CPU-bound and blocks the current thread.
///
/// # Errors
///
/// Returns `DecodeFailure` if an image payload cannot be decoded, and
/// `ModelFailure` if the model call fails or yields a non-finite value.
pub fn dispatch(
    entry: &ModelEntry,
    fields: &TypedFields,
) -> Result<PredictionValue, PredictionError> {
    let input = prepare_input(entry, fields)?;

    let output = entry
        .predictor()
        .predict(&input)
        .map_err(|e| PredictionError::ModelFailure(format!("{e:#}")))?;

    debug!(
        model = entry.name(),
        shape = ?output.shape,
        "Model call returned"
    );

    normalize_output(&output)
}

fn prepare_input(entry: &ModelEntry, fields: &TypedFields) -> Result<ModelInput, PredictionError> {
    match entry.kind() {
        SchemaKind::Tabular => Ok(ModelInput::Tabular(assemble_feature_row(
            entry.schema(),
            fields,
        )?)),
        SchemaKind::Image => {
            let field = &entry.schema().fields()[0].name;
            match fields.get(field) {
                Some(TypedValue::Image(bytes)) => {
                    Ok(ModelInput::Image(entry.preprocessor().preprocess(bytes)?))
                }
                Some(TypedValue::Number(_)) => {
                    Err(PredictionError::bad_type(field, FieldType::Image))
                }
                None => Err(PredictionError::missing_field(field)),
            }
        }
    }
}

/// Converts a raw model output into a finite number or nested list.
fn normalize_output(output: &ModelOutput) -> Result<PredictionValue, PredictionError> {
    let value = PredictionValue::from_shaped(&output.values, &output.shape).ok_or_else(|| {
        PredictionError::ModelFailure(format!(
            "Model returned {} values for shape {:?}",
            output.values.len(),
            output.shape
        ))
    })?;

    if !value.is_finite() {
        return Err(PredictionError::ModelFailure(
            "Model produced a non-finite prediction".to_string(),
        ));
    }

    Ok(value)
}

/// Looks up, validates and runs a prediction against a named model.
///
/// # Errors
///
/// Returns `NotFound` for an unknown model, a validation error for a payload
/// that does not satisfy the schema, or any error of [`dispatch`].
pub async fn predict(
    registry: &ModelRegistry,
    name: &str,
    fields: &RawFields,
) -> Result<PredictionValue, PredictionError> {
    let entry = registry.lookup(name)?;
    let typed = validate(entry.schema(), fields)?;
    dispatch_blocking(entry, typed).await
}

/// Like [`predict`], for a bare list of values bound to the schema by position.
///
/// # Errors
///
/// Returns `MalformedRequest` if the model is not tabular or the number of
/// values does not match its schema, otherwise the errors of [`predict`].
pub async fn predict_positional(
    registry: &ModelRegistry,
    name: &str,
    values: &[Value],
) -> Result<PredictionValue, PredictionError> {
    let entry = registry.lookup(name)?;
    let typed = validate_positional(entry.schema(), values)?;
    dispatch_blocking(entry, typed).await
}

/// Runs [`dispatch`] on the blocking pool so inference never stalls the
/// async workers.
///
/// # Errors
///
/// Returns the errors of [`dispatch`]; a panic inside the model call is
/// reported as `ModelFailure`.
pub async fn dispatch_blocking(
    entry: Arc<ModelEntry>,
    fields: TypedFields,
) -> Result<PredictionValue, PredictionError> {
    tokio::task::spawn_blocking(move || dispatch(&entry, &fields))
        .await
        .map_err(|e| {
            if e.is_panic() {
                PredictionError::ModelFailure("Model call panicked".to_string())
            } else {
                PredictionError::ModelFailure(e.to_string())
            }
        })?
}
