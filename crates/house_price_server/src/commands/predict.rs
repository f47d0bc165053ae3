//! Predict command - runs one offline prediction through the serving path.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use config::Config;
use prediction_structs::{PredictionValue, RawFields, RawValue};
use serde_json::{Value, json};
use tracing::info;

use crate::dispatch;
use crate::loader::load_registry;

/// Runs the predict command and prints the JSON result.
///
/// # Arguments
///
/// * `model` - Registered model name
/// * `fields` - `name=value` pairs
/// * `image` - Image file bound to the image model's field
///
/// # Errors
///
/// Returns an error if the models fail to load, an argument is malformed, or
/// the prediction is rejected.
pub async fn run(
    config: &Config,
    model: &str,
    fields: &[String],
    image: Option<&Path>,
) -> Result<()> {
    let prediction = predict_once(config, model, fields, image).await?;

    println!("{}", json!({ "prediction": prediction }));
    Ok(())
}

/// Loads the models and runs a single prediction.
///
/// # Errors
///
/// See [`run`].
pub async fn predict_once(
    config: &Config,
    model: &str,
    fields: &[String],
    image: Option<&Path>,
) -> Result<PredictionValue> {
    let registry = load_registry(config, config.load_policy).await?;
    let mut raw = parse_fields(fields)?;

    if let Some(path) = image {
        let field = config
            .image
            .as_ref()
            .map_or("image", |image| image.field.as_str());
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        raw.insert(field.to_string(), RawValue::Binary(Bytes::from(bytes)));
    }

    info!(model, fields = raw.len(), "Running prediction");

    Ok(dispatch::predict(&registry, model, &raw).await?)
}

/// Parses `name=value` pairs into JSON string fields.
fn parse_fields(pairs: &[String]) -> Result<RawFields> {
    pairs
        .iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected name=value, got '{pair}'"))?;
            Ok((
                name.trim().to_string(),
                RawValue::Json(Value::String(value.trim().to_string())),
            ))
        })
        .collect()
}
