//! Name-indexed set of servable models.

use std::collections::BTreeMap;
use std::sync::Arc;

use feature_extractor::ImagePreprocessor;
use ml_model::Predictor;
use prediction_structs::{PredictionError, Schema, SchemaKind};
use tracing::info;

/// A loaded model together with the schema its requests must satisfy.
pub struct ModelEntry {
    name: String,
    schema: Schema,
    predictor: Arc<dyn Predictor>,
    preprocessor: ImagePreprocessor,
}

impl ModelEntry {
    pub fn new(name: impl Into<String>, schema: Schema, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            name: name.into(),
            schema,
            predictor,
            preprocessor: ImagePreprocessor::default(),
        }
    }

    /// Sets the pipeline image payloads go through before reaching the model.
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub const fn kind(&self) -> SchemaKind {
        self.schema.kind()
    }

    #[must_use]
    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    #[must_use]
    pub const fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }
}

impl core::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("family", &self.predictor.family())
            .field("preprocessor", &self.preprocessor)
            .finish()
    }
}

/// Registered models, keyed by name.
///
/// The registry is filled once at startup and then shared read-only behind an
/// `Arc`, so lookups never lock.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<ModelEntry>>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model. A model already registered under the same name is
    /// replaced and returned.
    pub fn register(&mut self, entry: ModelEntry) -> Option<Arc<ModelEntry>> {
        info!(
            model = %entry.name,
            family = entry.predictor.family(),
            fields = entry.schema.len(),
            "Registered model"
        );
        self.models.insert(entry.name.clone(), Arc::new(entry))
    }

    /// Finds a model by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no model is registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<ModelEntry>, PredictionError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| PredictionError::NotFound(name.to_string()))
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Registered models in name order.
    pub fn entries(&self) -> impl Iterator<Item = &Arc<ModelEntry>> {
        self.models.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
