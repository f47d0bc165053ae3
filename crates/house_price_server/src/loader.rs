//! Startup loading of model artifacts into a [`ModelRegistry`].

use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use config::{Config, ImageModelConfig, LoadPolicy, ModelStore, TabularModelConfig};
use feature_extractor::ImagePreprocessor;
use ml_model::{GradientBoostedTrees, ImagePredictor};
use prediction_structs::Schema;
use tracing::{error, info, warn};

use crate::backend::{InferenceBackend, InferenceDevice, init_device};
use crate::registry::{ModelEntry, ModelRegistry};

/// Loads every configured model.
///
/// Under [`LoadPolicy::Strict`] the first failure aborts loading. Under
/// [`LoadPolicy::Degraded`] failed models are left out of the registry and
/// the remaining ones are returned.
///
/// # Errors
///
/// Returns an error under the strict policy if the model store cannot be
/// opened or any artifact fails to load.
pub async fn load_registry(config: &Config, policy: LoadPolicy) -> Result<ModelRegistry> {
    info!(
        base_path = %config.model_base_path.display(),
        policy = %policy,
        "Loading models"
    );

    let mut registry = ModelRegistry::new();

    let store = match ModelStore::open(&config.model_base_path) {
        Ok(store) => store,
        Err(e) => {
            return match policy {
                LoadPolicy::Strict => {
                    error!(error = %format!("{e:#}"), "Model store unavailable");
                    Err(e)
                }
                LoadPolicy::Degraded => {
                    warn!(error = %format!("{e:#}"), "Model store unavailable, serving no models");
                    Ok(registry)
                }
            };
        }
    };

    if let Some(tabular) = &config.tabular {
        let loaded = load_tabular(&store, tabular).await;
        admit(&mut registry, &tabular.name, loaded, policy)?;
    }

    if let Some(image) = &config.image {
        let loaded = load_image(&store, image, &init_device()).await;
        admit(&mut registry, &image.name, loaded, policy)?;
    }

    info!(models = registry.len(), "Model registry ready");
    Ok(registry)
}

fn admit(
    registry: &mut ModelRegistry,
    name: &str,
    loaded: Result<ModelEntry>,
    policy: LoadPolicy,
) -> Result<()> {
    match (loaded, policy) {
        (Ok(entry), _) => {
            registry.register(entry);
            Ok(())
        }
        (Err(e), LoadPolicy::Strict) => {
            error!(model = name, error = %format!("{e:#}"), "Failed to load model");
            Err(e.context(format!("Failed to load model '{name}'")))
        }
        (Err(e), LoadPolicy::Degraded) => {
            warn!(model = name, error = %format!("{e:#}"), "Skipping model that failed to load");
            Ok(())
        }
    }
}

/// Loads the XGBoost ensemble and checks it against the configured fields.
///
/// # Errors
///
/// Returns an error if the artifact is unreadable or invalid, or its feature
/// count differs from the configured fields.
pub async fn load_tabular(store: &ModelStore, config: &TabularModelConfig) -> Result<ModelEntry> {
    let bytes = store.read(&config.artifact).await?;
    let model = GradientBoostedTrees::from_json_slice(&bytes)
        .with_context(|| format!("Invalid tabular model artifact {}", config.artifact))?;

    let schema = Schema::tabular(config.fields.iter().cloned())
        .context("Invalid tabular field configuration")?;

    ensure!(
        model.num_feature() == schema.len(),
        "Model expects {} features but {} fields are configured",
        model.num_feature(),
        schema.len()
    );

    let names = model.feature_names();
    if !names.is_empty() && !names.iter().map(String::as_str).eq(schema.names()) {
        warn!(
            model = %config.name,
            fitted = ?names,
            configured = ?config.fields,
            "Configured fields differ from the names the model was fitted with"
        );
    }

    info!(
        model = %config.name,
        trees = model.num_trees(),
        objective = ?model.objective(),
        "Loaded tabular model"
    );

    Ok(ModelEntry::new(&config.name, schema, Arc::new(model)))
}

/// Loads the image regressor from its weights and network configuration.
///
/// # Errors
///
/// Returns an error if either artifact is unreadable or they do not describe
/// a valid regressor.
pub async fn load_image(
    store: &ModelStore,
    config: &ImageModelConfig,
    device: &InferenceDevice,
) -> Result<ModelEntry> {
    let network = store.read(&config.config_artifact()).await?;
    let weights = store.read(&config.artifact).await?;

    let predictor = ImagePredictor::<InferenceBackend>::from_bytes(&network, &weights, device)
        .with_context(|| format!("Invalid image model artifact {}", config.artifact))?;

    let schema = Schema::image(&config.field).context("Invalid image field configuration")?;
    let preprocessor = ImagePreprocessor::new(config.size, config.channel_order);

    info!(
        model = %config.name,
        size = preprocessor.size(),
        channel_order = %preprocessor.channel_order(),
        "Loaded image model"
    );

    Ok(ModelEntry::new(&config.name, schema, Arc::new(predictor)).with_preprocessor(preprocessor))
}
