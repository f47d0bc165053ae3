//! Inspect command - loads the models and reports what would be served.

use anyhow::Result;
use config::Config;
use tracing::info;

use crate::loader::load_registry;

/// Runs the inspect command.
///
/// # Errors
///
/// Returns an error if the models fail to load under the configured policy.
pub async fn run(config: &Config) -> Result<()> {
    let registry = load_registry(config, config.load_policy).await?;

    for entry in registry.entries() {
        let fields: Vec<String> = entry
            .schema()
            .fields()
            .iter()
            .map(|f| format!("{}:{}", f.name, f.field_type))
            .collect();

        info!(
            model = entry.name(),
            family = entry.predictor().family(),
            schema = %fields.join(","),
            "Model"
        );
    }

    info!(models = registry.len(), "Inspection complete");
    Ok(())
}
