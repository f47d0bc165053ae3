//! Configuration loading from environment variables, and access to the
//! durable storage model artifacts are read from.

use core::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectStorePath;
use object_store::{ObjectStore, ObjectStoreExt};
use prediction_structs::ChannelOrder;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4000";
const DEFAULT_MODEL_BASE_PATH: &str = "./models";
const DEFAULT_TABULAR_MODEL_NAME: &str = "xgboost";
const DEFAULT_TABULAR_MODEL_PATH: &str = "xgboost_model.json";
/// Column order the reference tabular model was fitted on.
const DEFAULT_TABULAR_FIELDS: &str = "latitude,longitude,living_area,bathrooms,bedrooms";
const DEFAULT_IMAGE_MODEL_NAME: &str = "house_image";
const DEFAULT_IMAGE_MODEL_PATH: &str = "price_model.mpk";
const DEFAULT_IMAGE_FIELD: &str = "image";
const DEFAULT_IMAGE_SIZE: u32 = 224;

/// What to do when a model artifact fails to load at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LoadPolicy {
    /// Refuse to start.
    #[default]
    Strict,
    /// Start without the failed model.
    Degraded,
}

impl core::str::FromStr for LoadPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "degraded" => Ok(Self::Degraded),
            _ => Err(anyhow::anyhow!("Invalid model load policy: {s}")),
        }
    }
}

/// Deployment settings of the tabular model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularModelConfig {
    /// Registry name.
    pub name: String,
    /// Artifact path relative to the model base path.
    pub artifact: String,
    /// Feature names in the order the model expects them.
    pub fields: Vec<String>,
}

/// Deployment settings of the image model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageModelConfig {
    /// Registry name.
    pub name: String,
    /// Weights artifact path relative to the model base path.
    pub artifact: String,
    /// Name of the request field carrying the image.
    pub field: String,
    /// Target width and height after resizing.
    pub size: u32,
    pub channel_order: ChannelOrder,
}

impl ImageModelConfig {
    /// Path of the network configuration stored next to the weights.
    #[must_use]
    pub fn config_artifact(&self) -> String {
        format!("{}.config.json", self.artifact)
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Root directory of the model artifact store.
    pub model_base_path: PathBuf,

    pub load_policy: LoadPolicy,

    /// `None` when `TABULAR_MODEL_PATH` is set to an empty string.
    pub tabular: Option<TabularModelConfig>,

    /// `None` when `IMAGE_MODEL_PATH` is set to an empty string.
    pub image: Option<ImageModelConfig>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Every variable is optional:
    /// - `BIND_ADDR` (default `0.0.0.0:4000`)
    /// - `MODEL_BASE_PATH` (default `./models`)
    /// - `MODEL_LOAD_POLICY`: `strict` or `degraded` (default `strict`)
    /// - `TABULAR_MODEL_NAME`, `TABULAR_MODEL_PATH`, `TABULAR_FIELDS`
    /// - `IMAGE_MODEL_NAME`, `IMAGE_MODEL_PATH`, `IMAGE_FIELD`, `IMAGE_SIZE`,
    ///   `IMAGE_CHANNEL_ORDER`
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_addr = var("BIND_ADDR", DEFAULT_BIND_ADDR)
            .parse()
            .context("BIND_ADDR must be a socket address such as 0.0.0.0:4000")?;

        let model_base_path = PathBuf::from(var("MODEL_BASE_PATH", DEFAULT_MODEL_BASE_PATH));

        let load_policy = var("MODEL_LOAD_POLICY", "strict")
            .parse()
            .context("MODEL_LOAD_POLICY must be 'strict' or 'degraded'")?;

        let tabular_artifact = var("TABULAR_MODEL_PATH", DEFAULT_TABULAR_MODEL_PATH);
        let tabular = if tabular_artifact.trim().is_empty() {
            None
        } else {
            let fields: Vec<String> = var("TABULAR_FIELDS", DEFAULT_TABULAR_FIELDS)
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            if fields.is_empty() {
                anyhow::bail!("TABULAR_FIELDS must name at least one field");
            }

            Some(TabularModelConfig {
                name: var("TABULAR_MODEL_NAME", DEFAULT_TABULAR_MODEL_NAME),
                artifact: tabular_artifact,
                fields,
            })
        };

        let image_artifact = var("IMAGE_MODEL_PATH", DEFAULT_IMAGE_MODEL_PATH);
        let image = if image_artifact.trim().is_empty() {
            None
        } else {
            let size: u32 = var("IMAGE_SIZE", &DEFAULT_IMAGE_SIZE.to_string())
                .parse()
                .context("IMAGE_SIZE must be a positive integer")?;
            if size == 0 {
                anyhow::bail!("IMAGE_SIZE must be a positive integer");
            }

            let channel_order = var("IMAGE_CHANNEL_ORDER", "bgr")
                .parse()
                .context("IMAGE_CHANNEL_ORDER must be 'rgb' or 'bgr'")?;

            Some(ImageModelConfig {
                name: var("IMAGE_MODEL_NAME", DEFAULT_IMAGE_MODEL_NAME),
                artifact: image_artifact,
                field: var("IMAGE_FIELD", DEFAULT_IMAGE_FIELD),
                size,
                channel_order,
            })
        };

        Ok(Self {
            bind_addr,
            model_base_path,
            load_policy,
            tabular,
            image,
        })
    }
}

/// Read-only view of the storage holding model artifacts.
#[derive(Debug, Clone)]
pub struct ModelStore {
    store: Arc<dyn ObjectStore>,
    base_path: PathBuf,
}

impl ModelStore {
    /// Opens the artifact store rooted at `base_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist.
    pub fn open(base_path: &Path) -> Result<Self> {
        let store = LocalFileSystem::new_with_prefix(base_path).with_context(|| {
            format!("Failed to open model store at {}", base_path.display())
        })?;

        Ok(Self {
            store: Arc::new(store),
            base_path: base_path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Reads an artifact and returns its bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact is missing or unreadable.
    pub async fn read(&self, relative_path: &str) -> Result<Bytes> {
        let object_path = ObjectStorePath::from(relative_path);

        self.store
            .get(&object_path)
            .await
            .with_context(|| format!("Failed to read model artifact {relative_path}"))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read bytes of model artifact {relative_path}"))
    }
}
