//! Configuration for the project import pipeline.
//!
//! Engine settings sources and precedence (highest wins):
//! 1. Explicit overrides
//! 2. Environment variables (`PROJECT_IMPORT_*`)
//! 3. YAML settings file
//! 4. Defaults
//!
//! Per-attempt choices (which export, which project) live in
//! [`ProjectImportOptions`] and are never read from the environment.

use crate::error::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "PROJECT_IMPORT_";

const DEFAULT_WORKER_THREADS: usize = 10;
const DEFAULT_QUEUE_CAPACITY: usize = 20;
const DEFAULT_ABORT_THRESHOLD: usize = 10;
const DEFAULT_PROGRESS_STEP: usize = 1;

/// Engine tuning shared by every import attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Worker threads per persistence phase.
    pub worker_threads: usize,
    /// Bounded queue capacity per persistence phase.
    pub queue_capacity: usize,
    /// Soft errors tolerated before the attempt aborts.
    pub abort_threshold: usize,
    /// Parent directory for the per-attempt staging directory.
    pub staging_dir: Option<PathBuf>,
    /// Report progress every this many records.
    pub progress_step: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            abort_threshold: DEFAULT_ABORT_THRESHOLD,
            staging_dir: None,
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }
}

impl ImportSettings {
    /// Build settings from a merged layer, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Config`] for unparsable or zero-valued numbers.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            worker_threads: positive(layer, "worker-threads")?.unwrap_or(defaults.worker_threads),
            queue_capacity: positive(layer, "queue-capacity")?.unwrap_or(defaults.queue_capacity),
            abort_threshold: positive(layer, "abort-threshold")?
                .unwrap_or(defaults.abort_threshold),
            staging_dir: layer
                .get("staging-dir")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            progress_step: positive(layer, "progress-step")?.unwrap_or(defaults.progress_step),
        })
    }
}

/// Options for a single import attempt, passed in by the surrounding workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectImportOptions {
    /// Export file to read.
    pub backup_path: PathBuf,
    /// Key of the project to take out of the export.
    pub project_key: String,
    /// Root of the attachment tree; attachments are skipped when absent.
    #[serde(default)]
    pub attachment_path: Option<PathBuf>,
    /// Overwrite name/lead/description of an existing destination project.
    #[serde(default)]
    pub overwrite_project_details: bool,
}

impl ProjectImportOptions {
    #[must_use]
    pub fn new(backup_path: impl Into<PathBuf>, project_key: impl Into<String>) -> Self {
        Self {
            backup_path: backup_path.into(),
            project_key: project_key.into(),
            attachment_path: None,
            overwrite_project_details: false,
        }
    }

    #[must_use]
    pub fn with_attachment_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment_path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn with_overwrite_project_details(mut self, overwrite: bool) -> Self {
        self.overwrite_project_details = overwrite;
        self
    }
}

/// One source of settings as normalized key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    values: HashMap<String, String>,
}

impl ConfigLayer {
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        let mut flat = HashMap::new();
        flatten_yaml(&value, "", &mut flat);
        let mut layer = Self::default();
        for (key, value) in flat {
            layer.insert(&key, value);
        }
        Ok(layer)
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Build a layer from `PROJECT_IMPORT_*` pairs, ignoring everything else.
    #[must_use]
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layer.insert(stripped, value);
            }
        }
        layer
    }
}

/// Explicit overrides, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub worker_threads: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub abort_threshold: Option<usize>,
    pub staging_dir: Option<PathBuf>,
    pub progress_step: Option<usize>,
}

impl SettingsOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(workers) = self.worker_threads {
            layer.insert("worker-threads", workers.to_string());
        }
        if let Some(capacity) = self.queue_capacity {
            layer.insert("queue-capacity", capacity.to_string());
        }
        if let Some(threshold) = self.abort_threshold {
            layer.insert("abort-threshold", threshold.to_string());
        }
        if let Some(path) = &self.staging_dir {
            layer.insert("staging-dir", path.to_string_lossy().to_string());
        }
        if let Some(step) = self.progress_step {
            layer.insert("progress-step", step.to_string());
        }

        layer
    }
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let defaults = ImportSettings::default();
    let mut layer = ConfigLayer::default();
    layer.insert("worker-threads", defaults.worker_threads.to_string());
    layer.insert("queue-capacity", defaults.queue_capacity.to_string());
    layer.insert("abort-threshold", defaults.abort_threshold.to_string());
    layer.insert("progress-step", defaults.progress_step.to_string());
    layer
}

/// Load settings with the full precedence order.
///
/// # Errors
///
/// Returns an error if the settings file cannot be read or parsed, or a
/// value is invalid.
pub fn load_settings(
    settings_file: Option<&Path>,
    overrides: &SettingsOverrides,
) -> Result<ImportSettings> {
    let file_layer = match settings_file {
        Some(path) => ConfigLayer::from_yaml(path)?,
        None => ConfigLayer::default(),
    };
    let merged = ConfigLayer::merge_layers(&[
        default_config_layer(),
        file_layer,
        ConfigLayer::from_env(),
        overrides.as_layer(),
    ]);
    let settings = ImportSettings::from_layer(&merged)?;
    tracing::debug!(
        workers = settings.worker_threads,
        queue = settings.queue_capacity,
        abort_threshold = settings.abort_threshold,
        "Loaded import settings"
    );
    Ok(settings)
}

fn positive(layer: &ConfigLayer, key: &str) -> Result<Option<usize>> {
    let Some(raw) = layer.get(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ImportError::Config(format!("{key} must be greater than zero"))),
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ImportError::Config(format!(
            "invalid value '{raw}' for {key}"
        ))),
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
