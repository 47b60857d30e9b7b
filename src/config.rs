use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::semantic::{Metric, ModelSpec};
use crate::storage::{BackendLocal, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

/// Dataset file name, relative to the data directory
const DEFAULT_DATASET_FILE: &str = "_model_data.json";
/// Number of neighbours printed per query
const DEFAULT_TOP_K: usize = 10;
/// Texts per embedding call
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;

const DEFAULT_QUERIES: &[&str] = &[
    "Girl influencers based in the Germany",
    "Fashion influencers based in the America",
    "Skin care influencers based in the United Kingdom",
    "Animal activists based in UK",
    "e-Sports people from USA",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("{field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_dataset_file")]
    pub dataset_file: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub metric: Metric,

    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Show a progress bar while embedding the corpus
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,

    #[serde(default = "default_models")]
    pub models: Vec<ModelSpec>,

    #[serde(default = "default_queries")]
    pub queries: Vec<String>,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_file: default_dataset_file(),
            top_k: DEFAULT_TOP_K,
            metric: Metric::default(),
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            show_progress: true,
            models: default_models(),
            queries: default_queries(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_dataset_file() -> String {
    DEFAULT_DATASET_FILE.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_embedding_batch_size() -> usize {
    DEFAULT_EMBEDDING_BATCH_SIZE
}

fn default_show_progress() -> bool {
    true
}

fn default_models() -> Vec<ModelSpec> {
    ModelSpec::defaults()
}

fn default_queries() -> Vec<String> {
    DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "top_k",
                message: "must be greater than 0".to_string(),
            });
        }

        if self.embedding_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding_batch_size",
                message: "must be greater than 0".to_string(),
            });
        }

        if self.models.is_empty() {
            return Err(ConfigError::Invalid {
                field: "models",
                message: "at least one model is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if model.model_name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "models",
                    message: format!("model '{}' has an empty model_name", model.key),
                });
            }
            if !seen.insert(model.model_name.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "models",
                    message: format!("duplicate model_name '{}'", model.model_name),
                });
            }
        }

        if self.queries.iter().all(|q| q.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "queries",
                message: "at least one non-empty query is required".to_string(),
            });
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults first if it does not exist.
    pub fn load_with(base_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base_path = base_path.as_ref();
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: base_path.join(CONFIG_FILE),
            source,
        };

        let store = BackendLocal::new(base_path).map_err(io_err)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            log::info!("Writing default config to {}", store.path(CONFIG_FILE).display());
            let defaults = serde_yml::to_string(&Self::default())?;
            store.write(CONFIG_FILE, defaults.as_bytes()).map_err(io_err)?;
        }

        let config_bytes = store.read(CONFIG_FILE).map_err(io_err)?;
        let config_str = String::from_utf8_lossy(&config_bytes);
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: self.base_path.join(CONFIG_FILE),
            source,
        };
        let store = BackendLocal::new(&self.base_path).map_err(io_err)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes()).map_err(io_err)
    }

    /// Directory holding the dataset, config and every cached artifact.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.base_path.join(&self.dataset_file)
    }

    /// Look up a configured model by key or model name (case-insensitive).
    pub fn model(&self, name: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| {
            m.key.eq_ignore_ascii_case(name) || m.model_name.eq_ignore_ascii_case(name)
        })
    }
}
