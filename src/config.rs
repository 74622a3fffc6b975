use std::path::Path;

use crate::clustering::KMeansConfig;
use crate::error::ConfigError;
use crate::mdp::MdpConfig;
use crate::neural::NeuralConfig;
use crate::persistence::StoreConfig;
use crate::rl::gridworld::GridWorldConfig;
use crate::rl::snake::SnakeConfig;
use crate::search::SearchConfig;
use crate::supervised::SupervisedConfig;

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub mdp: MdpConfig,
    pub gridworld: GridWorldConfig,
    pub snake: SnakeConfig,
    pub neural: NeuralConfig,
    pub supervised: SupervisedConfig,
    pub kmeans: KMeansConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::warn!("config file '{}' not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search.validate()?;
        self.mdp.validate()?;
        self.gridworld.validate()?;
        self.snake.validate()?;
        self.neural.validate()?;
        self.supervised.validate()?;
        self.kmeans.validate()?;
        if self.store.dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("store.dir must not be empty".into()));
        }
        Ok(())
    }

    /// Apply a seed to every engine section.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.search.seed = Some(seed);
        self.mdp.seed = Some(seed);
        self.gridworld.seed = Some(seed);
        self.snake.seed = Some(seed);
        self.neural.seed = Some(seed);
        self.supervised.seed = Some(seed);
        self.kmeans.seed = Some(seed);
        self
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).expect("default config serializes")
    }
}
