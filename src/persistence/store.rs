use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistenceError;
use crate::rl::gridworld::{self, GridWorldLab, GridWorldSnapshot};
use crate::rl::snake::{self, SnakeLab, SnakeSnapshot};

/// Where policy snapshots are kept.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            dir: PathBuf::from("policies"),
        }
    }
}

/// A directory of named JSON policy snapshots, one `<name>.json` file each.
///
/// Writes go to a `.tmp` sibling first and are renamed into place, so a
/// reader never sees a half-written snapshot.
pub struct PolicyStore {
    config: StoreConfig,
}

impl PolicyStore {
    pub fn new(config: StoreConfig) -> Result<Self, PersistenceError> {
        fs::create_dir_all(&config.dir)?;
        Ok(PolicyStore { config })
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Path of the snapshot file for `name`.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, PersistenceError> {
        validate_name(name)?;
        Ok(self.config.dir.join(format!("{name}.json")))
    }

    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, PersistenceError> {
        let final_path = self.path_for(name)?;
        let tmp_path = self.config.dir.join(format!("{name}.json.tmp"));

        let json = serde_json::to_string_pretty(value)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &final_path)?;

        log::debug!("saved policy '{}' to {}", name, final_path.display());
        Ok(final_path)
    }

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T, PersistenceError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(PersistenceError::NotFound(name.to_string()));
        }
        let json = fs::read_to_string(&path).map_err(|e| PersistenceError::Read {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| PersistenceError::Parse { path, source: e })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Names of all saved snapshots, sorted.
    pub fn list(&self) -> Result<Vec<String>, PersistenceError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a snapshot. Returns whether one existed.
    pub fn remove(&self, name: &str) -> Result<bool, PersistenceError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }

    pub fn save_gridworld(&self, lab: &GridWorldLab) -> Result<PathBuf, PersistenceError> {
        self.save(gridworld::POLICY_KEY, &lab.snapshot())
    }

    /// Load the saved grid-world policy into `lab`. On any error the lab is
    /// left as it was.
    pub fn load_gridworld(&self, lab: &mut GridWorldLab) -> Result<(), PersistenceError> {
        let snapshot: GridWorldSnapshot = self.load(gridworld::POLICY_KEY)?;
        lab.restore(&snapshot)
    }

    pub fn save_snake(&self, lab: &SnakeLab) -> Result<PathBuf, PersistenceError> {
        self.save(snake::POLICY_KEY, &lab.snapshot())
    }

    pub fn load_snake(&self, lab: &mut SnakeLab) -> Result<(), PersistenceError> {
        let snapshot: SnakeSnapshot = self.load(snake::POLICY_KEY)?;
        lab.restore(&snapshot)
    }
}

fn validate_name(name: &str) -> Result<(), PersistenceError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(PersistenceError::InvalidSnapshot(format!(
            "invalid policy name '{name}'"
        )))
    }
}
