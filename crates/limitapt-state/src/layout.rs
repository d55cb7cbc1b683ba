use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const DEFAULT_STATE_DIR: &str = "/var/lib/limitapt";
pub const STATE_DIR_ENV: &str = "LIMITAPT_STATE_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Explicit directory first, then `LIMITAPT_STATE_DIR`, then the system default.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        if let Some(root) = explicit {
            return Self::new(root);
        }
        match std::env::var_os(STATE_DIR_ENV) {
            Some(root) if !root.is_empty() => Self::new(root),
            _ => Self::new(DEFAULT_STATE_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.toml")
    }

    pub fn coownership_path(&self) -> PathBuf {
        self.root.join("coownership.toml")
    }

    pub fn enclosures_dir(&self) -> PathBuf {
        self.root.join("enclosures")
    }

    pub fn enclosure_path(&self, source: &str) -> PathBuf {
        self.enclosures_dir().join(format!("{source}.toml"))
    }

    pub fn debconf_priorities_path(&self) -> PathBuf {
        self.root.join("debconf-priorities.toml")
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.root.join("journal")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.journal_dir().join("interrupted.json")
    }

    pub fn update_times_path(&self) -> PathBuf {
        self.root.join("update-times.json")
    }

    pub fn packages_snapshot_path(&self) -> PathBuf {
        self.root.join("packages.toml")
    }

    pub fn ensure_base_dirs(&self) -> Result<(), StoreError> {
        for dir in [self.root.clone(), self.enclosures_dir(), self.journal_dir()] {
            fs::create_dir_all(&dir).map_err(|source| StoreError::Writing {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
