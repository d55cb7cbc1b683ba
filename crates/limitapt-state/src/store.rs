use std::fs;
use std::path::Path;

use limitapt_core::{
    CoownershipLedger, DebconfPriorities, Enclosure, FormatError, MixedEnclosure, Settings,
};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::fs_utils::{read_optional, remove_file_if_exists, write_atomic};
use crate::journal::InterruptionJournal;
use crate::layout::StateLayout;
use crate::update_times::UpdateTimes;

/// Loads and saves every persisted structure under one [`StateLayout`].
/// A missing file reads as the empty (or default) structure.
#[derive(Debug, Clone)]
pub struct StateStore {
    layout: StateLayout,
}

impl StateStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn journal(&self) -> InterruptionJournal {
        InterruptionJournal::new(self.layout.journal_path())
    }

    pub fn load_settings(&self) -> Result<Settings, StoreError> {
        load_toml(&self.layout.settings_path(), Settings::from_toml_str)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        save_toml(&self.layout.settings_path(), settings.to_toml_string())
    }

    pub fn load_ledger(&self) -> Result<CoownershipLedger, StoreError> {
        load_toml(&self.layout.coownership_path(), CoownershipLedger::from_toml_str)
    }

    pub fn save_ledger(&self, ledger: &CoownershipLedger) -> Result<(), StoreError> {
        save_toml(&self.layout.coownership_path(), ledger.to_toml_string())
    }

    pub fn load_priorities(&self) -> Result<DebconfPriorities, StoreError> {
        load_toml(
            &self.layout.debconf_priorities_path(),
            DebconfPriorities::from_toml_str,
        )
    }

    pub fn save_priorities(&self, priorities: &DebconfPriorities) -> Result<(), StoreError> {
        save_toml(
            &self.layout.debconf_priorities_path(),
            priorities.to_toml_string(),
        )
    }

    /// Every `enclosures/*.toml` file, in file name order, as one union.
    pub fn load_enclosures(&self) -> Result<MixedEnclosure, StoreError> {
        let dir = self.layout.enclosures_dir();
        let mut mixed = MixedEnclosure::new();
        for source in self.enclosure_sources()? {
            let path = self.layout.enclosure_path(&source);
            let enclosure = load_toml(&path, Enclosure::from_toml_str)?;
            mixed.push(source, enclosure);
        }
        debug!(dir = %dir.display(), sources = mixed.len(), "loaded enclosures");
        Ok(mixed)
    }

    pub fn save_enclosure(&self, source: &str, enclosure: &Enclosure) -> Result<(), StoreError> {
        save_toml(&self.layout.enclosure_path(source), enclosure.to_toml_string())
    }

    /// Delete stored enclosures whose source is not in `keep`. Returns the removed names.
    pub fn prune_enclosures(&self, keep: &[&str]) -> Result<Vec<String>, StoreError> {
        let mut removed = Vec::new();
        for source in self.enclosure_sources()? {
            if keep.contains(&source.as_str()) {
                continue;
            }
            let path = self.layout.enclosure_path(&source);
            remove_file_if_exists(&path).map_err(|err| StoreError::Writing {
                path: path.clone(),
                source: err,
            })?;
            info!(source = %source, "removed enclosure of unconfigured source");
            removed.push(source);
        }
        Ok(removed)
    }

    pub fn load_update_times(&self) -> Result<UpdateTimes, StoreError> {
        UpdateTimes::load(&self.layout.update_times_path())
    }

    pub fn save_update_times(&self, times: &UpdateTimes) -> Result<(), StoreError> {
        times.save(&self.layout.update_times_path())
    }

    fn enclosure_sources(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.enclosures_dir();
        let reading = |source: std::io::Error| StoreError::Reading {
            path: dir.clone(),
            source,
        };
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(reading(err)),
        };

        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(reading)?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            sources.push(stem.to_string());
        }
        sources.sort();
        Ok(sources)
    }
}

fn load_toml<T, F>(path: &Path, parse: F) -> Result<T, StoreError>
where
    T: Default,
    F: FnOnce(&str) -> Result<T, FormatError>,
{
    let Some(raw) = read_optional(path)? else {
        debug!(path = %path.display(), "state file absent, using defaults");
        return Ok(T::default());
    };
    parse(&raw).map_err(|source| StoreError::Syntax {
        path: path.to_path_buf(),
        source,
    })
}

fn save_toml(path: &Path, rendered: Result<String, FormatError>) -> Result<(), StoreError> {
    let content = rendered.map_err(|source| StoreError::Syntax {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, content.as_bytes())?;
    debug!(path = %path.display(), "saved state file");
    Ok(())
}
