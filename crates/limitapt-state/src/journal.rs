use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use limitapt_core::{FormatError, RealizedTaskSet, StructureKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{JournalError, StoreError};
use crate::fs_utils::{read_optional, remove_file_if_exists};

const JOURNAL_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JournalOperation {
    /// Explicit install/remove/... tasks.
    Operations,
    SafeUpgrade,
    FullUpgrade,
}

impl JournalOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operations => "operations",
            Self::SafeUpgrade => "safe-upgrade",
            Self::FullUpgrade => "full-upgrade",
        }
    }
}

/// What was being committed when the program stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub version: u32,
    pub operation: JournalOperation,
    pub username: String,
    pub purge_unused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<RealizedTaskSet>,
}

impl JournalEntry {
    pub fn operations(
        username: impl Into<String>,
        purge_unused: bool,
        tasks: RealizedTaskSet,
    ) -> Self {
        Self {
            version: JOURNAL_FILE_VERSION,
            operation: JournalOperation::Operations,
            username: username.into(),
            purge_unused,
            tasks: Some(tasks),
        }
    }

    pub fn upgrade(
        operation: JournalOperation,
        username: impl Into<String>,
        purge_unused: bool,
    ) -> Self {
        Self {
            version: JOURNAL_FILE_VERSION,
            operation,
            username: username.into(),
            purge_unused,
            tasks: None,
        }
    }
}

/// At most one recorded operation, claimed with create-new semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptionJournal {
    path: PathBuf,
}

impl InterruptionJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn write(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let writing = |source: io::Error| StoreError::Writing {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(writing)?;
        }

        let content = serde_json::to_string_pretty(entry).map_err(|err| StoreError::Syntax {
            path: self.path.clone(),
            source: FormatError::new(StructureKind::Journal, err.to_string()),
        })?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(JournalError::AlreadyRecorded {
                    path: self.path.clone(),
                });
            }
            Err(err) => return Err(writing(err).into()),
        };
        file.write_all(content.as_bytes()).map_err(writing)?;
        file.write_all(b"\n").map_err(writing)?;
        file.sync_all().map_err(writing)?;

        info!(
            path = %self.path.display(),
            operation = entry.operation.as_str(),
            user = %entry.username,
            "recorded operation in interruption journal"
        );
        Ok(())
    }

    pub fn read(&self) -> Result<Option<JournalEntry>, JournalError> {
        let Some(raw) = read_optional(&self.path)? else {
            return Ok(None);
        };
        let syntax = |message: String| StoreError::Syntax {
            path: self.path.clone(),
            source: FormatError::new(StructureKind::Journal, message),
        };
        let entry: JournalEntry =
            serde_json::from_str(&raw).map_err(|err| syntax(err.to_string()))?;
        if entry.version != JOURNAL_FILE_VERSION {
            return Err(syntax(format!(
                "unsupported version {} (expected {})",
                entry.version, JOURNAL_FILE_VERSION
            ))
            .into());
        }
        Ok(Some(entry))
    }

    /// Returns whether an entry was removed.
    pub fn clear(&self) -> Result<bool, JournalError> {
        let removed = remove_file_if_exists(&self.path).map_err(|source| StoreError::Writing {
            path: self.path.clone(),
            source,
        })?;
        if removed {
            info!(path = %self.path.display(), "cleared interruption journal");
        } else {
            warn!(path = %self.path.display(), "interruption journal was already empty");
        }
        Ok(removed)
    }
}
