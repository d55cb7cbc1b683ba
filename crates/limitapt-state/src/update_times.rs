use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use limitapt_core::{FormatError, StructureKind};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::fs_utils::{read_optional, write_atomic};

/// When package lists and enclosures were last refreshed, in unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTimes {
    pub distro: Option<u64>,
    pub enclosure: Option<u64>,
}

impl UpdateTimes {
    pub(crate) fn load(path: &Path) -> Result<Self, StoreError> {
        let Some(raw) = read_optional(path)? else {
            return Ok(Self::default());
        };
        serde_json::from_str(&raw).map_err(|err| StoreError::Syntax {
            path: path.to_path_buf(),
            source: FormatError::new(StructureKind::UpdateTimes, err.to_string()),
        })
    }

    pub(crate) fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self).map_err(|err| StoreError::Syntax {
            path: path.to_path_buf(),
            source: FormatError::new(StructureKind::UpdateTimes, err.to_string()),
        })?;
        write_atomic(path, content.as_bytes())
    }
}

pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
