use std::io;
use std::path::PathBuf;

use limitapt_core::FormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed reading {}", .path.display())]
    Reading {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed writing {}", .path.display())]
    Writing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed parsing {}: {source}", .path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
}

impl StoreError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("an interrupted operation is already recorded in {}", .path.display())]
    AlreadyRecorded { path: PathBuf },
    #[error(transparent)]
    Store(#[from] StoreError),
}
