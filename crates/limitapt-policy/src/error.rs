use limitapt_core::CoownershipError;
use thiserror::Error;

use crate::denial::Denial;

/// Failure categories of [`crate::PackageUniverse::commit`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("cannot lock the package database: {0}")]
    LockFailed(String),
    #[error("package download was cancelled")]
    FetchCancelled,
    #[error("package download failed: {0}")]
    FetchFailed(String),
    /// Packages were partly applied; the database needs repair before the next run.
    #[error("package database update failed: {0}")]
    Apply(String),
}

impl CommitError {
    /// Nothing was changed on disk yet.
    pub fn is_before_apply(&self) -> bool {
        !matches!(self, Self::Apply(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("preceding tasks have not been completed; run \"fix-interrupted\" or \"ignore-interrupted\" as root")]
    PrecedingTasksNotCompleted,
    #[error("the package database journal is dirty; run \"dpkg --configure -a\" as root")]
    DpkgJournalDirty,
    #[error("not enough free space on {partition}: {required} bytes must stay free but only {remaining} would remain")]
    NotEnoughSpace {
        partition: String,
        required: u64,
        remaining: u64,
    },
    #[error("package lists are stale; run \"update\" first")]
    DistroStale,
    #[error("only root may force operations")]
    OnlyRootMayForce,
    #[error("only root may purge unused packages")]
    OnlyRootMayPurge,
    #[error("you have not privileges to {action}: you must be root or a member of \"{group}\" group")]
    NoPrivileges { action: String, group: String },
    #[error("attempt to perform system-composing: {denial}")]
    SystemComposing { denial: Denial },
    #[error("attempt to perform system-composing: {} change(s) denied", .denials.len())]
    SystemComposingByResolver { denials: Vec<Denial> },
    #[error(transparent)]
    Ledger(#[from] CoownershipError),
    #[error(transparent)]
    Commit(#[from] CommitError),
}

impl PolicyError {
    pub fn denials(&self) -> &[Denial] {
        match self {
            Self::SystemComposing { denial } => std::slice::from_ref(denial),
            Self::SystemComposingByResolver { denials } => denials,
            _ => &[],
        }
    }
}
