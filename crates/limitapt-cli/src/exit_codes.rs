use limitapt_core::FormatError;
use limitapt_policy::{CommitError, PolicyError};
use limitapt_state::{JournalError, StoreError};

use crate::identity::IdentityError;

pub const GOOD: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
pub const YOU_HAVE_NOT_PRIVILEGES: u8 = 10;
pub const ATTEMPT_TO_PERFORM_SYSTEM_COMPOSING: u8 = 11;
pub const YOU_ARE_NOT_COOWNER_OF_PACKAGE: u8 = 12;
pub const GROUP_NOT_EXIST: u8 = 20;
pub const ERROR_WHILE_PARSING_CONFIG_FILES: u8 = 30;
pub const ERROR_WHILE_READING_OR_WRITING_CONFIG_FILES: u8 = 31;
pub const PRECEDING_TASKS_NOT_COMPLETED: u8 = 40;
pub const DPKG_JOURNAL_DIRTY: u8 = 41;
pub const NOT_ENOUGH_SPACE: u8 = 42;
pub const DISTRO_STALE: u8 = 43;
pub const APT_PROCESSING_ERROR: u8 = 50;

/// Exit code for the first recognized error in the chain.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| {
            if let Some(policy) = cause.downcast_ref::<PolicyError>() {
                return Some(policy_code(policy));
            }
            if let Some(identity) = cause.downcast_ref::<IdentityError>() {
                return Some(identity_code(identity));
            }
            if let Some(journal) = cause.downcast_ref::<JournalError>() {
                return Some(journal_code(journal));
            }
            if let Some(store) = cause.downcast_ref::<StoreError>() {
                return Some(store_code(store));
            }
            if cause.downcast_ref::<CommitError>().is_some() {
                return Some(APT_PROCESSING_ERROR);
            }
            cause
                .downcast_ref::<FormatError>()
                .map(|_| ERROR_WHILE_PARSING_CONFIG_FILES)
        })
        .unwrap_or(GENERAL_ERROR)
}

fn policy_code(err: &PolicyError) -> u8 {
    match err {
        PolicyError::PrecedingTasksNotCompleted => PRECEDING_TASKS_NOT_COMPLETED,
        PolicyError::DpkgJournalDirty => DPKG_JOURNAL_DIRTY,
        PolicyError::NotEnoughSpace { .. } => NOT_ENOUGH_SPACE,
        PolicyError::DistroStale => DISTRO_STALE,
        PolicyError::OnlyRootMayForce
        | PolicyError::OnlyRootMayPurge
        | PolicyError::NoPrivileges { .. } => YOU_HAVE_NOT_PRIVILEGES,
        PolicyError::SystemComposing { .. } | PolicyError::SystemComposingByResolver { .. } => {
            let denials = err.denials();
            if !denials.is_empty() && denials.iter().all(|denial| denial.is_ownership()) {
                YOU_ARE_NOT_COOWNER_OF_PACKAGE
            } else {
                ATTEMPT_TO_PERFORM_SYSTEM_COMPOSING
            }
        }
        PolicyError::Commit(_) => APT_PROCESSING_ERROR,
        PolicyError::Ledger(_) => GENERAL_ERROR,
    }
}

fn identity_code(err: &IdentityError) -> u8 {
    match err {
        IdentityError::GroupNotExist { .. } => GROUP_NOT_EXIST,
        IdentityError::ForeignUser => YOU_HAVE_NOT_PRIVILEGES,
        IdentityError::Reading { .. } => ERROR_WHILE_READING_OR_WRITING_CONFIG_FILES,
        IdentityError::UnknownUid { .. } => GENERAL_ERROR,
    }
}

fn journal_code(err: &JournalError) -> u8 {
    match err {
        JournalError::AlreadyRecorded { .. } => PRECEDING_TASKS_NOT_COMPLETED,
        JournalError::Store(store) => store_code(store),
    }
}

fn store_code(err: &StoreError) -> u8 {
    if err.is_syntax() {
        ERROR_WHILE_PARSING_CONFIG_FILES
    } else {
        ERROR_WHILE_READING_OR_WRITING_CONFIG_FILES
    }
}
