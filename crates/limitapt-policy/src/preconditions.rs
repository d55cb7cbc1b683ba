use tracing::debug;

use crate::error::PolicyError;
use crate::universe::PackageUniverse;

const SECONDS_PER_HOUR: u64 = 3600;

pub fn ensure_not_dirty(universe: &dyn PackageUniverse) -> Result<(), PolicyError> {
    if universe.is_dirty() {
        return Err(PolicyError::DpkgJournalDirty);
    }
    Ok(())
}

/// Fail when package lists were never refreshed or are older than
/// `max_age_hours`. No limit means lists never go stale.
pub fn ensure_fresh(
    last_update: Option<u64>,
    now: u64,
    max_age_hours: Option<u64>,
) -> Result<(), PolicyError> {
    let Some(max_age_hours) = max_age_hours else {
        return Ok(());
    };
    let Some(last_update) = last_update else {
        return Err(PolicyError::DistroStale);
    };
    let age = now.saturating_sub(last_update);
    debug!(age_seconds = age, max_age_hours, "checking package list age");
    if age > max_age_hours.saturating_mul(SECONDS_PER_HOUR) {
        return Err(PolicyError::DistroStale);
    }
    Ok(())
}
