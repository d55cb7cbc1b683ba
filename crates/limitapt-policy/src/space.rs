use limitapt_core::SpaceAmount;
use tracing::{debug, info};

use crate::error::PolicyError;

/// Free-space figures of one partition, as measured by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub label: String,
    /// Device id; equal ids mean the same physical partition.
    pub device: u64,
    pub available: u64,
    pub total: u64,
    pub minimal_free: SpaceAmount,
}

impl Partition {
    fn check(&self, needed: u64, must_stay_free: u64) -> Result<(), PolicyError> {
        let remaining = self.available.saturating_sub(needed);
        debug!(
            partition = %self.label,
            available = self.available,
            total = self.total,
            needed,
            must_stay_free,
            "checking free space"
        );
        if remaining < must_stay_free || needed > self.available {
            return Err(PolicyError::NotEnoughSpace {
                partition: self.label.clone(),
                required: must_stay_free,
                remaining,
            });
        }
        Ok(())
    }
}

/// Check that downloading into `cache` and unpacking into `target` leaves
/// each partition above its threshold. On a shared partition the needs are
/// summed and the stricter threshold applies.
pub fn ensure_free_space(
    target: &Partition,
    cache: &Partition,
    required_download: u64,
    required_space: i64,
) -> Result<(), PolicyError> {
    let unpack = u64::try_from(required_space).unwrap_or(0);

    if target.device == cache.device {
        let needed = unpack.saturating_add(required_download);
        let must_stay_free = target
            .minimal_free
            .required(target.total)
            .max(cache.minimal_free.required(cache.total));
        info!(partition = %target.label, needed, "target and cache share a partition");
        return target.check(needed, must_stay_free);
    }

    target.check(unpack, target.minimal_free.required(target.total))?;
    cache.check(required_download, cache.minimal_free.required(cache.total))
}
