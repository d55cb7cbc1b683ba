use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use limitapt_core::SpaceAmount;
use limitapt_policy::Partition;
use tracing::debug;

/// Source of free-space figures for the partitions a commit writes to.
pub trait SpaceGauge {
    fn measure(&self, path: &Path, minimal_free: SpaceAmount) -> Result<Partition>;
}

/// Reads figures from the mounted filesystems.
pub struct FsSpaceGauge;

impl SpaceGauge for FsSpaceGauge {
    fn measure(&self, path: &Path, minimal_free: SpaceAmount) -> Result<Partition> {
        let existing = nearest_existing(path);
        let available = fs2::available_space(&existing)
            .with_context(|| format!("failed querying free space: {}", existing.display()))?;
        let total = fs2::total_space(&existing)
            .with_context(|| format!("failed querying partition size: {}", existing.display()))?;
        let device = fs::metadata(&existing)
            .with_context(|| format!("failed reading metadata: {}", existing.display()))?
            .dev();
        debug!(
            path = %path.display(),
            measured = %existing.display(),
            available,
            total,
            "measured partition"
        );
        Ok(Partition {
            label: path.display().to_string(),
            device,
            available,
            total,
            minimal_free,
        })
    }
}

/// The directory may not exist yet; its closest existing ancestor lives on
/// the same partition.
fn nearest_existing(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|ancestor| ancestor.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}
