use limitapt_core::{ConcretePackage, VersionedPackage};

use crate::changes::PackageChange;
use crate::error::CommitError;

/// What the package database knows about one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFacts {
    pub package: ConcretePackage,
    pub installed_version: Option<String>,
    pub candidate_version: Option<String>,
    pub auto_installed: bool,
    /// The candidate is newer than the installed version.
    pub upgradable: bool,
    pub trusted: bool,
}

impl PackageFacts {
    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some()
    }

    pub fn installed(&self) -> Option<VersionedPackage> {
        self.installed_version
            .as_ref()
            .map(|version| self.package.with_version(version.clone()))
    }

    pub fn candidate(&self) -> Option<VersionedPackage> {
        self.candidate_version
            .as_ref()
            .map(|version| self.package.with_version(version.clone()))
    }

    /// Installed version if any, otherwise the candidate.
    pub fn current(&self) -> Option<VersionedPackage> {
        self.installed().or_else(|| self.candidate())
    }
}

/// Progress callbacks handed to [`PackageUniverse::commit`].
pub trait CommitProgress {
    fn fetch_started(&mut self, _total_bytes: u64) {}
    fn fetched(&mut self, _package: &ConcretePackage, _bytes: u64) {}
    fn unpacking(&mut self, _package: &ConcretePackage) {}
    fn finished(&mut self) {}
}

/// Progress sink that ignores every event.
pub struct SilentProgress;

impl CommitProgress for SilentProgress {}

/// The external package database: queried, marked, then committed.
///
/// Marks accumulate until [`PackageUniverse::commit`]; the dependency
/// resolution they trigger is the implementation's business.
pub trait PackageUniverse {
    /// Resolve a user-supplied name (`name` or `name:arch`).
    fn lookup(&self, name: &str) -> Option<PackageFacts>;
    fn facts(&self, package: &ConcretePackage) -> Option<PackageFacts>;
    /// Every known package, ordered by identity.
    fn packages(&self) -> Vec<PackageFacts>;
    /// The underlying package tool was interrupted and needs manual repair.
    fn is_dirty(&self) -> bool;
    /// Refresh the package lists. Pending marks are not affected.
    fn update(&mut self) -> Result<(), CommitError>;

    fn mark_install(&mut self, package: &ConcretePackage);
    fn mark_delete(&mut self, package: &ConcretePackage, purge: bool);
    fn mark_auto(&mut self, package: &ConcretePackage, auto: bool);
    fn upgrade(&mut self, full: bool);
    /// Installed automatic packages nothing depends on any more, given current marks.
    fn auto_removable(&self) -> Vec<ConcretePackage>;

    fn changes(&self) -> Vec<PackageChange>;
    fn required_download(&self) -> u64;
    /// Bytes occupied after unpacking; negative when space is freed.
    fn required_space(&self) -> i64;
    fn commit(&mut self, progress: &mut dyn CommitProgress) -> Result<(), CommitError>;
}
