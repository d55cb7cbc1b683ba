use limitapt_core::{ConcretePackage, RealizedTaskSet, TaskKind, VersionedPackage};

use crate::universe::PackageUniverse;

/// How a package's installed version moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Install,
    Upgrade,
    Downgrade,
    Reinstall,
    /// The resolver holds the package back at its current version.
    Keep,
    Delete { purge: bool },
    /// Only the auto-installed flag changes.
    Unchanged,
}

impl Transition {
    /// Transitions that unpack a package and run its config scripts.
    pub fn is_setup(self) -> bool {
        matches!(
            self,
            Self::Install | Self::Upgrade | Self::Downgrade | Self::Reinstall
        )
    }

    pub fn is_delete(self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// One entry of the diff produced by the package database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    pub package: ConcretePackage,
    pub installed_version: Option<String>,
    /// Version after the change; `None` for deletions.
    pub target_version: Option<String>,
    pub transition: Transition,
    /// New value of the auto-installed flag when it changes.
    pub auto_flag: Option<bool>,
    pub auto_removable: bool,
    pub now_broken: bool,
    pub inst_broken: bool,
    pub trusted: bool,
    /// Archive (suite) the target version comes from.
    pub archive: Option<String>,
}

impl PackageChange {
    pub fn new(package: ConcretePackage, transition: Transition) -> Self {
        Self {
            package,
            installed_version: None,
            target_version: None,
            transition,
            auto_flag: None,
            auto_removable: false,
            now_broken: false,
            inst_broken: false,
            trusted: true,
            archive: None,
        }
    }

    pub fn target(&self) -> Option<VersionedPackage> {
        self.target_version
            .as_ref()
            .map(|version| self.package.with_version(version.clone()))
    }

    pub fn installed(&self) -> Option<VersionedPackage> {
        self.installed_version
            .as_ref()
            .map(|version| self.package.with_version(version.clone()))
    }

    /// The change leaves dependencies broken that were intact before.
    pub fn breaks(&self) -> bool {
        self.inst_broken && !self.now_broken
    }
}

/// Changes grouped the way they are presented to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllChanges {
    pub logically_installed: Vec<ConcretePackage>,
    pub physically_installed: Vec<ConcretePackage>,
    pub logically_installed_but_physically_upgraded: Vec<ConcretePackage>,
    pub upgraded: Vec<ConcretePackage>,
    pub reinstalled: Vec<ConcretePackage>,
    pub downgraded: Vec<ConcretePackage>,
    pub logically_removed: Vec<ConcretePackage>,
    pub physically_removed: Vec<ConcretePackage>,
    pub purged: Vec<ConcretePackage>,
    pub kept: Vec<ConcretePackage>,
}

impl AllChanges {
    pub fn classify(
        changes: &[PackageChange],
        tasks: &RealizedTaskSet,
        universe: &dyn PackageUniverse,
    ) -> Self {
        let mut result = Self::default();
        let change_of = |package: &ConcretePackage| {
            changes
                .iter()
                .find(|change| &change.package == package)
                .map(|change| change.transition)
        };

        for change in changes {
            let package = change.package.clone();
            match change.transition {
                Transition::Install => result.physically_installed.push(package),
                Transition::Upgrade if tasks.contains(TaskKind::Install, &package) => result
                    .logically_installed_but_physically_upgraded
                    .push(package),
                Transition::Upgrade => result.upgraded.push(package),
                Transition::Reinstall => result.reinstalled.push(package),
                Transition::Downgrade => result.downgraded.push(package),
                Transition::Delete { purge: false } => result.physically_removed.push(package),
                Transition::Delete { purge: true } => result.purged.push(package),
                Transition::Keep => result.kept.push(package),
                Transition::Unchanged => {}
            }
        }

        for package in tasks.get(TaskKind::Install).iter().chain(tasks.get(TaskKind::Unmarkauto)) {
            let installed = universe
                .facts(package)
                .is_some_and(|facts| facts.is_installed());
            let physically = matches!(
                change_of(package),
                Some(Transition::Install | Transition::Upgrade)
            );
            if installed && !physically && !result.logically_installed.contains(package) {
                result.logically_installed.push(package.clone());
            }
        }
        for package in tasks.get(TaskKind::Remove).iter().chain(tasks.get(TaskKind::Markauto)) {
            let deleted = change_of(package).is_some_and(Transition::is_delete);
            if !deleted && !result.logically_removed.contains(package) {
                result.logically_removed.push(package.clone());
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn count(&self) -> usize {
        self.logically_installed.len()
            + self.physically_installed.len()
            + self.logically_installed_but_physically_upgraded.len()
            + self.upgraded.len()
            + self.reinstalled.len()
            + self.downgraded.len()
            + self.logically_removed.len()
            + self.physically_removed.len()
            + self.purged.len()
            + self.kept.len()
    }
}

/// Everything shown before asking for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSummary {
    pub changes: AllChanges,
    pub required_download: u64,
    pub required_space: i64,
}
