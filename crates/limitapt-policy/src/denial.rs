use std::fmt;

use limitapt_core::{ConcretePackage, Priority, TaskKind};
use thiserror::Error;

/// A single refused change, with the reason shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("package \"{package}\" which you want to install is system-constitutive and nobody but root may install it")]
    MayNotInstall { package: ConcretePackage },
    #[error("package \"{package}\" which you want to install is system-constitutive and nobody but root may install it or throw down \"auto-installed\" mark from it")]
    MayNotInstallAutoInstalled { package: ConcretePackage },
    #[error("you have not permissions to upgrade package \"{package}\" to version \"{version}\" because this new version is system-constitutive")]
    MayNotUpgradeToNew {
        package: ConcretePackage,
        version: String,
    },
    #[error("you have not permissions to downgrade package \"{package}\"")]
    MayNotDowngrade { package: ConcretePackage },
    #[error("you have not permissions to keep package \"{package}\" at its current version")]
    MayNotKeep { package: ConcretePackage },
    #[error("you may not remove package \"{package}\" because you have not permissions to remove packages other than packages you have installed later and want to explicitly remove{}", remove_dependencies_hint(.hint_remove_dependencies))]
    MayNotRemove {
        package: ConcretePackage,
        hint_remove_dependencies: bool,
    },
    #[error("you may not physically remove package \"{package}\" because only root may do that")]
    MayNotPhysicallyRemove { package: ConcretePackage },
    #[error("you may not purge package \"{package}\" because only root may do that")]
    MayNotPurge { package: ConcretePackage },
    #[error("you may not mark package \"{package}\" as automatically installed because you have not permissions to \"markauto\" packages other than packages you have marked manually installed later")]
    MayNotMarkauto { package: ConcretePackage },
    #[error("you may not mark package \"{package}\" as manually installed because it is system-constitutive")]
    MayNotUnmarkauto { package: ConcretePackage },
    #[error("package \"{package}\" would be left with broken dependencies")]
    BrokenAfterAction { package: ConcretePackage },
    #[error("package \"{package}\" is not trusted")]
    Untrusted { package: ConcretePackage },
    #[error("you have not permissions to install package \"{package}\" from \"{archive}\" archive (suite)")]
    ForeignArchive {
        package: ConcretePackage,
        archive: String,
    },
    #[error("package \"{package}\" has not been reviewed for debconf questions")]
    DebconfUnreviewed { package: ConcretePackage },
    #[error("package \"{package}\" asks debconf questions of {priority} priority")]
    DebconfQuestions {
        package: ConcretePackage,
        priority: Priority,
    },
}

fn remove_dependencies_hint(hint: &bool) -> &'static str {
    if *hint {
        " (it is an unused dependency: --remove-dependencies may remove it)"
    } else {
        ""
    }
}

fn task_action(task: &TaskKind) -> &'static str {
    task.action()
}

impl Denial {
    pub fn package(&self) -> &ConcretePackage {
        match self {
            Self::MayNotInstall { package }
            | Self::MayNotInstallAutoInstalled { package }
            | Self::MayNotUpgradeToNew { package, .. }
            | Self::MayNotDowngrade { package }
            | Self::MayNotKeep { package }
            | Self::MayNotRemove { package, .. }
            | Self::MayNotPhysicallyRemove { package }
            | Self::MayNotPurge { package }
            | Self::MayNotMarkauto { package }
            | Self::MayNotUnmarkauto { package }
            | Self::BrokenAfterAction { package }
            | Self::Untrusted { package }
            | Self::ForeignArchive { package, .. }
            | Self::DebconfUnreviewed { package }
            | Self::DebconfQuestions { package, .. } => package,
        }
    }

    /// The user is refused because somebody else owns the package.
    pub fn is_ownership(&self) -> bool {
        matches!(self, Self::MayNotRemove { .. } | Self::MayNotMarkauto { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCause {
    /// Root passed `--force`.
    Forced,
    /// Resuming an interrupted operation the original user already agreed to.
    Resumed,
}

/// A denial that was let through, kept visible for auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub cause: WarningCause,
    pub denial: Denial,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause {
            WarningCause::Forced => write!(f, "forced: {}", self.denial),
            WarningCause::Resumed => write!(f, "resuming anyway: {}", self.denial),
        }
    }
}

/// Benign per-task information that never fails a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Notice {
    #[error("cannot find package \"{name}\"")]
    CannotFindPackage { task: TaskKind, name: String },
    #[error("you already own package \"{package}\"")]
    AlreadyOwns { package: ConcretePackage },
    #[error("package \"{package}\" which you want to {} is not installed", task_action(.task))]
    NotInstalled {
        package: ConcretePackage,
        task: TaskKind,
    },
    #[error("package \"{package}\" is already marked as manually installed")]
    NotAutoInstalled { package: ConcretePackage },
    #[error("no simple user has installed package \"{package}\" therefore physical removal is equivalent to simple removal")]
    SimpleRemoval { package: ConcretePackage },
    #[error("no simple user has marked package \"{package}\" automatically installed therefore physical \"markauto\" is equivalent to simple \"markauto\"")]
    PhysicalMarkauto { package: ConcretePackage },
    #[error("package \"{package}\" stays installed because other users still own it")]
    StillOwnedByOthers { package: ConcretePackage },
}
