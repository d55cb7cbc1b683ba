use std::fmt;

use thiserror::Error;

use crate::ConcretePackage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoownershipError {
    #[error("user '{user}' already owns package '{package}'")]
    AlreadyOwns {
        package: ConcretePackage,
        user: String,
    },
    #[error("user '{user}' doesn't own package '{package}'")]
    UserDoesNotOwn {
        package: ConcretePackage,
        user: String,
    },
    #[error("package '{package}' is not tracked in the coownership list")]
    PackageNotTracked { package: ConcretePackage },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnclosureError {
    #[error("package '{name}' is already in the enclosure")]
    PackageAlreadyPresent { name: String },
    #[error("distinct versions must not be added where every version is allowed")]
    VersionsEveryAndDistinct,
    #[error("package '{name}' mixes every-architecture and per-architecture rules")]
    ArchAndVersionsEveryAndDistinct { name: String },
    #[error("cannot enumerate every possible value")]
    CannotEnumerateEvery,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebconfError {
    #[error("package '{package}' is not tracked in the debconf priority index")]
    NotTracked { package: ConcretePackage },
    #[error("package '{package}' is already in the debconf priority index")]
    PackageAlreadyAdded { package: ConcretePackage },
}

/// Which persisted structure a [`FormatError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    PackageIdentity,
    Coownership,
    Enclosure,
    DebconfPriorities,
    Settings,
    Journal,
    UpdateTimes,
}

impl StructureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PackageIdentity => "package identity",
            Self::Coownership => "coownership list",
            Self::Enclosure => "enclosure",
            Self::DebconfPriorities => "debconf priorities",
            Self::Settings => "program settings",
            Self::Journal => "interruption journal",
            Self::UpdateTimes => "update times",
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Syntax or semantic error in a persisted structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error while importing {kind}: {message}")]
pub struct FormatError {
    pub kind: StructureKind,
    pub message: String,
}

impl FormatError {
    pub fn new(kind: StructureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
