use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::StructureKind;

pub const ROOT_USERNAME: &str = "root";

/// Architecture token used by architecture-independent packages.
pub const ALL_ARCHITECTURE: &str = "all";

/// A package name bound to one architecture. Ordered by name, then architecture.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConcretePackage {
    name: String,
    #[serde(rename = "arch")]
    architecture: String,
}

impl ConcretePackage {
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn with_version(&self, version: impl Into<String>) -> VersionedPackage {
        VersionedPackage {
            package: self.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ConcretePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.architecture)
    }
}

impl FromStr for ConcretePackage {
    type Err = FormatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((name, architecture)) = value.split_once(':') else {
            return Err(FormatError::new(
                StructureKind::PackageIdentity,
                format!("expected '<name>:<arch>', got '{value}'"),
            ));
        };
        if name.is_empty() || architecture.is_empty() || architecture.contains(':') {
            return Err(FormatError::new(
                StructureKind::PackageIdentity,
                format!("invalid package identity '{value}'"),
            ));
        }
        Ok(Self::new(name, architecture))
    }
}

/// A concrete package at one specific version: an installable artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionedPackage {
    package: ConcretePackage,
    version: String,
}

impl VersionedPackage {
    pub fn new(
        name: impl Into<String>,
        architecture: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            package: ConcretePackage::new(name, architecture),
            version: version.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }

    pub fn architecture(&self) -> &str {
        self.package.architecture()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn concrete(&self) -> &ConcretePackage {
        &self.package
    }
}

impl fmt::Display for VersionedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.package, self.version)
    }
}
