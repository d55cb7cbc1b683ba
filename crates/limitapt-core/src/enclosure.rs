use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EnclosureError, FormatError, StructureKind};
use crate::{VersionedPackage, ALL_ARCHITECTURE};

const ENCLOSURE_FILE_VERSION: u32 = 1;

/// Answers whether an unprivileged user may install a package at a version.
pub trait Enclosing {
    fn encloses(&self, package: &VersionedPackage) -> bool;
}

/// The versions allowed for one architecture (or for every architecture).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Versions {
    Every,
    Distinct(BTreeSet<String>),
}

impl Default for Versions {
    fn default() -> Self {
        Self::Distinct(BTreeSet::new())
    }
}

impl Versions {
    pub fn distinct<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Distinct(versions.into_iter().map(Into::into).collect())
    }

    pub fn is_every(&self) -> bool {
        matches!(self, Self::Every)
    }

    pub fn contains(&self, version: &str) -> bool {
        match self {
            Self::Every => true,
            Self::Distinct(items) => items.contains(version),
        }
    }

    pub fn add(&mut self, version: impl Into<String>) -> Result<(), EnclosureError> {
        match self {
            Self::Every => Err(EnclosureError::VersionsEveryAndDistinct),
            Self::Distinct(items) => {
                items.insert(version.into());
                Ok(())
            }
        }
    }

    pub fn iter(&self) -> Result<impl Iterator<Item = &str>, EnclosureError> {
        match self {
            Self::Every => Err(EnclosureError::CannotEnumerateEvery),
            Self::Distinct(items) => Ok(items.iter().map(String::as_str)),
        }
    }
}

/// Per-package rule: either one version set for every architecture, or a
/// version set per named architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchAndVersions {
    EveryArch(Versions),
    PerArch(BTreeMap<String, Versions>),
}

impl Default for ArchAndVersions {
    fn default() -> Self {
        Self::PerArch(BTreeMap::new())
    }
}

impl ArchAndVersions {
    pub fn every() -> Self {
        Self::EveryArch(Versions::Every)
    }

    pub fn is_every(&self) -> bool {
        matches!(self, Self::EveryArch(_))
    }

    /// An architecture without its own entry falls back to the `all` entry.
    pub fn has_arch_version(&self, architecture: &str, version: &str) -> bool {
        match self {
            Self::EveryArch(versions) => versions.contains(version),
            Self::PerArch(by_arch) => match by_arch.get(architecture) {
                Some(versions) => versions.contains(version),
                None => by_arch
                    .get(ALL_ARCHITECTURE)
                    .is_some_and(|versions| versions.contains(version)),
            },
        }
    }

    pub fn architectures(
        &self,
    ) -> Result<impl Iterator<Item = (&str, &Versions)>, EnclosureError> {
        match self {
            Self::EveryArch(_) => Err(EnclosureError::CannotEnumerateEvery),
            Self::PerArch(by_arch) => Ok(by_arch.iter().map(|(arch, v)| (arch.as_str(), v))),
        }
    }

    fn set_arch(
        &mut self,
        name: &str,
        architecture: &str,
        versions: Versions,
    ) -> Result<(), EnclosureError> {
        match self {
            Self::EveryArch(_) => Err(EnclosureError::ArchAndVersionsEveryAndDistinct {
                name: name.to_string(),
            }),
            Self::PerArch(by_arch) => {
                by_arch.insert(architecture.to_string(), versions);
                Ok(())
            }
        }
    }

    fn add_single(
        &mut self,
        name: &str,
        architecture: &str,
        version: &str,
    ) -> Result<(), EnclosureError> {
        match self {
            Self::EveryArch(_) => Err(EnclosureError::ArchAndVersionsEveryAndDistinct {
                name: name.to_string(),
            }),
            Self::PerArch(by_arch) => by_arch
                .entry(architecture.to_string())
                .or_default()
                .add(version),
        }
    }
}

/// The set of non-system packages an ordinary user may install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    packages: BTreeMap<String, ArchAndVersions>,
}

impl Enclosing for Enclosure {
    fn encloses(&self, package: &VersionedPackage) -> bool {
        self.contains(package)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EnclosureFile {
    #[serde(default = "enclosure_file_version")]
    version: u32,
    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    packages: Vec<EnclosureRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnclosureRecord {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    every_arch: Option<VersionsRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    arch: BTreeMap<String, VersionsRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionsRecord {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    every_version: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    versions: Vec<String>,
}

fn enclosure_file_version() -> u32 {
    ENCLOSURE_FILE_VERSION
}

impl VersionsRecord {
    fn into_versions(self, context: &str) -> Result<Versions, FormatError> {
        if self.every_version {
            if !self.versions.is_empty() {
                return Err(FormatError::new(
                    StructureKind::Enclosure,
                    format!("{context} declares every_version together with explicit versions"),
                ));
            }
            return Ok(Versions::Every);
        }
        Ok(Versions::distinct(self.versions))
    }

    fn from_versions(versions: &Versions) -> Self {
        match versions {
            Versions::Every => Self {
                every_version: true,
                versions: Vec::new(),
            },
            Versions::Distinct(items) => Self {
                every_version: false,
                versions: items.iter().cloned().collect(),
            },
        }
    }
}

impl Enclosure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ArchAndVersions> {
        self.packages.get(name)
    }

    pub fn contains(&self, package: &VersionedPackage) -> bool {
        self.packages
            .get(package.name())
            .is_some_and(|rule| rule.has_arch_version(package.architecture(), package.version()))
    }

    pub fn add_package(
        &mut self,
        name: impl Into<String>,
        arch_and_versions: ArchAndVersions,
    ) -> Result<(), EnclosureError> {
        let name = name.into();
        if self.packages.contains_key(&name) {
            return Err(EnclosureError::PackageAlreadyPresent { name });
        }
        self.packages.insert(name, arch_and_versions);
        Ok(())
    }

    /// Allow one more exact version, creating the package entry if needed.
    pub fn add_versioned_package(
        &mut self,
        package: &VersionedPackage,
    ) -> Result<(), EnclosureError> {
        self.packages
            .entry(package.name().to_string())
            .or_default()
            .add_single(package.name(), package.architecture(), package.version())
    }

    pub fn clear(&mut self) {
        self.packages.clear();
    }

    pub fn from_toml_str(input: &str) -> Result<Self, FormatError> {
        let file: EnclosureFile = toml::from_str(input)
            .map_err(|err| FormatError::new(StructureKind::Enclosure, err.to_string()))?;
        if file.version != ENCLOSURE_FILE_VERSION {
            return Err(FormatError::new(
                StructureKind::Enclosure,
                format!(
                    "unsupported version {} (expected {})",
                    file.version, ENCLOSURE_FILE_VERSION
                ),
            ));
        }

        let mut enclosure = Self::new();
        for record in file.packages {
            let rule = match record.every_arch {
                Some(every) => {
                    if !record.arch.is_empty() {
                        return Err(FormatError::new(
                            StructureKind::Enclosure,
                            format!(
                                "package '{}' declares every_arch together with per-arch rules",
                                record.name
                            ),
                        ));
                    }
                    ArchAndVersions::EveryArch(
                        every.into_versions(&format!("package '{}'", record.name))?,
                    )
                }
                None => {
                    let mut rule = ArchAndVersions::default();
                    for (arch, versions) in record.arch {
                        let versions = versions
                            .into_versions(&format!("package '{}:{}'", record.name, arch))?;
                        rule.set_arch(&record.name, &arch, versions)
                            .map_err(|err| {
                                FormatError::new(StructureKind::Enclosure, err.to_string())
                            })?;
                    }
                    rule
                }
            };
            enclosure
                .add_package(record.name, rule)
                .map_err(|err| FormatError::new(StructureKind::Enclosure, err.to_string()))?;
        }
        Ok(enclosure)
    }

    pub fn to_toml_string(&self) -> Result<String, FormatError> {
        let file = EnclosureFile {
            version: ENCLOSURE_FILE_VERSION,
            packages: self
                .packages
                .iter()
                .map(|(name, rule)| match rule {
                    ArchAndVersions::EveryArch(versions) => EnclosureRecord {
                        name: name.clone(),
                        every_arch: Some(VersionsRecord::from_versions(versions)),
                        arch: BTreeMap::new(),
                    },
                    ArchAndVersions::PerArch(by_arch) => EnclosureRecord {
                        name: name.clone(),
                        every_arch: None,
                        arch: by_arch
                            .iter()
                            .map(|(arch, versions)| {
                                (arch.clone(), VersionsRecord::from_versions(versions))
                            })
                            .collect(),
                    },
                })
                .collect(),
        };
        toml::to_string(&file)
            .map_err(|err| FormatError::new(StructureKind::Enclosure, err.to_string()))
    }
}

/// Several enclosure sources combined by union: a package is allowed when
/// any source allows it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MixedEnclosure {
    sources: Vec<(String, Enclosure)>,
}

impl MixedEnclosure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl Into<String>, enclosure: Enclosure) {
        self.sources.push((source.into(), enclosure));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = (&str, &Enclosure)> {
        self.sources.iter().map(|(name, enclosure)| (name.as_str(), enclosure))
    }

    /// Name of the first source allowing `package`.
    pub fn covering_source(&self, package: &VersionedPackage) -> Option<&str> {
        self.sources
            .iter()
            .find(|(_, enclosure)| enclosure.contains(package))
            .map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, package: &VersionedPackage) -> bool {
        self.covering_source(package).is_some()
    }
}

impl Enclosing for MixedEnclosure {
    fn encloses(&self, package: &VersionedPackage) -> bool {
        self.contains(package)
    }
}
