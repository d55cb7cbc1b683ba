use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, StructureKind};
use crate::Priority;

const SETTINGS_FILE_VERSION: u32 = 1;

/// A free-space threshold: a fraction of the partition or a byte count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpaceAmount {
    Relative { percent: f64 },
    Absolute { bytes: u64 },
}

const SPACE_UNITS: &[(&str, u64)] = &[
    ("KiB", 1 << 10),
    ("MiB", 1 << 20),
    ("GiB", 1 << 30),
    ("TiB", 1 << 40),
    ("KB", 1_000),
    ("MB", 1_000_000),
    ("GB", 1_000_000_000),
    ("TB", 1_000_000_000_000),
    ("B", 1),
];

impl SpaceAmount {
    /// Bytes that must stay free on a partition of `total` bytes.
    pub fn required(&self, total: u64) -> u64 {
        match *self {
            Self::Relative { percent } => (percent / 100.0 * total as f64).ceil() as u64,
            Self::Absolute { bytes } => bytes,
        }
    }

    /// Whether leaving `remaining` of `total` bytes free satisfies the threshold.
    pub fn fits(&self, remaining: u64, total: u64) -> bool {
        self.required(total) <= remaining
    }
}

impl FromStr for SpaceAmount {
    type Err = FormatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || {
            FormatError::new(
                StructureKind::Settings,
                format!("invalid space amount '{value}'"),
            )
        };

        if let Some(number) = trimmed.strip_suffix('%') {
            let percent: f64 = number.trim().parse().map_err(|_| invalid())?;
            if !(0.0..=100.0).contains(&percent) {
                return Err(invalid());
            }
            return Ok(Self::Relative { percent });
        }

        for (suffix, multiplier) in SPACE_UNITS {
            if let Some(number) = trimmed.strip_suffix(suffix) {
                let count: u64 = number.trim().parse().map_err(|_| invalid())?;
                let bytes = count.checked_mul(*multiplier).ok_or_else(invalid)?;
                return Ok(Self::Absolute { bytes });
            }
        }
        Err(invalid())
    }
}

impl TryFrom<String> for SpaceAmount {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpaceAmount> for String {
    fn from(value: SpaceAmount) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SpaceAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relative { percent } => write!(f, "{percent}%"),
            Self::Absolute { bytes } => write!(f, "{bytes}B"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    pub users: String,
    pub roots: String,
    pub upgraders: String,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            users: "limited-apt".to_string(),
            roots: "limited-apt-roots".to_string(),
            upgraders: "limited-apt-upgraders".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimalFreeSpace {
    pub target: SpaceAmount,
    pub cache: SpaceAmount,
}

impl Default for MinimalFreeSpace {
    fn default() -> Self {
        Self {
            target: SpaceAmount::Relative { percent: 5.0 },
            cache: SpaceAmount::Absolute { bytes: 500_000_000 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub target: PathBuf,
    pub cache: PathBuf,
    pub group_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            target: PathBuf::from("/usr"),
            cache: PathBuf::from("/var/cache/apt/archives"),
            group_file: PathBuf::from("/etc/group"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebconfSettings {
    pub minimal_priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Default for DebconfSettings {
    fn default() -> Self {
        Self {
            minimal_priority: Priority::High,
            url: None,
            sha256: None,
        }
    }
}

/// Where `update` refreshes the package lists from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageListsSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Whose authority `fix-interrupted` re-examines the pending changes under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeAuthorization {
    /// Re-examine as the original user, reporting denials as warnings.
    #[default]
    Warn,
    /// Re-examine as the original user with denials still blocking.
    OriginalUser,
    /// Treat the resumed operation as root's.
    Root,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeSettings {
    pub authorization: ResumeAuthorization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclosureSource {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distro_age_hours: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginSettings {
    /// Suite simple users may install from; any suite when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_release: Option<String>,
}

/// Program settings, read from `settings.toml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,
    pub groups: GroupSettings,
    pub minimal_free_space: MinimalFreeSpace,
    pub paths: PathSettings,
    pub debconf: DebconfSettings,
    pub package_lists: PackageListsSettings,
    pub resume: ResumeSettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enclosure_sources: Vec<EnclosureSource>,
    pub freshness: FreshnessSettings,
    pub origin: OriginSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FILE_VERSION,
            groups: GroupSettings::default(),
            minimal_free_space: MinimalFreeSpace::default(),
            paths: PathSettings::default(),
            debconf: DebconfSettings::default(),
            package_lists: PackageListsSettings::default(),
            resume: ResumeSettings::default(),
            enclosure_sources: Vec::new(),
            freshness: FreshnessSettings::default(),
            origin: OriginSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, FormatError> {
        let settings: Settings = toml::from_str(input)
            .map_err(|err| FormatError::new(StructureKind::Settings, err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String, FormatError> {
        toml::to_string(self)
            .map_err(|err| FormatError::new(StructureKind::Settings, err.to_string()))
    }

    pub fn enclosure_source(&self, name: &str) -> Option<&EnclosureSource> {
        self.enclosure_sources.iter().find(|source| source.name == name)
    }

    fn validate(&self) -> Result<(), FormatError> {
        if self.version != SETTINGS_FILE_VERSION {
            return Err(FormatError::new(
                StructureKind::Settings,
                format!(
                    "unsupported version {} (expected {})",
                    self.version, SETTINGS_FILE_VERSION
                ),
            ));
        }

        let mut names = BTreeSet::new();
        for source in &self.enclosure_sources {
            validate_source_name(&source.name)?;
            if !names.insert(source.name.as_str()) {
                return Err(FormatError::new(
                    StructureKind::Settings,
                    format!("duplicate enclosure source '{}'", source.name),
                ));
            }
            if let Some(digest) = &source.sha256 {
                validate_sha256(digest)?;
            }
        }
        for digest in [&self.debconf.sha256, &self.package_lists.sha256]
            .into_iter()
            .flatten()
        {
            validate_sha256(digest)?;
        }
        if self.origin.default_release.as_deref() == Some("") {
            return Err(FormatError::new(
                StructureKind::Settings,
                "origin default_release must not be empty",
            ));
        }
        Ok(())
    }
}

fn validate_source_name(name: &str) -> Result<(), FormatError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(FormatError::new(
            StructureKind::Settings,
            format!("enclosure source name '{name}' must use only [A-Za-z0-9_-]"),
        ))
    }
}

fn validate_sha256(digest: &str) -> Result<(), FormatError> {
    if digest.len() == 64 && digest.chars().all(|ch| ch.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(FormatError::new(
            StructureKind::Settings,
            format!("'{digest}' is not a sha256 hex digest"),
        ))
    }
}
