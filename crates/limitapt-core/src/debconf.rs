use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DebconfError, FormatError, StructureKind};
use crate::ConcretePackage;

const DEBCONF_FILE_VERSION: u32 = 1;

/// Priority of a package's interactive configuration questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = FormatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(FormatError::new(
                StructureKind::DebconfPriorities,
                format!("unknown priority '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    HasQuestions,
    HasNotQuestions,
    NoConfigFile,
    ProcessingError,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasQuestions => "has-questions",
            Self::HasNotQuestions => "has-not-questions",
            Self::NoConfigFile => "no-config-file",
            Self::ProcessingError => "processing-error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scanning one package's config script.
///
/// `priority` is set exactly when `status` is [`Status::HasQuestions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageState {
    status: Status,
    priority: Option<Priority>,
}

impl PackageState {
    pub fn with_questions(priority: Priority) -> Self {
        Self {
            status: Status::HasQuestions,
            priority: Some(priority),
        }
    }

    pub fn without_questions() -> Self {
        Self {
            status: Status::HasNotQuestions,
            priority: None,
        }
    }

    pub fn no_config_file() -> Self {
        Self {
            status: Status::NoConfigFile,
            priority: None,
        }
    }

    pub fn processing_error() -> Self {
        Self {
            status: Status::ProcessingError,
            priority: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn is_well_processed(&self) -> bool {
        self.status != Status::ProcessingError
    }

    pub fn requires_attention(&self, threshold: Priority) -> bool {
        self.priority.is_some_and(|priority| priority >= threshold)
    }
}

/// Index of debconf question priorities per package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebconfPriorities {
    states: BTreeMap<ConcretePackage, PackageState>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DebconfFile {
    #[serde(default = "debconf_file_version")]
    version: u32,
    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    packages: Vec<DebconfRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DebconfRecord {
    name: String,
    arch: String,
    status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
}

fn debconf_file_version() -> u32 {
    DEBCONF_FILE_VERSION
}

impl DebconfPriorities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConcretePackage, &PackageState)> {
        self.states.iter()
    }

    pub fn contains(&self, package: &ConcretePackage) -> bool {
        self.states.contains_key(package)
    }

    pub fn get(&self, package: &ConcretePackage) -> Option<&PackageState> {
        self.states.get(package)
    }

    /// Insert or replace the state of `package`.
    pub fn set(&mut self, package: ConcretePackage, state: PackageState) {
        self.states.insert(package, state);
    }

    pub fn add_package(
        &mut self,
        package: ConcretePackage,
        state: PackageState,
    ) -> Result<(), DebconfError> {
        if self.states.contains_key(&package) {
            return Err(DebconfError::PackageAlreadyAdded { package });
        }
        self.states.insert(package, state);
        Ok(())
    }

    pub fn well_processed(&self, package: &ConcretePackage) -> Result<bool, DebconfError> {
        self.states
            .get(package)
            .map(PackageState::is_well_processed)
            .ok_or_else(|| DebconfError::NotTracked {
                package: package.clone(),
            })
    }

    /// Untracked, badly processed, or asking questions at or above `threshold`.
    pub fn blocks_install(&self, package: &ConcretePackage, threshold: Priority) -> bool {
        match self.states.get(package) {
            None => true,
            Some(state) => !state.is_well_processed() || state.requires_attention(threshold),
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, FormatError> {
        let file: DebconfFile = toml::from_str(input)
            .map_err(|err| FormatError::new(StructureKind::DebconfPriorities, err.to_string()))?;
        if file.version != DEBCONF_FILE_VERSION {
            return Err(FormatError::new(
                StructureKind::DebconfPriorities,
                format!(
                    "unsupported version {} (expected {})",
                    file.version, DEBCONF_FILE_VERSION
                ),
            ));
        }

        let mut index = Self::new();
        for record in file.packages {
            let package = ConcretePackage::new(record.name, record.arch);
            let state = match (record.status, record.priority) {
                (Status::HasQuestions, Some(priority)) => PackageState::with_questions(priority),
                (Status::HasQuestions, None) => {
                    return Err(FormatError::new(
                        StructureKind::DebconfPriorities,
                        format!("package '{package}' has questions but no priority"),
                    ));
                }
                (status, Some(_)) => {
                    return Err(FormatError::new(
                        StructureKind::DebconfPriorities,
                        format!("package '{package}' has a priority with status '{status}'"),
                    ));
                }
                (Status::HasNotQuestions, None) => PackageState::without_questions(),
                (Status::NoConfigFile, None) => PackageState::no_config_file(),
                (Status::ProcessingError, None) => PackageState::processing_error(),
            };
            index.add_package(package, state).map_err(|err| {
                FormatError::new(StructureKind::DebconfPriorities, err.to_string())
            })?;
        }
        Ok(index)
    }

    pub fn to_toml_string(&self) -> Result<String, FormatError> {
        let file = DebconfFile {
            version: DEBCONF_FILE_VERSION,
            packages: self
                .states
                .iter()
                .map(|(package, state)| DebconfRecord {
                    name: package.name().to_string(),
                    arch: package.architecture().to_string(),
                    status: state.status,
                    priority: state.priority,
                })
                .collect(),
        };
        toml::to_string(&file)
            .map_err(|err| FormatError::new(StructureKind::DebconfPriorities, err.to_string()))
    }
}
