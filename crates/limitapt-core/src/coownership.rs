use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoownershipError, FormatError, StructureKind};
use crate::{ConcretePackage, ROOT_USERNAME};

const COOWNERSHIP_FILE_VERSION: u32 = 1;

/// Which users are responsible for which installed packages.
///
/// A package absent from the ledger has no owners. The ledger never stores an
/// empty owner set: removing the last owner removes the package entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoownershipLedger {
    owners: BTreeMap<ConcretePackage, BTreeSet<String>>,
}

/// What is left after [`CoownershipLedger::remove_ownership`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    StillOwned,
    NoOwnersLeft,
}

/// A deferred ledger mutation, applied only after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LedgerUpdate {
    Grant {
        package: ConcretePackage,
        user: String,
        also_root: bool,
    },
    Release {
        package: ConcretePackage,
        user: String,
    },
    Drop {
        package: ConcretePackage,
    },
}

impl LedgerUpdate {
    pub fn package(&self) -> &ConcretePackage {
        match self {
            Self::Grant { package, .. }
            | Self::Release { package, .. }
            | Self::Drop { package } => package,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CoownershipFile {
    #[serde(default = "coownership_file_version")]
    version: u32,
    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    packages: Vec<CoownershipRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CoownershipRecord {
    name: String,
    arch: String,
    owners: Vec<String>,
}

fn coownership_file_version() -> u32 {
    COOWNERSHIP_FILE_VERSION
}

impl CoownershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConcretePackage, &BTreeSet<String>)> {
        self.owners.iter()
    }

    /// Owners of `package`; empty when the package is not tracked.
    pub fn owners_of(&self, package: &ConcretePackage) -> BTreeSet<String> {
        self.owners.get(package).cloned().unwrap_or_default()
    }

    pub fn is_any_user_own(&self, package: &ConcretePackage) -> bool {
        self.owners.contains_key(package)
    }

    pub fn is_own(&self, package: &ConcretePackage, user: &str) -> bool {
        self.owners
            .get(package)
            .is_some_and(|owners| owners.contains(user))
    }

    pub fn is_sole_own(&self, package: &ConcretePackage, user: &str) -> bool {
        self.owners
            .get(package)
            .is_some_and(|owners| owners.len() == 1 && owners.contains(user))
    }

    /// Packages owned by `user`, in package order.
    pub fn his_packages(&self, user: &str) -> Vec<ConcretePackage> {
        self.owners
            .iter()
            .filter(|(_, owners)| owners.contains(user))
            .map(|(package, _)| package.clone())
            .collect()
    }

    pub fn add_ownership(
        &mut self,
        package: &ConcretePackage,
        user: &str,
        also_root: bool,
    ) -> Result<(), CoownershipError> {
        if self.is_own(package, user) {
            return Err(CoownershipError::AlreadyOwns {
                package: package.clone(),
                user: user.to_string(),
            });
        }

        let owners = self.owners.entry(package.clone()).or_default();
        owners.insert(user.to_string());
        if also_root && user != ROOT_USERNAME {
            owners.insert(ROOT_USERNAME.to_string());
        }
        Ok(())
    }

    pub fn remove_ownership(
        &mut self,
        package: &ConcretePackage,
        user: &str,
    ) -> Result<ReleaseOutcome, CoownershipError> {
        let Some(owners) = self.owners.get_mut(package) else {
            return Err(CoownershipError::PackageNotTracked {
                package: package.clone(),
            });
        };
        if !owners.remove(user) {
            return Err(CoownershipError::UserDoesNotOwn {
                package: package.clone(),
                user: user.to_string(),
            });
        }
        if owners.is_empty() {
            self.owners.remove(package);
            return Ok(ReleaseOutcome::NoOwnersLeft);
        }
        Ok(ReleaseOutcome::StillOwned)
    }

    /// Forget `package` regardless of who owns it, returning its former owners.
    pub fn remove_package(
        &mut self,
        package: &ConcretePackage,
    ) -> Result<BTreeSet<String>, CoownershipError> {
        self.owners
            .remove(package)
            .ok_or_else(|| CoownershipError::PackageNotTracked {
                package: package.clone(),
            })
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }

    pub fn apply(&mut self, update: &LedgerUpdate) -> Result<(), CoownershipError> {
        match update {
            LedgerUpdate::Grant {
                package,
                user,
                also_root,
            } => self.add_ownership(package, user, *also_root),
            LedgerUpdate::Release { package, user } => {
                self.remove_ownership(package, user).map(|_| ())
            }
            LedgerUpdate::Drop { package } => self.remove_package(package).map(|_| ()),
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, FormatError> {
        let file: CoownershipFile = toml::from_str(input)
            .map_err(|err| FormatError::new(StructureKind::Coownership, err.to_string()))?;
        if file.version != COOWNERSHIP_FILE_VERSION {
            return Err(FormatError::new(
                StructureKind::Coownership,
                format!(
                    "unsupported version {} (expected {})",
                    file.version, COOWNERSHIP_FILE_VERSION
                ),
            ));
        }

        let mut ledger = Self::new();
        for record in file.packages {
            let package = ConcretePackage::new(record.name, record.arch);
            if record.owners.is_empty() {
                return Err(FormatError::new(
                    StructureKind::Coownership,
                    format!("package '{package}' has an empty owner list"),
                ));
            }
            if ledger.owners.contains_key(&package) {
                return Err(FormatError::new(
                    StructureKind::Coownership,
                    format!("package '{package}' is listed more than once"),
                ));
            }
            let mut owners = BTreeSet::new();
            for user in record.owners {
                if user.trim().is_empty() {
                    return Err(FormatError::new(
                        StructureKind::Coownership,
                        format!("package '{package}' has an empty owner name"),
                    ));
                }
                if !owners.insert(user.clone()) {
                    return Err(FormatError::new(
                        StructureKind::Coownership,
                        format!("user '{user}' is listed twice for package '{package}'"),
                    ));
                }
            }
            ledger.owners.insert(package, owners);
        }
        Ok(ledger)
    }

    pub fn to_toml_string(&self) -> Result<String, FormatError> {
        let file = CoownershipFile {
            version: COOWNERSHIP_FILE_VERSION,
            packages: self
                .owners
                .iter()
                .map(|(package, owners)| CoownershipRecord {
                    name: package.name().to_string(),
                    arch: package.architecture().to_string(),
                    owners: owners.iter().cloned().collect(),
                })
                .collect(),
        };
        toml::to_string(&file)
            .map_err(|err| FormatError::new(StructureKind::Coownership, err.to_string()))
    }
}
