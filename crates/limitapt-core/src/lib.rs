mod coownership;
mod debconf;
mod enclosure;
mod error;
mod packages;
mod settings;
mod tasks;

pub use coownership::{CoownershipLedger, LedgerUpdate, ReleaseOutcome};
pub use debconf::{DebconfPriorities, PackageState, Priority, Status};
pub use enclosure::{ArchAndVersions, Enclosing, Enclosure, MixedEnclosure, Versions};
pub use error::{CoownershipError, DebconfError, EnclosureError, FormatError, StructureKind};
pub use packages::{ConcretePackage, VersionedPackage, ALL_ARCHITECTURE, ROOT_USERNAME};
pub use settings::{
    DebconfSettings, EnclosureSource, FreshnessSettings, GroupSettings, MinimalFreeSpace,
    OriginSettings, PackageListsSettings, PathSettings, ResumeAuthorization, ResumeSettings,
    Settings, SpaceAmount,
};
pub use tasks::{Realization, RealizedTaskSet, TaskKind, TaskSet};

#[cfg(test)]
mod tests;
