mod authorize;
mod changes;
mod denial;
mod error;
mod notices;
mod planning;
mod preconditions;
mod space;
mod universe;

pub use authorize::{Actor, AuthorizationResult, ChangeAuthorizer, Enforcement, Modes};
pub use changes::{AllChanges, ChangeSummary, PackageChange, Transition};
pub use denial::{Denial, Notice, Warning, WarningCause};
pub use error::{CommitError, PolicyError};
pub use notices::{report, Notifications, RecordedNotifications};
pub use planning::{purge_deletions, OperationPlanner, Plan};
pub use preconditions::{ensure_fresh, ensure_not_dirty};
pub use space::{ensure_free_space, Partition};
pub use universe::{CommitProgress, PackageFacts, PackageUniverse, SilentProgress};

#[cfg(test)]
mod tests;
