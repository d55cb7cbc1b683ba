mod error;
mod fs_utils;
mod journal;
mod layout;
mod store;
mod update_times;

pub use error::{JournalError, StoreError};
pub use journal::{InterruptionJournal, JournalEntry, JournalOperation};
pub use layout::{StateLayout, DEFAULT_STATE_DIR, STATE_DIR_ENV};
pub use store::StateStore;
pub use update_times::{current_unix_timestamp, UpdateTimes};
