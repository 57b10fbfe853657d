pub mod comparator;
pub mod engine;
pub mod entry;
pub mod filter;
pub mod plan;
pub mod report;
pub mod scanner;

pub use comparator::{CompareConfig, Direction, FileComparator};
pub use engine::{Executor, SyncConfig, SyncEngine, TransferExecutor};
pub use entry::{FileEntry, LastModified, Origin, StorageClass};
pub use filter::{FilterRule, PathFilter, StorageClassPolicy};
pub use plan::{ActionSummary, ItemWarning, Side, SyncAction, SyncDecision, SyncPlan};
pub use report::{ExitStatus, OutcomeStatus, SyncReport, TransferOutcome};
pub use scanner::{FileScanner, Listing, UnreadableEntry};
