pub mod differ;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod plan;
pub mod scheduler;
pub mod snapshot;
pub mod state;
pub mod status;
pub mod tree;
pub mod watcher;

pub use differ::{DiffResult, DiffSummary, TreeDiffer};
pub use engine::{SyncContext, SyncOptions, SyncOutcome, SyncService};
pub use error::SyncError;
pub use filter::{is_excluded, ExclusionRules};
pub use fingerprint::fingerprint;
pub use plan::{Controller, Direction, TaskKind};
pub use scheduler::{ScheduleConfig, Scheduler};
pub use snapshot::SnapshotBuilder;
pub use state::{PreviousSnapshot, StateStore};
pub use status::{StatusGate, SyncStatus};
pub use tree::{Category, FileEntry, FileList, FileTree, Side};
pub use watcher::LocalWatcher;
