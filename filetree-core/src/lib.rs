//! Lazily populated folder tree with incremental name search.
//!
//! [`TreeModel`] mirrors a folder and reads each directory the first time it
//! is expanded. [`search`](search::search) walks that tree depth-first,
//! loading only the directories it visits, and reveals every match.
//! [`TreeWorker`] moves both onto background threads for the GUI.

pub mod cancel;
pub mod config;
pub mod error;
pub mod fs_access;
pub mod listing;
pub mod node;
pub mod query;
pub mod search;
pub mod shared_reads;
pub mod tree;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::{CancellationToken, SearchVersionTracker};
pub use error::{Result, TreeError};
pub use fs_access::{FileSystem, OsFileSystem, RawEntry, ResolvedLink};
pub use node::{DirectoryNode, LoadState, NodeKind};
pub use query::{MatchMode, PatternSet, SearchQuery};
pub use search::{SearchLimits, SearchMatch, SearchObserver, SearchStats};
pub use shared_reads::SharedReads;
pub use tree::{ExpandPlan, TreeModel, ViewOptions, VisibleRow};
pub use worker::{TreeWorker, WorkerEvent};
