pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod identity;
pub mod merge;
pub mod model;
pub mod report;
pub mod scan;
pub mod snapshot;
pub mod util;
pub mod walker;

pub use aggregate::{Aggregator, AuthorFilter, FoldOutcome};
pub use error::{LocError, Result};
pub use merge::{merge, merge_with, ConflictPolicy, MergeResult};
pub use snapshot::Snapshot;
pub use walker::{CancelToken, CommitWalker, MergePolicy, TraversalOrder};
