//! Core engines for a bidirectional folder synchronizer: the Abstract File
//! System, the Scanner, Categorizer and Direction Engine that together
//! decide what needs to change, and the Sync Planner and Executor that
//! carry it out.
//!
//! This crate is backend-agnostic: every engine here is written only
//! against [`afs::AbstractFs`], following the same boundary artid drew
//! around its `FileSystem` trait
//! (`examples/gabo01-artid/src/core/src/ops/core/filesystem/mod.rs`), just
//! widened to the richer capability set a two-sided synchronizer needs.

pub mod afs;
pub mod binarycmp;
pub mod callback;
pub mod categorize;
pub mod delete;
pub mod direction;
pub mod errors;
pub mod exec;
pub mod filter;
pub mod lssdb;
pub mod model;
pub mod orchestrate;
pub mod path;
pub mod plan;
pub mod scan;
pub mod tempbuf;

/// Re-exports of the types most callers need, mirroring artid's own
/// `pub mod prelude` convention.
pub mod prelude {
    pub use crate::afs::{AbstractFs, AfsError, Local, MemoryFs};
    pub use crate::callback::{ErrorSink, NullProgressSink, ProgressSink};
    pub use crate::categorize::Categorizer;
    pub use crate::delete::{DeletionPolicy, VersioningStyle};
    pub use crate::direction::{DirectionEngine, DirectionSet, SyncMode};
    pub use crate::errors::{ErrorResponse, SyncError};
    pub use crate::exec::{Executor, Outcome};
    pub use crate::filter::{HardFilter, SoftFilter};
    pub use crate::lssdb::{codec as lssdb_codec, CompareVariant, SyncFolder};
    pub use crate::model::{BaseFolderPair, FileContentCategory, SyncDirection, SyncOperation};
    pub use crate::orchestrate::{run, RunOptions, RunReport};
    pub use crate::path::{AbstractPath, Device, FileAttributes, ItemType};
    pub use crate::plan::{Planner, SyncPlan, SyncStatistics};
    pub use crate::scan::{ScanDescriptor, Scanner, SymlinkPolicy};
}
