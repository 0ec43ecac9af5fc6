//! Ties the individual engines together into one run: scan both sides,
//! categorize, resolve direction (with move detection against a prior
//! last-synchronous-state database), plan, and execute.
//!
//! No teacher module runs a single end-to-end operation quite this shaped —
//! artid's closest analogue is the top-level `ops::backup::run` entry point
//! that chains "build model, then drive it" for one-directional backups
//! (`examples/gabo01-artid/src/core/src/ops/backup/mod.rs`). This widens
//! that same "build, then drive" shape to the two-sided pipeline described
//! across §4.2-§4.8.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::info;

use crate::afs::AbstractFs;
use crate::callback::{ErrorSink, ProgressSink};
use crate::categorize::{files_have_same_content, Categorizer};
use crate::delete::DeletionPolicy;
use crate::direction::{detect_moves, DirectionEngine, SyncMode};
use crate::errors::SyncError;
use crate::exec::Executor;
use crate::filter::SoftFilter;
use crate::lssdb::{CompareVariant, Descriptor, FileEntry, SyncFolder};
use crate::model::{BaseFolderPair, BaseFolderStatus, NodeId, Tree};
use crate::plan::SyncPlan;
use crate::scan::{scan_pair, ScanDescriptor, SymlinkPolicy};

/// Settings that apply to a run but aren't part of the base folder pair's
/// own persistent configuration (those live on [`BaseFolderPair`] itself).
pub struct RunOptions {
    /// Two-way reconciliation, or a fixed one-way direction set.
    pub mode: SyncMode,
    /// How to treat symlinks while scanning.
    pub symlink_policy: SymlinkPolicy,
    /// Deletion strategy for items removed on the left.
    pub deletion_policy_left: DeletionPolicy,
    /// Deletion strategy for items removed on the right.
    pub deletion_policy_right: DeletionPolicy,
    /// Whether to replay source permissions onto newly created items.
    pub copy_permissions: bool,
    /// Whether copies stage through a temp file and rename.
    pub transactional: bool,
    /// Whether to re-read and binary-compare every copy after it completes.
    pub verify: bool,
}

/// What a single [`run`] call produced.
pub struct RunReport {
    /// The plan that was built and executed.
    pub plan: SyncPlan,
    /// Count of leaves that ended up failed or verification-failed.
    pub failures: usize,
    /// The last-synchronous-state snapshot to persist for next time,
    /// reflecting every item now confirmed equal on both sides.
    pub updated_lssdb: SyncFolder,
}

/// Runs one full synchronization of `pair`, mutating its comparison tree in
/// place and returning a [`RunReport`]. `lssdb` is the previous run's
/// snapshot, or `None` on a first run (forcing two-way mode to fall back to
/// "newer wins" per [`DirectionEngine`]).
pub fn run(
    pair: &mut BaseFolderPair,
    left_fs: Arc<dyn AbstractFs>,
    right_fs: Arc<dyn AbstractFs>,
    lssdb: Option<&SyncFolder>,
    options: &RunOptions,
    error_sink: &(dyn ErrorSink + Sync),
    progress: &dyn ProgressSink,
) -> Result<RunReport, SyncError> {
    info!(
        "synchronizing {} <-> {}",
        pair.left_path.relative().display(),
        pair.right_path.relative().display()
    );

    let left_descriptor = ScanDescriptor {
        base: pair.left_path.clone(),
        filter: pair.filter.clone(),
        symlink_policy: options.symlink_policy,
    };
    let right_descriptor = ScanDescriptor {
        base: pair.right_path.clone(),
        filter: pair.filter.clone(),
        symlink_policy: options.symlink_policy,
    };

    let (left_scan, right_scan) = scan_pair(left_fs.clone(), left_descriptor, right_fs.clone(), right_descriptor, error_sink)?;

    pair.left_status = status_of(&left_scan.root);
    pair.right_status = status_of(&right_scan.root);
    let left_map = left_scan.root.unwrap_or_else(BTreeMap::new);
    let right_map = right_scan.root.unwrap_or_else(BTreeMap::new);

    let categorizer = Categorizer::new(pair.variant, pair.tolerance_secs, &pair.ignored_time_shifts, SoftFilter::pass_all());
    let left_fs_ref = left_fs.as_ref();
    let right_fs_ref = right_fs.as_ref();
    let left_base = pair.left_path.clone();
    let right_base = pair.right_path.clone();
    let mut binary_equal = |left_full_path: &str, right_full_path: &str| {
        files_have_same_content(left_fs_ref, &left_base.join(left_full_path), right_fs_ref, &right_base.join(right_full_path)).unwrap_or(false)
    };

    pair.tree = Tree::new();
    let roots = categorizer.categorize(&mut pair.tree, &left_map, &right_map, &mut binary_equal);
    pair.tree.roots = roots.clone();

    let direction_engine = DirectionEngine::new(&options.mode, lssdb, pair.tolerance_secs);
    direction_engine.resolve(&mut pair.tree, &roots);

    if let Some(lssdb) = lssdb {
        detect_moves(&mut pair.tree, &roots, lssdb, pair.tolerance_secs);
    }

    let plan = crate::plan::Planner::new(&mut pair.tree).plan(&roots);

    let executor = Executor::new(
        left_fs_ref,
        right_fs_ref,
        error_sink,
        progress,
        options.deletion_policy_left.clone(),
        options.deletion_policy_right.clone(),
        options.copy_permissions,
        options.transactional,
        options.verify,
    );
    let failures = executor.execute(&mut pair.tree, &plan)?;

    let updated_lssdb = snapshot(&pair.tree, &roots, pair.variant, left_fs_ref, right_fs_ref, &left_base, &right_base);
    info!("run complete: {} failure(s)", failures);

    Ok(RunReport { plan, failures, updated_lssdb })
}

fn status_of(root: &Option<BTreeMap<String, crate::scan::RawItem>>) -> BaseFolderStatus {
    if root.is_some() {
        BaseFolderStatus::Existing
    } else {
        BaseFolderStatus::NotExisting
    }
}

/// Walks the post-execution tree and re-reads fresh attributes for every
/// item now confirmed equal on both sides, building the snapshot that
/// becomes the next run's last-synchronous-state database. Items left
/// unresolved (conflicts, failures) are simply absent, matching the
/// specification's "only equal items are remembered" rule for §4.8.
fn snapshot(
    tree: &Tree,
    roots: &[NodeId],
    variant: CompareVariant,
    left_fs: &dyn AbstractFs,
    right_fs: &dyn AbstractFs,
    left_base: &crate::path::AbstractPath,
    right_base: &crate::path::AbstractPath,
) -> SyncFolder {
    let mut out = SyncFolder::empty();
    for &id in roots {
        let node = tree.get(id);
        if !node.category.is_equal() {
            continue;
        }
        match node.kind() {
            crate::model::PairKind::Folder => {
                let sub = snapshot(tree, &node.children, variant, left_fs, right_fs, left_base, right_base);
                out.folders.push(crate::lssdb::FolderEntry {
                    name: node.left_name.clone(),
                    status: crate::lssdb::FolderStatus::InSync,
                    node: sub,
                });
            }
            crate::model::PairKind::File => {
                let (Ok(left_attrs), Ok(right_attrs)) = (
                    left_fs.attributes(&left_base.join(&node.left_name)),
                    right_fs.attributes(&right_base.join(&node.right_name)),
                ) else {
                    continue;
                };
                out.files.push(FileEntry {
                    name: node.left_name.clone(),
                    variant,
                    left: Descriptor {
                        mod_time: left_attrs.mod_time,
                        size: left_attrs.size,
                        fingerprint: left_attrs.fingerprint,
                    },
                    right: Descriptor {
                        mod_time: right_attrs.mod_time,
                        size: right_attrs.size,
                        fingerprint: right_attrs.fingerprint,
                    },
                });
            }
            crate::model::PairKind::Symlink => {
                out.symlinks.push(crate::lssdb::SymlinkEntry {
                    name: node.left_name.clone(),
                    left_target: String::new(),
                    right_target: String::new(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afs::MemoryFs;
    use crate::callback::{IgnoreAllErrors, NullProgressSink};
    use crate::model::BaseFolderPair;
    use crate::path::{AbstractPath, Device};

    #[test]
    fn one_way_mirror_copies_left_only_file_to_right() {
        use std::io::Write;

        let left_fs: Arc<dyn AbstractFs> = Arc::new(MemoryFs::new());
        let right_fs: Arc<dyn AbstractFs> = Arc::new(MemoryFs::new());
        let path = AbstractPath::new(Device::new("left"), "a.txt");
        left_fs.write_stream(&path).unwrap().write_all(b"hi").unwrap();

        let mut pair = BaseFolderPair::new(
            AbstractPath::root(Device::new("left")),
            AbstractPath::root(Device::new("right")),
            CompareVariant::ByTimeAndSize,
        );

        let options = RunOptions {
            mode: SyncMode::OneWay(crate::direction::DirectionSet::mirror_left_to_right()),
            symlink_policy: SymlinkPolicy::Exclude,
            deletion_policy_left: DeletionPolicy::Permanent,
            deletion_policy_right: DeletionPolicy::Permanent,
            copy_permissions: false,
            transactional: true,
            verify: false,
        };

        let error_sink = IgnoreAllErrors;
        let progress = NullProgressSink;
        let report = run(&mut pair, left_fs.clone(), right_fs.clone(), None, &options, &error_sink, &progress).unwrap();

        assert_eq!(report.failures, 0);
        let right_path = AbstractPath::new(Device::new("right"), "a.txt");
        assert!(right_fs.item_exists(&right_path).unwrap());
        assert_eq!(report.updated_lssdb.files.len(), 1);
    }
}
