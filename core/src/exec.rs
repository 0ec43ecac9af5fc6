//! Sync Executor: carries out a [`crate::plan::SyncPlan`] against two
//! [`AbstractFs`] backends, per §4.6.
//!
//! The per-leaf "resolve operation, wrap in try-reporting-error, dispatch"
//! loop is grounded in artid's backup executor
//! (`examples/gabo01-artid/src/core/src/ops/backup/mod.rs`), which drives a
//! `CopyModel`'s actions one at a time with the same retry-or-skip
//! decision per item; widened here from one-directional copy to the full
//! create/overwrite/delete/move/rename operation set.

use crate::afs::{AbstractFs, AfsError, ByteProgress};
use crate::binarycmp::BinaryComparator;
use crate::callback::{ErrorSink, ProgressSink};
use crate::delete::{DeletionPolicy, Deleter};
use crate::errors::{try_reporting_error, SyncError};
use crate::model::{NodeId, PairNode, SyncOperation, Tree};
use crate::path::AbstractPath;
use crate::plan::{PlannedStep, SyncPlan};

use chrono::Utc;
use log::{debug, warn};

/// What happened to one planned step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The operation completed and the item is now in sync.
    Done,
    /// The user's error callback chose to ignore a failure for this item.
    Failed,
    /// Verification after a copy found a mismatch; the target was deleted.
    VerificationFailed,
}

/// Executes a [`SyncPlan`] against two backends.
pub struct Executor<'a> {
    left_fs: &'a dyn AbstractFs,
    right_fs: &'a dyn AbstractFs,
    error_sink: &'a dyn ErrorSink,
    progress: &'a dyn ProgressSink,
    deletion_policy_left: DeletionPolicy,
    deletion_policy_right: DeletionPolicy,
    copy_permissions: bool,
    transactional: bool,
    verify: bool,
}

impl<'a> Executor<'a> {
    /// Builds an executor. `transactional` corresponds to the user's
    /// fail-safe-copy setting passed to `copy-file-transactional`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left_fs: &'a dyn AbstractFs,
        right_fs: &'a dyn AbstractFs,
        error_sink: &'a dyn ErrorSink,
        progress: &'a dyn ProgressSink,
        deletion_policy_left: DeletionPolicy,
        deletion_policy_right: DeletionPolicy,
        copy_permissions: bool,
        transactional: bool,
        verify: bool,
    ) -> Self {
        Self {
            left_fs,
            right_fs,
            error_sink,
            progress,
            deletion_policy_left,
            deletion_policy_right,
            copy_permissions,
            transactional,
            verify,
        }
    }

    /// Runs the full three-pass plan, returning the number of leaves that
    /// ended up `Failed` (surfaced by the caller as
    /// [`SyncError::PartialFailure`] if non-zero).
    pub fn execute(&self, tree: &mut Tree, plan: &SyncPlan) -> Result<usize, SyncError> {
        let total = plan.pass_zero.len() + plan.pass_one.len() + plan.pass_two.len();
        debug!("executing plan: {} step(s) across three passes", total);

        let mut failures = 0;
        for step in plan.pass_zero.iter().chain(&plan.pass_one).chain(&plan.pass_two) {
            let path = self.display_path(tree.get(step.node));
            match self.execute_step(tree, step)? {
                Outcome::Done => {}
                outcome @ (Outcome::Failed | Outcome::VerificationFailed) => {
                    warn!("{:?} failed on {}: {:?}", step.operation, path.display(), outcome);
                    failures += 1;
                }
            }
        }
        Ok(failures)
    }

    fn execute_step(&self, tree: &mut Tree, step: &PlannedStep) -> Result<Outcome, SyncError> {
        let path_for_progress = {
            let node = tree.get(step.node);
            self.display_path(node)
        };
        self.progress.item_started(&path_for_progress);

        let outcome = match step.operation {
            SyncOperation::CreateRight | SyncOperation::OverwriteRight => self.copy(tree, step.node, Side::Right)?,
            SyncOperation::CreateLeft | SyncOperation::OverwriteLeft => self.copy(tree, step.node, Side::Left)?,
            SyncOperation::DeleteLeft => self.delete(tree, step.node, Side::Left)?,
            SyncOperation::DeleteRight => self.delete(tree, step.node, Side::Right)?,
            SyncOperation::MoveLeftFrom | SyncOperation::MoveRightFrom => self.r#move(tree, step.node)?,
            SyncOperation::RenameLeft => self.rename_away(tree, step.node, Side::Left)?,
            SyncOperation::RenameRight => self.rename_away(tree, step.node, Side::Right)?,
            SyncOperation::MoveLeftTo | SyncOperation::MoveRightTo | SyncOperation::DoNothing | SyncOperation::Equal | SyncOperation::Conflict => {
                Outcome::Done
            }
        };

        if outcome == Outcome::Done {
            self.mark_in_sync(tree, step.node);
        }
        self.progress.item_finished(&path_for_progress);
        Ok(outcome)
    }

    fn display_path(&self, node: &PairNode) -> std::path::PathBuf {
        std::path::PathBuf::from(if !node.left_name.is_empty() { &node.left_name } else { &node.right_name })
    }

    fn copy(&self, tree: &mut Tree, id: NodeId, target_side: Side) -> Result<Outcome, SyncError> {
        let (source_fs, source_path, source_attrs, target_fs, target_path) = {
            let node = tree.get(id);
            match target_side {
                Side::Right => (
                    self.left_fs,
                    self.source_path_left(node),
                    node.left_attrs,
                    self.right_fs,
                    self.source_path_right(node),
                ),
                Side::Left => (
                    self.right_fs,
                    self.source_path_right(node),
                    node.right_attrs,
                    self.left_fs,
                    self.source_path_left(node),
                ),
            }
        };
        let Some(source_attrs) = source_attrs else {
            return Ok(Outcome::Failed);
        };

        let progress = self.progress;
        let target_path_for_progress = target_path.relative().to_path_buf();

        let policy = match target_side {
            Side::Left => &self.deletion_policy_left,
            Side::Right => &self.deletion_policy_right,
        };
        let copy_permissions = self.copy_permissions;
        let transactional = self.transactional;

        let result = try_reporting_error(
            || {
                let mut pre_delete = |target_fs: &dyn AbstractFs| -> Result<(), AfsError> {
                    if target_fs.item_exists(&target_path)? && !matches!(target_fs.get_item_type(&target_path)?, crate::path::ItemType::File) {
                        return Err(AfsError::WrongType(target_path.relative().to_path_buf()));
                    }
                    if target_fs.item_exists(&target_path)? {
                        let mut deleter = Deleter::new(target_fs, None);
                        deleter.delete_file(&target_path, policy, Utc::now())?;
                    }
                    Ok(())
                };
                let mut on_bytes = |n: u64| -> Result<(), AfsError> {
                    progress.item_bytes(&target_path_for_progress, n);
                    Ok(())
                };
                let copy_result = target_fs.copy_file_transactional(
                    &source_path,
                    &source_attrs,
                    &target_path,
                    copy_permissions,
                    transactional,
                    &mut pre_delete_adapter(&mut pre_delete, target_fs),
                    &mut on_bytes,
                );
                copy_result
            },
            |err: &AfsError| self.error_sink.on_error(target_path.relative(), err),
        )?;

        let Some(_outcome) = result else {
            return Ok(Outcome::Failed);
        };

        if self.verify {
            let matches = BinaryComparator::default().compare(source_fs, &source_path, target_fs, &target_path, &mut |_| Ok(()))?;
            if !matches {
                let _ = target_fs.remove_file_plain(&target_path);
                return Ok(Outcome::VerificationFailed);
            }
        }

        Ok(Outcome::Done)
    }

    fn delete(&self, tree: &Tree, id: NodeId, side: Side) -> Result<Outcome, SyncError> {
        let node = tree.get(id);
        let (fs, path, policy) = match side {
            Side::Left => (self.left_fs, self.source_path_left(node), &self.deletion_policy_left),
            Side::Right => (self.right_fs, self.source_path_right(node), &self.deletion_policy_right),
        };

        let item_type = fs.get_item_type(&path).map_err(SyncError::from)?;
        let mut deleter = Deleter::new(fs, None);
        let result = try_reporting_error(
            || match item_type {
                crate::path::ItemType::Folder => deleter.delete_folder(&path, policy, Utc::now()),
                _ => deleter.delete_file(&path, policy, Utc::now()),
            },
            |err: &AfsError| self.error_sink.on_error(path.relative(), err),
        )?;
        Ok(if result.is_some() { Outcome::Done } else { Outcome::Failed })
    }

    fn r#move(&self, tree: &mut Tree, id: NodeId) -> Result<Outcome, SyncError> {
        let Some(partner) = tree.get(id).move_ref else {
            return Ok(Outcome::Failed);
        };
        let (from_node, to_node) = (tree.get(id).clone(), tree.get(partner).clone());

        // Whichever of the pair is left-only is the move's source side;
        // the partner (right-only) names the destination.
        let (fs, from_path, to_path) = if from_node.left_attrs.is_some() {
            (self.left_fs, self.source_path_left(&from_node), self.path_with_name(&self.source_path_left(&from_node), &to_node.right_name))
        } else {
            (self.right_fs, self.source_path_right(&from_node), self.path_with_name(&self.source_path_right(&from_node), &to_node.left_name))
        };

        let result = try_reporting_error(
            || fs.rename_item(&from_path, &to_path),
            |err: &AfsError| self.error_sink.on_error(from_path.relative(), err),
        );

        match result {
            Ok(Some(())) => Ok(Outcome::Done),
            Ok(None) => Ok(Outcome::Failed),
            Err(_) => {
                // Cross-device or rename-unsupported: copy + delete,
                // treated symmetrically per Design Note (c).
                let attrs = fs.attributes(&from_path).map_err(SyncError::from)?;
                struct NoProgress;
                impl ByteProgress for NoProgress {
                    fn on_bytes(&mut self, _: u64) -> Result<(), AfsError> {
                        Ok(())
                    }
                }
                fs.copy_file_transactional(&from_path, &attrs, &to_path, true, true, &mut || Ok(()), &mut NoProgress)
                    .map_err(SyncError::from)?;
                fs.remove_file_plain(&from_path).map_err(SyncError::from)?;
                Ok(Outcome::Done)
            }
        }
    }

    /// Carries out a `RenameLeft`/`RenameRight` step. Two quite different
    /// things share this operation: a move's source half staged out of the
    /// way under a random `.ffs_tmp` name (when the node still carries a
    /// `move_ref`, per `plan.rs`'s two-step-move pass), and a case-only
    /// rename, where a node with no move partner has both sides' attrs
    /// populated and the rename target is simply the other side's own
    /// casing of the same name.
    fn rename_away(&self, tree: &Tree, id: NodeId, side: Side) -> Result<Outcome, SyncError> {
        let node = tree.get(id);
        let (fs, path) = match side {
            Side::Left => (self.left_fs, self.source_path_left(node)),
            Side::Right => (self.right_fs, self.source_path_right(node)),
        };

        let target_name = if node.move_ref.is_some() {
            format!("{}.ffs_tmp", random_suffix())
        } else {
            let other_full = match side {
                Side::Left => &node.right_name,
                Side::Right => &node.left_name,
            };
            std::path::Path::new(other_full)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| other_full.clone())
        };

        let target = self.path_with_name(&path, &target_name);
        fs.rename_item(&path, &target).map_err(SyncError::from)?;
        Ok(Outcome::Done)
    }

    fn mark_in_sync(&self, tree: &mut Tree, id: NodeId) {
        let node = tree.get_mut(id);
        node.category = crate::model::FileContentCategory::Equal;
        node.direction = crate::model::SyncDirection::None;
    }

    fn source_path_left(&self, node: &PairNode) -> AbstractPath {
        AbstractPath::new(crate::path::Device::new("left"), node.left_name.clone())
    }

    fn source_path_right(&self, node: &PairNode) -> AbstractPath {
        AbstractPath::new(crate::path::Device::new("right"), node.right_name.clone())
    }

    fn path_with_name(&self, base: &AbstractPath, name: &str) -> AbstractPath {
        match base.parent() {
            Some(parent) => parent.join(name),
            None => AbstractPath::new(base.device().clone(), name),
        }
    }
}

#[derive(Copy, Clone)]
enum Side {
    Left,
    Right,
}

fn pre_delete_adapter<'a>(f: &'a mut dyn FnMut(&dyn AbstractFs) -> Result<(), AfsError>, fs: &'a dyn AbstractFs) -> impl FnMut() -> Result<(), AfsError> + 'a {
    move || f(fs)
}

fn random_suffix() -> String {
    use rand::Rng;
    let n: u32 = rand::thread_rng().gen();
    format!("{n:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afs::MemoryFs;
    use crate::callback::{IgnoreAllErrors, NullProgressSink};
    use crate::model::{FileContentCategory, PairKind, SyncDirection};
    use crate::path::FileAttributes;

    #[test]
    fn create_right_copies_content_and_marks_equal() {
        let left_fs = MemoryFs::new();
        let right_fs = MemoryFs::new();
        let path = AbstractPath::new(crate::path::Device::new("left"), "a.txt");
        left_fs.seed_file(&path, b"hello".to_vec(), 1000);

        let mut tree = Tree::new();
        let id = tree.insert(PairNode {
            kind: PairKind::File,
            left_name: "a.txt".into(),
            right_name: String::new(),
            left_attrs: Some(FileAttributes::new(1000, 5)),
            right_attrs: None,
            category: FileContentCategory::LeftOnly,
            direction: SyncDirection::Right,
            active: true,
            move_ref: None,
            children: Vec::new(),
        });

        let error_sink = IgnoreAllErrors;
        let progress = NullProgressSink;
        let executor = Executor::new(
            &left_fs,
            &right_fs,
            &error_sink,
            &progress,
            DeletionPolicy::Permanent,
            DeletionPolicy::Permanent,
            false,
            true,
            false,
        );

        let plan = crate::plan::Planner::new(&mut tree).plan(&[id]);
        let failures = executor.execute(&mut tree, &plan).unwrap();
        assert_eq!(failures, 0);
        assert_eq!(tree.get(id).category, FileContentCategory::Equal);

        let right_path = AbstractPath::new(crate::path::Device::new("right"), "a.txt");
        assert!(right_fs.item_exists(&right_path).unwrap());
    }

    #[test]
    fn case_only_rename_renames_left_to_match_right() {
        let left_fs = MemoryFs::new();
        let right_fs = MemoryFs::new();
        let left_path = AbstractPath::new(crate::path::Device::new("left"), "File.TXT");
        left_fs.seed_file(&left_path, b"hello".to_vec(), 1000);
        let right_path = AbstractPath::new(crate::path::Device::new("right"), "file.txt");
        right_fs.seed_file(&right_path, b"hello".to_vec(), 1000);

        let mut tree = Tree::new();
        let id = tree.insert(PairNode {
            kind: PairKind::File,
            left_name: "File.TXT".into(),
            right_name: "file.txt".into(),
            left_attrs: Some(FileAttributes::new(1000, 5)),
            right_attrs: Some(FileAttributes::new(1000, 5)),
            category: FileContentCategory::EqualAttributesOnly,
            direction: SyncDirection::None,
            active: true,
            move_ref: None,
            children: Vec::new(),
        });

        let error_sink = IgnoreAllErrors;
        let progress = NullProgressSink;
        let executor = Executor::new(&left_fs, &right_fs, &error_sink, &progress, DeletionPolicy::Permanent, DeletionPolicy::Permanent, false, true, false);

        let plan = crate::plan::Planner::new(&mut tree).plan(&[id]);
        let failures = executor.execute(&mut tree, &plan).unwrap();
        assert_eq!(failures, 0);

        assert!(!left_fs.item_exists(&left_path).unwrap());
        let renamed = AbstractPath::new(crate::path::Device::new("left"), "file.txt");
        assert!(left_fs.item_exists(&renamed).unwrap());
    }
}
