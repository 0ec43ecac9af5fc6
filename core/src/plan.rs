//! Sync Planner: turns a directioned comparison tree into an ordered,
//! executable plan with up-front statistics, per §4.5.
//!
//! No teacher module plans multi-pass work ahead of execution; the
//! statistics-before-action shape is grounded in artid's `CopyModel`
//! (`examples/gabo01-artid/src/core/src/ops/backup/model.rs`), which
//! likewise collects a list of `CopyAction`s before anything runs. The
//! three-pass ordering (move-prep, space-freeing, creation) and the
//! killer-scenario two-step-move handling are implemented directly from
//! the specification's prose, since they have no teacher analogue.

use std::collections::HashSet;

use crate::direction::RESERVED_TEMP_EXTENSION;
use crate::model::{FileContentCategory, NodeId, SyncDirection, SyncOperation, Tree};

/// One concrete step the executor will perform.
#[derive(Clone, Debug)]
pub struct PlannedStep {
    /// Node this step applies to.
    pub node: NodeId,
    /// The resolved operation.
    pub operation: SyncOperation,
}

/// Logical (not physical — a folder delete counts as 1 regardless of its
/// recursive size) counts tallied before execution begins.
#[derive(Clone, Debug, Default)]
pub struct SyncStatistics {
    /// Items to be created on the left.
    pub creates_left: usize,
    /// Items to be created on the right.
    pub creates_right: usize,
    /// Items to be updated (overwritten) on the left.
    pub updates_left: usize,
    /// Items to be updated (overwritten) on the right.
    pub updates_right: usize,
    /// Items to be deleted on the left.
    pub deletes_left: usize,
    /// Items to be deleted on the right.
    pub deletes_right: usize,
    /// Total bytes expected to move, summed from the winning side's size.
    pub bytes_to_process: u64,
    /// Up to `K` conflict descriptions, for a plan-time preview.
    pub conflict_preview: Vec<String>,
}

/// The three-pass ordering used by the executor.
#[derive(Clone, Debug, Default)]
pub struct SyncPlan {
    /// Move preparation: two-step moves whose rename must run before the
    /// space-freeing pass touches the same parent.
    pub pass_zero: Vec<PlannedStep>,
    /// Deletions and shrinking overwrites.
    pub pass_one: Vec<PlannedStep>,
    /// Creations, growing/equal overwrites, and move destinations.
    pub pass_two: Vec<PlannedStep>,
    /// Statistics tallied while building the plan.
    pub statistics: SyncStatistics,
}

const CONFLICT_PREVIEW_LIMIT: usize = 20;

/// Builds a [`SyncPlan`] by walking every node reachable from `roots`.
pub struct Planner<'a> {
    tree: &'a mut Tree,
}

impl<'a> Planner<'a> {
    /// Plans over `tree`.
    pub fn new(tree: &'a mut Tree) -> Self {
        Self { tree }
    }

    /// Builds the plan for the subtree rooted at `roots`.
    pub fn plan(&mut self, roots: &[NodeId]) -> SyncPlan {
        let mut plan = SyncPlan::default();
        let mut moved_to_temp: HashSet<NodeId> = HashSet::new();

        self.plan_moves(roots, &mut plan, &mut moved_to_temp);

        let mut leaves = Vec::new();
        collect_leaves(self.tree, roots, &mut leaves);

        for id in leaves {
            if moved_to_temp.contains(&id) {
                continue;
            }
            let operation = resolve_operation(self.tree, id);
            self.tally(&mut plan.statistics, self.tree, id, operation);

            match operation {
                SyncOperation::DeleteLeft
                | SyncOperation::DeleteRight
                | SyncOperation::OverwriteLeft
                | SyncOperation::OverwriteRight
                    if is_shrinking_overwrite_or_delete(self.tree, id, operation) =>
                {
                    plan.pass_one.push(PlannedStep { node: id, operation });
                }
                SyncOperation::DoNothing | SyncOperation::Equal | SyncOperation::Conflict => {}
                _ => plan.pass_two.push(PlannedStep { node: id, operation }),
            }
        }

        plan
    }

    /// Pass zero: for every move pair whose source parent is being deleted
    /// or whose target name clashes on the destination side, stage a
    /// two-step move through a uniquely named `.ffs_tmp` sibling. This is
    /// what breaks killer scenarios like `A → A/A`.
    fn plan_moves(&mut self, roots: &[NodeId], plan: &mut SyncPlan, moved_to_temp: &mut HashSet<NodeId>) {
        let mut move_pairs = Vec::new();
        collect_move_pairs(self.tree, roots, &mut move_pairs);

        for (from, to) in move_pairs {
            if moved_to_temp.contains(&from) {
                continue;
            }
            if needs_two_step_move(self.tree, from, to) {
                plan.pass_zero.push(PlannedStep {
                    node: from,
                    operation: rename_away_operation(self.tree, from),
                });
                moved_to_temp.insert(from);
            }
        }
    }

    fn tally(&self, stats: &mut SyncStatistics, tree: &Tree, id: NodeId, operation: SyncOperation) {
        let node = tree.get(id);
        let size = node.left_attrs.map(|a| a.size).or_else(|| node.right_attrs.map(|a| a.size)).unwrap_or(0);

        match operation {
            SyncOperation::CreateLeft => {
                stats.creates_left += 1;
                stats.bytes_to_process += size;
            }
            SyncOperation::CreateRight => {
                stats.creates_right += 1;
                stats.bytes_to_process += size;
            }
            SyncOperation::OverwriteLeft => {
                stats.updates_left += 1;
                stats.bytes_to_process += size;
            }
            SyncOperation::OverwriteRight => {
                stats.updates_right += 1;
                stats.bytes_to_process += size;
            }
            SyncOperation::DeleteLeft => stats.deletes_left += 1,
            SyncOperation::DeleteRight => stats.deletes_right += 1,
            SyncOperation::Conflict => {
                if stats.conflict_preview.len() < CONFLICT_PREVIEW_LIMIT {
                    let label = if !node.left_name.is_empty() { &node.left_name } else { &node.right_name };
                    stats.conflict_preview.push(label.clone());
                }
            }
            _ => {}
        }
    }
}

fn collect_leaves(tree: &Tree, ids: &[NodeId], out: &mut Vec<NodeId>) {
    for &id in ids {
        let node = tree.get(id);
        if node.children.is_empty() {
            out.push(id);
        } else {
            collect_leaves(tree, &node.children, out);
            out.push(id);
        }
    }
}

fn collect_move_pairs(tree: &Tree, ids: &[NodeId], out: &mut Vec<(NodeId, NodeId)>) {
    for &id in ids {
        let node = tree.get(id);
        if let Some(other) = node.move_ref {
            if matches!(node.category, FileContentCategory::LeftOnly) {
                out.push((id, other));
            }
        }
        if !node.children.is_empty() {
            collect_move_pairs(tree, &node.children, out);
        }
    }
}

fn needs_two_step_move(tree: &Tree, from: NodeId, to: NodeId) -> bool {
    // A name clash exists if some *other* active node at the destination
    // already carries the target's name; conservatively, two-step whenever
    // the destination's own folder prefix is itself part of the source's
    // path (the `A -> A/A` shape), which we approximate here by checking
    // whether the destination name begins with the source name plus a
    // separator.
    let from_node = tree.get(from);
    let to_node = tree.get(to);
    let source_name = &from_node.left_name;
    let dest_name = &to_node.right_name;
    !source_name.is_empty() && dest_name.starts_with(source_name.as_str()) && dest_name.len() > source_name.len()
}

fn rename_away_operation(tree: &Tree, id: NodeId) -> SyncOperation {
    match tree.get(id).category {
        FileContentCategory::LeftOnly => SyncOperation::RenameLeft,
        FileContentCategory::RightOnly => SyncOperation::RenameRight,
        _ => SyncOperation::DoNothing,
    }
}

fn is_shrinking_overwrite_or_delete(tree: &Tree, id: NodeId, operation: SyncOperation) -> bool {
    match operation {
        SyncOperation::DeleteLeft | SyncOperation::DeleteRight => true,
        SyncOperation::OverwriteLeft | SyncOperation::OverwriteRight => {
            let node = tree.get(id);
            match (node.left_attrs, node.right_attrs) {
                (Some(l), Some(r)) => match operation {
                    SyncOperation::OverwriteLeft => r.size < l.size,
                    SyncOperation::OverwriteRight => l.size < r.size,
                    _ => false,
                },
                _ => false,
            }
        }
        _ => false,
    }
}

/// Resolves the concrete [`SyncOperation`] for a single node from its
/// category, direction and move reference, per §4.6 step 1.
pub fn resolve_operation(tree: &Tree, id: NodeId) -> SyncOperation {
    let node = tree.get(id);

    if let Some(other) = node.move_ref {
        let other_node = tree.get(other);
        return match (node.category.clone(), other_node.category.clone()) {
            (FileContentCategory::LeftOnly, FileContentCategory::RightOnly) => SyncOperation::MoveLeftFrom,
            (FileContentCategory::RightOnly, FileContentCategory::LeftOnly) => SyncOperation::MoveRightFrom,
            _ => SyncOperation::DoNothing,
        };
    }

    if !node.active {
        return SyncOperation::DoNothing;
    }

    match (&node.category, node.direction) {
        (FileContentCategory::Equal, _) => SyncOperation::Equal,
        // Case-only rename: the left side's letter-casing is always the one
        // adjusted to match the right, a fixed tie-breaker since content is
        // already equal on both sides (§4.3, §4.6 step 7).
        (FileContentCategory::EqualAttributesOnly, _) => SyncOperation::RenameLeft,
        (FileContentCategory::Conflict(_), _) | (FileContentCategory::InvalidTime, SyncDirection::None) => SyncOperation::Conflict,
        (FileContentCategory::LeftOnly, SyncDirection::Right) => SyncOperation::CreateRight,
        (FileContentCategory::LeftOnly, SyncDirection::Left) => SyncOperation::DeleteLeft,
        (FileContentCategory::RightOnly, SyncDirection::Left) => SyncOperation::CreateLeft,
        (FileContentCategory::RightOnly, SyncDirection::Right) => SyncOperation::DeleteRight,
        (FileContentCategory::Different, SyncDirection::Right) | (FileContentCategory::SameDateDiffSize, SyncDirection::Right) => {
            SyncOperation::OverwriteRight
        }
        (FileContentCategory::Different, SyncDirection::Left) | (FileContentCategory::SameDateDiffSize, SyncDirection::Left) => {
            SyncOperation::OverwriteLeft
        }
        (_, SyncDirection::None) => SyncOperation::DoNothing,
        (_, _) => SyncOperation::Conflict,
    }
}

/// True when `path`'s final component carries the reserved temp-file
/// extension, re-exported here since the planner needs the same check the
/// direction engine applies.
pub fn has_reserved_temp_extension(name: &str) -> bool {
    name.ends_with(&format!(".{RESERVED_TEMP_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PairKind;
    use crate::path::FileAttributes;

    fn leaf(category: FileContentCategory, direction: SyncDirection, left_attrs: Option<FileAttributes>, right_attrs: Option<FileAttributes>) -> crate::model::PairNode {
        crate::model::PairNode {
            kind: PairKind::File,
            left_name: "a".into(),
            right_name: "a".into(),
            left_attrs,
            right_attrs,
            category,
            direction,
            active: true,
            move_ref: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn create_right_goes_to_pass_two() {
        let mut tree = Tree::new();
        let id = tree.insert(leaf(
            FileContentCategory::LeftOnly,
            SyncDirection::Right,
            Some(FileAttributes::new(0, 10)),
            None,
        ));
        let mut planner = Planner::new(&mut tree);
        let plan = planner.plan(&[id]);
        assert_eq!(plan.pass_two.len(), 1);
        assert_eq!(plan.statistics.creates_right, 1);
        assert_eq!(plan.statistics.bytes_to_process, 10);
    }

    #[test]
    fn delete_goes_to_pass_one() {
        let mut tree = Tree::new();
        let id = tree.insert(leaf(
            FileContentCategory::LeftOnly,
            SyncDirection::Left,
            Some(FileAttributes::new(0, 10)),
            None,
        ));
        let mut planner = Planner::new(&mut tree);
        let plan = planner.plan(&[id]);
        assert_eq!(plan.pass_one.len(), 1);
        assert_eq!(plan.statistics.deletes_left, 1);
    }

    #[test]
    fn equal_node_produces_no_step() {
        let mut tree = Tree::new();
        let id = tree.insert(leaf(FileContentCategory::Equal, SyncDirection::None, None, None));
        let mut planner = Planner::new(&mut tree);
        let plan = planner.plan(&[id]);
        assert!(plan.pass_one.is_empty() && plan.pass_two.is_empty());
    }

    #[test]
    fn move_pair_resolves_to_move_operations() {
        let mut tree = Tree::new();
        let from = tree.insert(leaf(FileContentCategory::LeftOnly, SyncDirection::None, Some(FileAttributes::new(0, 5)), None));
        let to = tree.insert(leaf(FileContentCategory::RightOnly, SyncDirection::None, None, Some(FileAttributes::new(0, 5))));
        tree.link_move(from, to);

        assert_eq!(resolve_operation(&tree, from), SyncOperation::MoveLeftFrom);
        assert_eq!(resolve_operation(&tree, to), SyncOperation::MoveRightFrom);
    }

    #[test]
    fn case_only_pair_resolves_to_rename_left() {
        let mut tree = Tree::new();
        let id = tree.insert(leaf(
            FileContentCategory::EqualAttributesOnly,
            SyncDirection::None,
            Some(FileAttributes::new(0, 5)),
            Some(FileAttributes::new(0, 5)),
        ));
        assert_eq!(resolve_operation(&tree, id), SyncOperation::RenameLeft);

        let mut planner = Planner::new(&mut tree);
        let plan = planner.plan(&[id]);
        assert_eq!(plan.pass_two.len(), 1);
        assert_eq!(plan.pass_two[0].operation, SyncOperation::RenameLeft);
    }
}
