//! Categorizer: turns a pair of raw scanner records into a [`PairNode`]
//! tree with a [`FileContentCategory`] assigned to each node.
//!
//! Grounded in the comparison rules of §4.3; there is no direct teacher
//! analogue (artid only ever looked at one side of a backup), so the tree
//! walk itself follows the recursive shape of artid's `DirTree` builder
//! (`examples/gabo01-artid/src/core/src/ops/core/tree.rs`) widened to walk
//! two `BTreeMap`s in lock-step instead of one.

use std::collections::BTreeMap;

use crate::afs::AbstractFs;
use crate::filter::SoftFilter;
use crate::lssdb::CompareVariant;
use crate::model::{FileContentCategory, NodeId, PairKind, PairNode, SyncDirection, Tree};
use crate::path::FileAttributes;
use crate::scan::RawItem;

/// Categorizes a pair of raw per-side trees into `tree`, returning the
/// list of top-level node ids (the tree's new roots).
pub struct Categorizer<'a> {
    variant: CompareVariant,
    tolerance_secs: i64,
    ignored_time_shifts: &'a [i64],
    soft_filter: SoftFilter,
}

impl<'a> Categorizer<'a> {
    /// Builds a categorizer for the given compare variant and tolerances.
    pub fn new(variant: CompareVariant, tolerance_secs: i64, ignored_time_shifts: &'a [i64], soft_filter: SoftFilter) -> Self {
        Self {
            variant,
            tolerance_secs,
            ignored_time_shifts,
            soft_filter,
        }
    }

    /// Walks `left` and `right` in lock-step by name, inserting a node per
    /// distinct name into `tree`. When `variant` is `ByContent`,
    /// `binary_equal` is consulted for same-size file pairs to settle
    /// `equal` vs `different`; callers without file content access (pure
    /// unit tests) may pass a closure that always returns `false`.
    ///
    /// A node's `left_name`/`right_name` carry the full slash-joined path
    /// relative to the base folder, not just the leaf's own name, so the
    /// executor can address any node — not only top-level ones — without
    /// re-walking the tree to recover its ancestry.
    pub fn categorize(
        &self,
        tree: &mut Tree,
        left: &BTreeMap<String, RawItem>,
        right: &BTreeMap<String, RawItem>,
        binary_equal: &mut dyn FnMut(&str, &str) -> bool,
    ) -> Vec<NodeId> {
        let mut roots = Vec::new();
        for (left_name, right_name) in paired_names(left, right) {
            let left_item = left_name.as_deref().and_then(|n| left.get(n));
            let right_item = right_name.as_deref().and_then(|n| right.get(n));
            if let Some(id) = self.categorize_one(tree, "", "", left_name.as_deref(), right_name.as_deref(), left_item, right_item, binary_equal) {
                roots.push(id);
            }
        }
        roots
    }

    #[allow(clippy::too_many_arguments)]
    fn categorize_one(
        &self,
        tree: &mut Tree,
        left_prefix: &str,
        right_prefix: &str,
        left_name: Option<&str>,
        right_name: Option<&str>,
        left_item: Option<&RawItem>,
        right_item: Option<&RawItem>,
        binary_equal: &mut dyn FnMut(&str, &str) -> bool,
    ) -> Option<NodeId> {
        let left_full = left_name.map(|n| join(left_prefix, n));
        let right_full = right_name.map(|n| join(right_prefix, n));

        match (left_item, right_item) {
            (Some(RawItem::Folder(left_children)), Some(RawItem::Folder(right_children))) => {
                let left_full = left_full.unwrap();
                let right_full = right_full.unwrap();
                let mut children_tree_roots = Vec::new();
                for (child_left, child_right) in paired_names(left_children, right_children) {
                    if let Some(id) = self.categorize_one(
                        tree,
                        &left_full,
                        &right_full,
                        child_left.as_deref(),
                        child_right.as_deref(),
                        child_left.as_deref().and_then(|n| left_children.get(n)),
                        child_right.as_deref().and_then(|n| right_children.get(n)),
                        binary_equal,
                    ) {
                        children_tree_roots.push(id);
                    }
                }
                let all_equal = children_tree_roots
                    .iter()
                    .all(|id| tree.get(*id).category.is_equal());
                let category = if all_equal {
                    FileContentCategory::Equal
                } else {
                    FileContentCategory::Conflict("folder contents differ".into())
                };
                Some(tree.insert(PairNode {
                    kind: PairKind::Folder,
                    left_name: left_full,
                    right_name: right_full,
                    left_attrs: None,
                    right_attrs: None,
                    category,
                    direction: SyncDirection::None,
                    active: true,
                    move_ref: None,
                    children: children_tree_roots,
                }))
            }
            (Some(RawItem::Folder(_)), None) => Some(tree.insert(leaf_folder(&left_full.unwrap(), "", FileContentCategory::LeftOnly))),
            (None, Some(RawItem::Folder(_))) => Some(tree.insert(leaf_folder("", &right_full.unwrap(), FileContentCategory::RightOnly))),
            (Some(RawItem::Folder(_)), Some(_)) | (Some(_), Some(RawItem::Folder(_))) => Some(tree.insert(leaf_folder(
                left_full.as_deref().unwrap_or(""),
                right_full.as_deref().unwrap_or(""),
                FileContentCategory::Conflict("type mismatch".into()),
            ))),
            (Some(RawItem::File(_)), Some(RawItem::Symlink(_))) | (Some(RawItem::Symlink(_)), Some(RawItem::File(_))) => {
                Some(tree.insert(PairNode {
                    kind: PairKind::File,
                    left_name: left_full.clone().unwrap_or_default(),
                    right_name: right_full.clone().unwrap_or_default(),
                    left_attrs: None,
                    right_attrs: None,
                    category: FileContentCategory::Conflict("type mismatch".into()),
                    direction: SyncDirection::None,
                    active: true,
                    move_ref: None,
                    children: Vec::new(),
                }))
            }

            (Some(RawItem::Symlink(l)), Some(RawItem::Symlink(r))) => Some(tree.insert(self.file_or_symlink_node(
                PairKind::Symlink,
                left_full.as_deref(),
                right_full.as_deref(),
                Some(*l),
                Some(*r),
                binary_equal,
            ))),
            (Some(RawItem::Symlink(l)), None) => {
                Some(tree.insert(self.file_or_symlink_node(PairKind::Symlink, left_full.as_deref(), None, Some(*l), None, binary_equal)))
            }
            (None, Some(RawItem::Symlink(r))) => {
                Some(tree.insert(self.file_or_symlink_node(PairKind::Symlink, None, right_full.as_deref(), None, Some(*r), binary_equal)))
            }

            (Some(RawItem::File(l)), Some(RawItem::File(r))) => Some(tree.insert(self.file_or_symlink_node(
                PairKind::File,
                left_full.as_deref(),
                right_full.as_deref(),
                Some(*l),
                Some(*r),
                binary_equal,
            ))),
            (Some(RawItem::File(l)), None) => {
                Some(tree.insert(self.file_or_symlink_node(PairKind::File, left_full.as_deref(), None, Some(*l), None, binary_equal)))
            }
            (None, Some(RawItem::File(r))) => {
                Some(tree.insert(self.file_or_symlink_node(PairKind::File, None, right_full.as_deref(), None, Some(*r), binary_equal)))
            }

            (None, None) => None,
        }
    }

    /// Builds a file or symlink node. `left_full`/`right_full` are the
    /// item's complete path on each side; they differ only when the two
    /// sides hold the same item under different letter-casing (§4.3's
    /// case-only-rename case), in which case a same-content pair is tagged
    /// `EqualAttributesOnly` rather than `Equal` so the planner emits a
    /// rename instead of treating the pair as already in sync.
    #[allow(clippy::too_many_arguments)]
    fn file_or_symlink_node(
        &self,
        kind: PairKind,
        left_full: Option<&str>,
        right_full: Option<&str>,
        left: Option<FileAttributes>,
        right: Option<FileAttributes>,
        binary_equal: &mut dyn FnMut(&str, &str) -> bool,
    ) -> PairNode {
        let category = match (left, right) {
            (Some(_), None) => FileContentCategory::LeftOnly,
            (None, Some(_)) => FileContentCategory::RightOnly,
            (None, None) => unreachable!("file_or_symlink_node requires at least one side"),
            (Some(l), Some(r)) => {
                let base = self.compare(l, r, left_full.unwrap(), right_full.unwrap(), binary_equal);
                if base == FileContentCategory::Equal && left_full != right_full {
                    FileContentCategory::EqualAttributesOnly
                } else {
                    base
                }
            }
        };

        let soft_excluded = match (left, right) {
            (Some(a), _) | (_, Some(a)) => !self.soft_filter.matches(a.size, a.mod_time),
            (None, None) => unreachable!("file_or_symlink_node requires at least one side"),
        };

        PairNode {
            kind,
            left_name: left_full.map(String::from).unwrap_or_default(),
            right_name: right_full.map(String::from).unwrap_or_default(),
            left_attrs: left,
            right_attrs: right,
            category,
            direction: SyncDirection::None,
            active: !soft_excluded,
            move_ref: None,
            children: Vec::new(),
        }
    }

    fn compare(
        &self,
        left: FileAttributes,
        right: FileAttributes,
        left_name: &str,
        right_name: &str,
        binary_equal: &mut dyn FnMut(&str, &str) -> bool,
    ) -> FileContentCategory {
        if !left.has_valid_time() || !right.has_valid_time() {
            return FileContentCategory::InvalidTime;
        }

        match self.variant {
            CompareVariant::ByTimeAndSize => {
                if left.size != right.size {
                    if self.times_equal(left.mod_time, right.mod_time) {
                        return FileContentCategory::SameDateDiffSize;
                    }
                    return FileContentCategory::Different;
                }
                if self.times_equal(left.mod_time, right.mod_time) {
                    FileContentCategory::Equal
                } else {
                    FileContentCategory::Different
                }
            }
            CompareVariant::ByContent => {
                if left.size == right.size && binary_equal(left_name, right_name) {
                    FileContentCategory::Equal
                } else {
                    FileContentCategory::Different
                }
            }
            CompareVariant::BySize => {
                if left.size == right.size {
                    FileContentCategory::Equal
                } else {
                    FileContentCategory::Different
                }
            }
        }
    }

    fn times_equal(&self, a: i64, b: i64) -> bool {
        let delta = (a - b).abs();
        if delta <= self.tolerance_secs {
            return true;
        }
        self.ignored_time_shifts.iter().any(|shift| delta == shift.abs())
    }
}

fn leaf_folder(left_name: &str, right_name: &str, category: FileContentCategory) -> PairNode {
    PairNode {
        kind: PairKind::Folder,
        left_name: left_name.to_string(),
        right_name: right_name.to_string(),
        left_attrs: None,
        right_attrs: None,
        category,
        direction: SyncDirection::None,
        active: true,
        move_ref: None,
        children: Vec::new(),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Pairs up the names of two sides' raw item maps, folding case so that
/// e.g. `File.TXT` on the left and `file.txt` on the right land in the same
/// pair instead of becoming independent one-sided nodes (§4.3 invariant
/// (b), the case-only-rename boundary). Names that match exactly produce a
/// pair with identical left/right names, same as before folding existed.
fn paired_names(left: &BTreeMap<String, RawItem>, right: &BTreeMap<String, RawItem>) -> Vec<(Option<String>, Option<String>)> {
    let mut by_fold: BTreeMap<String, (Option<String>, Option<String>)> = BTreeMap::new();
    for name in left.keys() {
        by_fold.entry(name.to_lowercase()).or_default().0 = Some(name.clone());
    }
    for name in right.keys() {
        by_fold.entry(name.to_lowercase()).or_default().1 = Some(name.clone());
    }
    by_fold.into_values().collect()
}

/// Whether two files compare byte-for-byte identical, reading through
/// `left_fs`/`right_fs` with the streaming byte-by-byte approach the
/// Binary Comparator uses. Exposed here for callers that just want a
/// boolean without the adaptive block-size machinery of
/// [`crate::binarycmp`].
pub fn files_have_same_content(
    left_fs: &dyn AbstractFs,
    left_path: &crate::path::AbstractPath,
    right_fs: &dyn AbstractFs,
    right_path: &crate::path::AbstractPath,
) -> Result<bool, crate::afs::AfsError> {
    crate::binarycmp::BinaryComparator::default().compare(left_fs, left_path, right_fs, right_path, &mut |_| Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FileAttributes;

    fn variant_categorizer(variant: CompareVariant) -> Categorizer<'static> {
        Categorizer::new(variant, 2, &[], SoftFilter::pass_all())
    }

    #[test]
    fn by_time_size_equal_within_tolerance() {
        let cat = variant_categorizer(CompareVariant::ByTimeAndSize);
        let a = FileAttributes::new(1000, 10);
        let b = FileAttributes::new(1001, 10);
        assert_eq!(cat.compare(a, b, "x", "x", &mut |_, _| false), FileContentCategory::Equal);
    }

    #[test]
    fn by_time_size_one_second_beyond_tolerance_differs() {
        let cat = Categorizer::new(CompareVariant::ByTimeAndSize, 2, &[], SoftFilter::pass_all());
        let a = FileAttributes::new(1000, 10);
        let b = FileAttributes::new(1003, 10);
        assert_eq!(cat.compare(a, b, "x", "x", &mut |_, _| false), FileContentCategory::Different);
    }

    #[test]
    fn same_date_diff_size_is_distinct_from_different() {
        let cat = variant_categorizer(CompareVariant::ByTimeAndSize);
        let a = FileAttributes::new(1000, 10);
        let b = FileAttributes::new(1000, 11);
        assert_eq!(cat.compare(a, b, "x", "x", &mut |_, _| false), FileContentCategory::SameDateDiffSize);
    }

    #[test]
    fn by_content_defers_to_binary_comparison_on_equal_size() {
        let cat = variant_categorizer(CompareVariant::ByContent);
        let a = FileAttributes::new(1000, 10);
        let b = FileAttributes::new(2000, 10);
        assert_eq!(cat.compare(a, b, "x", "x", &mut |_, _| true), FileContentCategory::Equal);
        assert_eq!(cat.compare(a, b, "x", "x", &mut |_, _| false), FileContentCategory::Different);
    }

    #[test]
    fn invalid_time_detected_on_either_side() {
        let cat = variant_categorizer(CompareVariant::ByTimeAndSize);
        let a = FileAttributes::new(-5, 10);
        let b = FileAttributes::new(1000, 10);
        assert_eq!(cat.compare(a, b, "x", "x", &mut |_, _| false), FileContentCategory::InvalidTime);
    }

    #[test]
    fn case_only_name_difference_pairs_into_one_node() {
        let cat = variant_categorizer(CompareVariant::ByTimeAndSize);
        let mut left = BTreeMap::new();
        left.insert("File.TXT".to_string(), RawItem::File(FileAttributes::new(1000, 10)));
        let mut right = BTreeMap::new();
        right.insert("file.txt".to_string(), RawItem::File(FileAttributes::new(1000, 10)));

        let mut tree = Tree::new();
        let roots = cat.categorize(&mut tree, &left, &right, &mut |_, _| false);

        assert_eq!(roots.len(), 1);
        let node = tree.get(roots[0]);
        assert_eq!(node.category, FileContentCategory::EqualAttributesOnly);
        assert_eq!(node.left_name, "File.TXT");
        assert_eq!(node.right_name, "file.txt");
    }

    #[test]
    fn case_only_name_difference_with_different_content_stays_different() {
        let cat = variant_categorizer(CompareVariant::ByTimeAndSize);
        let mut left = BTreeMap::new();
        left.insert("File.TXT".to_string(), RawItem::File(FileAttributes::new(1000, 10)));
        let mut right = BTreeMap::new();
        right.insert("file.txt".to_string(), RawItem::File(FileAttributes::new(2000, 20)));

        let mut tree = Tree::new();
        let roots = cat.categorize(&mut tree, &left, &right, &mut |_, _| false);

        assert_eq!(roots.len(), 1);
        assert_eq!(tree.get(roots[0]).category, FileContentCategory::Different);
    }
}
