//! The comparison tree: pair nodes, base folder pairs, and the arena that
//! holds them.
//!
//! Per Design Note "Cyclic references" in the specification, a move
//! reference is a graph edge, not an ownership link, so nodes live in an
//! arena addressed by stable [`NodeId`]s rather than through back-pointers.
//! The arena itself follows the same "flat `Vec` plus small ID newtype"
//! shape artid uses for its `DirTree`/`TreeNode` pair
//! (`examples/gabo01-artid/src/core/src/ops/core/tree.rs`), widened here
//! from a single-sided backup tree to the two-sided comparison tree the
//! specification describes in §3.

use crate::filter::HardFilter;
use crate::lssdb::CompareVariant;
use crate::path::{AbstractPath, FileAttributes};

/// Stable index into a [`Tree`]'s arena. Never reused after a node is
/// logically removed (removal just clears the node's content instead of
/// freeing its slot), so a `NodeId` captured before a mutation is always
/// either still valid or obviously stale, never silently repurposed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(usize);

/// Which of the three pair-node shapes a node is.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PairKind {
    /// A folder present on at least one side.
    Folder,
    /// A file present on at least one side.
    File,
    /// A symlink present on at least one side.
    Symlink,
}

/// The outcome of comparing one pair of items.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileContentCategory {
    /// Both sides are equal under the active compare variant.
    Equal,
    /// Both sides are equal in content but differ in name-case only.
    EqualAttributesOnly,
    /// Present only on the left.
    LeftOnly,
    /// Present only on the right.
    RightOnly,
    /// Both sides present and differ.
    Different,
    /// Equal mod-time but different size ("same-date-diff-size").
    SameDateDiffSize,
    /// A mod-time predates a sane epoch and cannot be trusted.
    InvalidTime,
    /// The two-way direction engine could not resolve a direction; carries
    /// a human-readable reason.
    Conflict(String),
}

impl FileContentCategory {
    /// True for `Equal`. Folders use only `Equal`/`LeftOnly`/`RightOnly`/
    /// `Conflict` per §4.3; `EqualAttributesOnly` never applies to them.
    pub fn is_equal(&self) -> bool {
        matches!(self, FileContentCategory::Equal)
    }

    /// True for any `Conflict(..)` variant.
    pub fn is_conflict(&self) -> bool {
        matches!(self, FileContentCategory::Conflict(_))
    }
}

/// Which side a pending change should be propagated to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncDirection {
    /// No pending change.
    None,
    /// Propagate left's state to the right.
    Left,
    /// Propagate right's state to the left.
    Right,
}

/// The concrete operation derived from category × direction × parent
/// context, as enumerated in §3's "Sync operation".
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncOperation {
    /// Create the item on the left from the right.
    CreateLeft,
    /// Create the item on the right from the left.
    CreateRight,
    /// Delete the item on the left.
    DeleteLeft,
    /// Delete the item on the right.
    DeleteRight,
    /// Overwrite the left item with the right's content.
    OverwriteLeft,
    /// Overwrite the right item with the left's content.
    OverwriteRight,
    /// Source half of a move away from the left.
    MoveLeftFrom,
    /// Destination half of a move onto the left.
    MoveLeftTo,
    /// Source half of a move away from the right.
    MoveRightFrom,
    /// Destination half of a move onto the right.
    MoveRightTo,
    /// Case-only rename on the left.
    RenameLeft,
    /// Case-only rename on the right.
    RenameRight,
    /// Excluded by filter or otherwise inert.
    DoNothing,
    /// Already equal; nothing to do.
    Equal,
    /// Unresolved; surfaced to the user instead of executed.
    Conflict,
}

/// One node in the comparison tree.
#[derive(Clone, Debug)]
pub struct PairNode {
    pub kind: PairKind,
    /// Item name on the left, empty when absent on the left.
    pub left_name: String,
    /// Item name on the right, empty when absent on the right.
    pub right_name: String,
    /// Attributes on the left, if present there.
    pub left_attrs: Option<FileAttributes>,
    /// Attributes on the right, if present there.
    pub right_attrs: Option<FileAttributes>,
    /// Outcome of comparing the two sides.
    pub category: FileContentCategory,
    /// Pending direction for this node.
    pub direction: SyncDirection,
    /// Whether this node is included after filtering.
    pub active: bool,
    /// Mutual link to the other half of a detected move, if any.
    pub move_ref: Option<NodeId>,
    /// Children, populated only for `PairKind::Folder`.
    pub children: Vec<NodeId>,
}

impl PairNode {
    /// True when this node is absent on both sides — only valid
    /// transiently, right before removal from the tree (invariant a).
    pub fn is_doubly_empty(&self) -> bool {
        self.left_name.is_empty() && self.right_name.is_empty()
    }

    /// The kind of item this node represents.
    pub fn kind(&self) -> PairKind {
        self.kind
    }
}

/// Arena holding every [`PairNode`] of one [`BaseFolderPair`]'s comparison
/// tree, addressed by stable [`NodeId`]s.
#[derive(Default)]
pub struct Tree {
    nodes: Vec<PairNode>,
    /// Top-level nodes directly under the base folder.
    pub roots: Vec<NodeId>,
}

impl Tree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node, returning its stable id.
    pub fn insert(&mut self, node: PairNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Borrows a node.
    pub fn get(&self, id: NodeId) -> &PairNode {
        &self.nodes[id.0]
    }

    /// Mutably borrows a node.
    pub fn get_mut(&mut self, id: NodeId) -> &mut PairNode {
        &mut self.nodes[id.0]
    }

    /// Total number of nodes ever inserted (removed nodes keep their slot).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no nodes have ever been inserted.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Establishes a mutual move reference between `a` and `b`, upholding
    /// invariant (c): if A points at B, B points at A, and exactly one of
    /// the pair is left-only while the other is right-only.
    ///
    /// Panics if the nodes are not in the required left-only/right-only
    /// configuration; callers (the direction engine's move detector) are
    /// expected to have already checked this before calling.
    pub fn link_move(&mut self, a: NodeId, b: NodeId) {
        debug_assert!(a != b, "a node cannot be a move partner of itself");
        let a_left_only = matches!(self.get(a).category, FileContentCategory::LeftOnly);
        let b_left_only = matches!(self.get(b).category, FileContentCategory::LeftOnly);
        debug_assert!(
            a_left_only != b_left_only,
            "move partners must be on opposite sides"
        );
        self.get_mut(a).move_ref = Some(b);
        self.get_mut(b).move_ref = Some(a);
    }

    /// Checks invariant (c) for every linked pair currently in the tree;
    /// used by tests and by the direction engine's self-checks after move
    /// detection.
    pub fn move_refs_are_mutual(&self) -> bool {
        self.nodes.iter().enumerate().all(|(i, node)| match node.move_ref {
            None => true,
            Some(other) => self.nodes[other.0].move_ref == Some(NodeId(i)),
        })
    }
}

/// Whether a configured base folder currently exists, is missing, or could
/// not even be checked.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BaseFolderStatus {
    /// The folder exists and was scanned.
    Existing,
    /// The folder does not exist (first run, or deleted externally).
    NotExisting,
    /// The existence check itself failed (e.g. timed out per §5).
    Failure,
}

/// The root of a comparison tree for one user-configured folder pair.
pub struct BaseFolderPair {
    /// Left base folder.
    pub left_path: AbstractPath,
    /// Right base folder.
    pub right_path: AbstractPath,
    /// Left base folder status.
    pub left_status: BaseFolderStatus,
    /// Right base folder status.
    pub right_status: BaseFolderStatus,
    /// Hard filter applied during scanning.
    pub filter: HardFilter,
    /// Compare variant in effect for this pair.
    pub variant: CompareVariant,
    /// Mod-time tolerance, in seconds (2 by default, for FAT32).
    pub tolerance_secs: i64,
    /// Mod-times offset by exactly one of these many seconds are also
    /// treated as equal (daylight-saving / time-zone shifts the user has
    /// chosen to ignore).
    pub ignored_time_shifts: Vec<i64>,
    /// The comparison tree itself.
    pub tree: Tree,
}

impl BaseFolderPair {
    /// A pair with an empty tree, ready for the scanner to populate.
    pub fn new(left_path: AbstractPath, right_path: AbstractPath, variant: CompareVariant) -> Self {
        Self {
            left_path,
            right_path,
            left_status: BaseFolderStatus::NotExisting,
            right_status: BaseFolderStatus::NotExisting,
            filter: HardFilter::pass_all(),
            variant,
            tolerance_secs: 2,
            ignored_time_shifts: Vec::new(),
            tree: Tree::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Device;

    fn leaf(category: FileContentCategory, left_name: &str, right_name: &str) -> PairNode {
        PairNode {
            kind: PairKind::File,
            left_name: left_name.into(),
            right_name: right_name.into(),
            left_attrs: None,
            right_attrs: None,
            category,
            direction: SyncDirection::None,
            active: true,
            move_ref: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn move_refs_stay_mutual() {
        let mut tree = Tree::new();
        let a = tree.insert(leaf(FileContentCategory::LeftOnly, "foo.bin", ""));
        let b = tree.insert(leaf(FileContentCategory::RightOnly, "", "foo.bin"));
        tree.link_move(a, b);

        assert_eq!(tree.get(a).move_ref, Some(b));
        assert_eq!(tree.get(b).move_ref, Some(a));
        assert!(tree.move_refs_are_mutual());
    }

    #[test]
    fn equal_category_node_has_no_direction_by_default() {
        let node = leaf(FileContentCategory::Equal, "a.txt", "a.txt");
        assert_eq!(node.direction, SyncDirection::None);
    }

    #[test]
    fn base_folder_pair_starts_with_empty_tree() {
        let dev = Device::new("local");
        let pair = BaseFolderPair::new(
            AbstractPath::root(dev.clone()),
            AbstractPath::root(dev),
            CompareVariant::ByTimeAndSize,
        );
        assert!(pair.tree.is_empty());
        assert_eq!(pair.tolerance_secs, 2);
    }
}
