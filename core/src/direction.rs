//! Direction Engine: decides, for each non-equal pair, which side should
//! win — or whether the pair is a conflict — per §4.4.
//!
//! No teacher module attempts two-way reconciliation (artid's sync was a
//! one-directional "copy source into a dated backup folder" operation), so
//! the branching here follows the specification's prose directly. The
//! reserved-temp-extension special rule and the six-field `DirectionSet`
//! for one-way/custom modes are both named explicitly in §4.4.

use std::collections::HashMap;

use crate::lssdb::{CompareVariant, Descriptor, SyncFolder};
use crate::model::{FileContentCategory, NodeId, SyncDirection, Tree};

/// The reserved extension marking an aborted-run temp file, always
/// scheduled for deletion on whichever side it is left-only/right-only on,
/// per §4.4's "Special rule" and testable property 8.
pub const RESERVED_TEMP_EXTENSION: &str = "ffs_tmp";

/// User-chosen reconciliation mode.
#[derive(Clone, Debug)]
pub enum SyncMode {
    /// Reconcile using the last-synchronous-state database.
    TwoWay,
    /// Apply a fixed direction per category.
    OneWay(DirectionSet),
}

/// Six-field per-category direction policy used by one-way/custom modes.
#[derive(Copy, Clone, Debug)]
pub struct DirectionSet {
    /// Direction for items that exist only on the left.
    pub ex_left_only: SyncDirection,
    /// Direction for items that exist only on the right.
    pub ex_right_only: SyncDirection,
    /// Direction when the left side is newer (by-time-size variant).
    pub left_newer: SyncDirection,
    /// Direction when the right side is newer.
    pub right_newer: SyncDirection,
    /// Direction for `different` under non-time variants.
    pub different: SyncDirection,
    /// Direction for unresolved conflicts (usually `None`).
    pub conflict: SyncDirection,
}

impl DirectionSet {
    /// Mirror mode: left is always authoritative.
    pub fn mirror_left_to_right() -> Self {
        Self {
            ex_left_only: SyncDirection::Right,
            ex_right_only: SyncDirection::Right,
            left_newer: SyncDirection::Right,
            right_newer: SyncDirection::Right,
            different: SyncDirection::Right,
            conflict: SyncDirection::None,
        }
    }

    /// Update mode: only ever adds/changes files on the right, never
    /// deletes anything there.
    pub fn update_right_only() -> Self {
        Self {
            ex_left_only: SyncDirection::Right,
            ex_right_only: SyncDirection::None,
            left_newer: SyncDirection::Right,
            right_newer: SyncDirection::None,
            different: SyncDirection::Right,
            conflict: SyncDirection::None,
        }
    }
}

/// Runs direction resolution over every node in `tree`, in place.
pub struct DirectionEngine<'a> {
    mode: &'a SyncMode,
    lssdb: Option<&'a SyncFolder>,
    tolerance_secs: i64,
}

impl<'a> DirectionEngine<'a> {
    /// Builds an engine for `mode`, optionally backed by `lssdb` (absent
    /// on first run).
    pub fn new(mode: &'a SyncMode, lssdb: Option<&'a SyncFolder>, tolerance_secs: i64) -> Self {
        Self {
            mode,
            lssdb,
            tolerance_secs,
        }
    }

    /// Assigns a [`SyncDirection`] to every node reachable from `roots`,
    /// recursing into folders. Nodes already `Equal` are left at
    /// `SyncDirection::None` (invariant d).
    pub fn resolve(&self, tree: &mut Tree, roots: &[NodeId]) {
        for &id in roots {
            self.resolve_node(tree, id);
        }
    }

    fn resolve_node(&self, tree: &mut Tree, id: NodeId) {
        let children = tree.get(id).children.clone();
        for child in &children {
            self.resolve_node(tree, *child);
        }

        let node = tree.get(id);
        if node.category.is_equal() {
            tree.get_mut(id).direction = SyncDirection::None;
            return;
        }

        if self.is_reserved_temp_left_only(tree, id) {
            tree.get_mut(id).direction = SyncDirection::Left;
            return;
        }
        if self.is_reserved_temp_right_only(tree, id) {
            tree.get_mut(id).direction = SyncDirection::Right;
            return;
        }

        let direction = match self.mode {
            SyncMode::OneWay(set) => self.direction_from_set(tree.get(id), set),
            SyncMode::TwoWay => self.direction_two_way(tree.get(id)),
        };
        tree.get_mut(id).direction = direction;
    }

    fn is_reserved_temp_left_only(&self, tree: &Tree, id: NodeId) -> bool {
        let node = tree.get(id);
        matches!(node.category, FileContentCategory::LeftOnly) && node.left_name.ends_with(&format!(".{RESERVED_TEMP_EXTENSION}"))
    }

    fn is_reserved_temp_right_only(&self, tree: &Tree, id: NodeId) -> bool {
        let node = tree.get(id);
        matches!(node.category, FileContentCategory::RightOnly) && node.right_name.ends_with(&format!(".{RESERVED_TEMP_EXTENSION}"))
    }

    fn direction_from_set(&self, node: &crate::model::PairNode, set: &DirectionSet) -> SyncDirection {
        match &node.category {
            FileContentCategory::LeftOnly => set.ex_left_only,
            FileContentCategory::RightOnly => set.ex_right_only,
            FileContentCategory::Different | FileContentCategory::SameDateDiffSize => {
                match (node.left_attrs, node.right_attrs) {
                    (Some(l), Some(r)) if l.mod_time > r.mod_time => set.left_newer,
                    (Some(l), Some(r)) if r.mod_time > l.mod_time => set.right_newer,
                    _ => set.different,
                }
            }
            FileContentCategory::Conflict(_) | FileContentCategory::InvalidTime => set.conflict,
            FileContentCategory::Equal | FileContentCategory::EqualAttributesOnly => SyncDirection::None,
        }
    }

    fn direction_two_way(&self, node: &crate::model::PairNode) -> SyncDirection {
        let Some(lssdb_entry) = self.lssdb.as_ref().and_then(|_| self.find_entry(node)) else {
            // No LSSDB entry: fall back to "newer wins" for content-bearing
            // variants, left-only/right-only still mirror across.
            return match &node.category {
                FileContentCategory::LeftOnly => SyncDirection::Right,
                FileContentCategory::RightOnly => SyncDirection::Left,
                FileContentCategory::Different | FileContentCategory::SameDateDiffSize => {
                    match (node.left_attrs, node.right_attrs) {
                        (Some(l), Some(r)) if l.mod_time > r.mod_time => SyncDirection::Right,
                        (Some(l), Some(r)) if r.mod_time > l.mod_time => SyncDirection::Left,
                        _ => SyncDirection::None,
                    }
                }
                _ => SyncDirection::None,
            };
        };

        if !self.entry_in_sync_under_current_settings(&lssdb_entry) {
            return SyncDirection::None; // conflict: "database entry not in sync"
        }

        let left_changed = node
            .left_attrs
            .map(|a| !self.descriptor_matches(a, lssdb_entry.left))
            .unwrap_or(true);
        let right_changed = node
            .right_attrs
            .map(|a| !self.descriptor_matches(a, lssdb_entry.right))
            .unwrap_or(true);

        match (left_changed, right_changed) {
            (false, false) => SyncDirection::None, // impossible-but-observed conflict
            (true, false) => SyncDirection::Right,
            (false, true) => SyncDirection::Left,
            (true, true) => SyncDirection::None, // conflict
        }
    }

    fn find_entry(&self, node: &crate::model::PairNode) -> Option<Descriptor2> {
        let lssdb = self.lssdb?;
        let name = if !node.left_name.is_empty() { &node.left_name } else { &node.right_name };
        lssdb
            .files
            .iter()
            .find(|f| &f.name == name)
            .map(|f| Descriptor2 {
                left: f.left,
                right: f.right,
                variant: f.variant,
            })
    }

    fn entry_in_sync_under_current_settings(&self, entry: &Descriptor2) -> bool {
        let delta = (entry.left.mod_time - entry.right.mod_time).abs();
        entry.left.size == entry.right.size && delta <= self.tolerance_secs
    }

    fn descriptor_matches(&self, attrs: crate::path::FileAttributes, descriptor: Descriptor) -> bool {
        attrs.size == descriptor.size && (attrs.mod_time - descriptor.mod_time).abs() <= self.tolerance_secs
    }
}

struct Descriptor2 {
    left: Descriptor,
    right: Descriptor,
    #[allow(dead_code)]
    variant: CompareVariant,
}

/// Index entry used by move detection: where a uniquely-identified item
/// currently sits in the tree (by fingerprint, or by its old LSSDB-era
/// size/mod-time when the fingerprint is unknown).
enum FingerprintSlot {
    Unique(NodeId),
    Poisoned,
}

/// One side's move-detection indices: nodes still sitting at their old
/// LSSDB path (the "stationary" side of a move never needs more than
/// this), plus fallback indices for the side that actually moved, which no
/// longer carries the LSSDB name. A moved node is found by fingerprint
/// when the backend can produce one, or, per scenario S4, by the
/// size/mod-time pair the LSSDB recorded for it when the fingerprint is
/// `0` ("unknown") — poisoned on duplicates exactly like the fingerprint
/// index, so two unrelated same-size/same-time one-sided items never get
/// paired by guesswork.
#[derive(Default)]
struct SideIndex {
    by_name: HashMap<String, NodeId>,
    by_fingerprint: HashMap<u64, FingerprintSlot>,
    by_attrs: HashMap<(i64, u64), FingerprintSlot>,
}

impl SideIndex {
    fn candidate(&self, name: &str, fingerprint: u64, mod_time: i64, size: u64) -> Option<NodeId> {
        self.by_name
            .get(name)
            .copied()
            .or_else(|| fingerprint_candidate(&self.by_fingerprint, fingerprint))
            .or_else(|| attrs_candidate(&self.by_attrs, (mod_time, size)))
    }
}

/// Detects moves across `left_only` and `right_only` nodes against the
/// LSSDB, per §4.4 step 1-3. Only runs when a previous LSSDB is available.
/// Returns the number of move pairs linked.
pub fn detect_moves(tree: &mut Tree, roots: &[NodeId], lssdb: &SyncFolder, tolerance_secs: i64) -> usize {
    let mut left = SideIndex::default();
    let mut right = SideIndex::default();
    collect_indices(tree, roots, &mut left, &mut right);

    let mut linked = 0;
    let mut already_linked: std::collections::HashSet<NodeId> = std::collections::HashSet::new();

    for entry in &lssdb.files {
        if (entry.left.mod_time - entry.right.mod_time).abs() > tolerance_secs || entry.left.size != entry.right.size {
            continue; // not "still in sync" per current settings
        }

        // Either side may be the one that moved: whichever node still sits
        // under the LSSDB name is the stationary side, and the opposite
        // one-sided node — found by fingerprint or by matching attrs, never
        // by name — is the side that moved.
        let left_candidate = left.candidate(&entry.name, entry.left.fingerprint, entry.left.mod_time, entry.left.size);
        let right_candidate = right.candidate(&entry.name, entry.right.fingerprint, entry.right.mod_time, entry.right.size);

        let (Some(left_id), Some(right_id)) = (left_candidate, right_candidate) else {
            continue;
        };
        if already_linked.contains(&left_id) || already_linked.contains(&right_id) {
            continue;
        }

        let left_node = tree.get(left_id);
        let right_node = tree.get(right_id);
        if !size_and_time_match(left_node, &entry.left, tolerance_secs) || !size_and_time_match(right_node, &entry.right, tolerance_secs) {
            continue;
        }

        tree.link_move(left_id, right_id);
        already_linked.insert(left_id);
        already_linked.insert(right_id);
        linked += 1;
    }

    linked
}

fn size_and_time_match(node: &crate::model::PairNode, descriptor: &Descriptor, tolerance_secs: i64) -> bool {
    let attrs = node.left_attrs.or(node.right_attrs);
    match attrs {
        Some(a) => a.size == descriptor.size && (a.mod_time - descriptor.mod_time).abs() <= tolerance_secs,
        None => false,
    }
}

fn fingerprint_candidate(index: &HashMap<u64, FingerprintSlot>, fingerprint: u64) -> Option<NodeId> {
    if fingerprint == 0 {
        return None;
    }
    match index.get(&fingerprint) {
        Some(FingerprintSlot::Unique(id)) => Some(*id),
        _ => None,
    }
}

fn attrs_candidate(index: &HashMap<(i64, u64), FingerprintSlot>, key: (i64, u64)) -> Option<NodeId> {
    match index.get(&key) {
        Some(FingerprintSlot::Unique(id)) => Some(*id),
        _ => None,
    }
}

fn collect_indices(tree: &Tree, ids: &[NodeId], left: &mut SideIndex, right: &mut SideIndex) {
    for &id in ids {
        let node = tree.get(id);
        match node.category {
            FileContentCategory::LeftOnly => {
                left.by_name.insert(node.left_name.clone(), id);
                if let Some(attrs) = node.left_attrs {
                    if !attrs.fingerprint_unknown() {
                        insert_slot(&mut left.by_fingerprint, attrs.fingerprint, id);
                    }
                    insert_slot(&mut left.by_attrs, (attrs.mod_time, attrs.size), id);
                }
            }
            FileContentCategory::RightOnly => {
                right.by_name.insert(node.right_name.clone(), id);
                if let Some(attrs) = node.right_attrs {
                    if !attrs.fingerprint_unknown() {
                        insert_slot(&mut right.by_fingerprint, attrs.fingerprint, id);
                    }
                    insert_slot(&mut right.by_attrs, (attrs.mod_time, attrs.size), id);
                }
            }
            _ => {}
        }
        if !node.children.is_empty() {
            collect_indices(tree, &node.children, left, right);
        }
    }
}

fn insert_slot<K: Eq + std::hash::Hash>(index: &mut HashMap<K, FingerprintSlot>, key: K, id: NodeId) {
    index
        .entry(key)
        .and_modify(|slot| *slot = FingerprintSlot::Poisoned)
        .or_insert(FingerprintSlot::Unique(id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lssdb::FileEntry;
    use crate::model::PairKind;
    use crate::path::FileAttributes;

    fn leaf(category: FileContentCategory, left_name: &str, right_name: &str, left_attrs: Option<FileAttributes>, right_attrs: Option<FileAttributes>) -> crate::model::PairNode {
        crate::model::PairNode {
            kind: PairKind::File,
            left_name: left_name.into(),
            right_name: right_name.into(),
            left_attrs,
            right_attrs,
            category,
            direction: SyncDirection::None,
            active: true,
            move_ref: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn reserved_temp_extension_always_deletes_left() {
        let mut tree = Tree::new();
        let id = tree.insert(leaf(
            FileContentCategory::LeftOnly,
            "stale.ffs_tmp",
            "",
            Some(FileAttributes::new(0, 0)),
            None,
        ));
        let mode = SyncMode::OneWay(DirectionSet::mirror_left_to_right());
        let engine = DirectionEngine::new(&mode, None, 2);
        engine.resolve(&mut tree, &[id]);
        assert_eq!(tree.get(id).direction, SyncDirection::Left);
    }

    #[test]
    fn two_way_propagates_single_side_change() {
        let mut tree = Tree::new();
        let id = tree.insert(leaf(
            FileContentCategory::Different,
            "a.txt",
            "a.txt",
            Some(FileAttributes::new(1100, 11)),
            Some(FileAttributes::new(1000, 10)),
        ));
        let lssdb = SyncFolder {
            files: vec![FileEntry {
                name: "a.txt".into(),
                variant: CompareVariant::ByTimeAndSize,
                left: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
                right: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
            }],
            symlinks: vec![],
            folders: vec![],
        };
        let mode = SyncMode::TwoWay;
        let engine = DirectionEngine::new(&mode, Some(&lssdb), 2);
        engine.resolve(&mut tree, &[id]);
        assert_eq!(tree.get(id).direction, SyncDirection::Right);
    }

    #[test]
    fn two_way_both_changed_is_conflict() {
        let mut tree = Tree::new();
        let id = tree.insert(leaf(
            FileContentCategory::Different,
            "a.txt",
            "a.txt",
            Some(FileAttributes::new(1100, 12)),
            Some(FileAttributes::new(1050, 13)),
        ));
        let lssdb = SyncFolder {
            files: vec![FileEntry {
                name: "a.txt".into(),
                variant: CompareVariant::ByTimeAndSize,
                left: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
                right: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
            }],
            symlinks: vec![],
            folders: vec![],
        };
        let mode = SyncMode::TwoWay;
        let engine = DirectionEngine::new(&mode, Some(&lssdb), 2);
        engine.resolve(&mut tree, &[id]);
        assert_eq!(tree.get(id).direction, SyncDirection::None);
    }

    #[test]
    fn detects_a_simple_move() {
        let mut tree = Tree::new();
        let left_gone = tree.insert(leaf(
            FileContentCategory::LeftOnly,
            "dir/foo.bin",
            "",
            Some(FileAttributes::new(1000, 10)),
            None,
        ));
        let right_new = tree.insert(leaf(
            FileContentCategory::RightOnly,
            "",
            "other/foo.bin",
            None,
            Some(FileAttributes::new(1000, 10)),
        ));
        tree.get_mut(left_gone).left_name = "dir/foo.bin".into();
        tree.get_mut(right_new).right_name = "other/foo.bin".into();

        let lssdb = SyncFolder {
            files: vec![FileEntry {
                name: "dir/foo.bin".into(),
                variant: CompareVariant::ByTimeAndSize,
                left: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
                right: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
            }],
            symlinks: vec![],
            folders: vec![],
        };

        let linked = detect_moves(&mut tree, &[left_gone, right_new], &lssdb, 2);
        assert_eq!(linked, 1);
        assert_eq!(tree.get(left_gone).move_ref, Some(right_new));
        assert_eq!(tree.get(right_new).move_ref, Some(left_gone));
    }

    #[test]
    fn duplicate_fingerprints_are_poisoned_not_paired() {
        let mut tree = Tree::new();
        let a = tree.insert(leaf(FileContentCategory::LeftOnly, "x", "", None, None));
        let b = tree.insert(leaf(FileContentCategory::LeftOnly, "y", "", None, None));

        let mut index = HashMap::new();
        insert_slot(&mut index, 42, a);
        insert_slot(&mut index, 42, b);
        assert!(fingerprint_candidate(&index, 42).is_none());
    }

    #[test]
    fn unknown_fingerprint_falls_back_to_matching_attrs() {
        let mut tree = Tree::new();
        let left_gone = tree.insert(leaf(
            FileContentCategory::LeftOnly,
            "dir/foo.bin",
            "",
            Some(FileAttributes::new(1000, 10)),
            None,
        ));
        let right_new = tree.insert(leaf(
            FileContentCategory::RightOnly,
            "",
            "other/foo.bin",
            None,
            Some(FileAttributes::new(1000, 10)),
        ));

        let lssdb = SyncFolder {
            files: vec![FileEntry {
                name: "dir/foo.bin".into(),
                variant: CompareVariant::ByTimeAndSize,
                left: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
                right: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
            }],
            symlinks: vec![],
            folders: vec![],
        };

        let linked = detect_moves(&mut tree, &[left_gone, right_new], &lssdb, 2);
        assert_eq!(linked, 1);
        assert_eq!(tree.get(left_gone).move_ref, Some(right_new));
        assert_eq!(tree.get(right_new).move_ref, Some(left_gone));
    }

    #[test]
    fn ambiguous_attrs_match_is_poisoned_not_guessed() {
        let mut tree = Tree::new();
        let left_gone = tree.insert(leaf(
            FileContentCategory::LeftOnly,
            "dir/foo.bin",
            "",
            Some(FileAttributes::new(1000, 10)),
            None,
        ));
        let right_candidate_a = tree.insert(leaf(
            FileContentCategory::RightOnly,
            "",
            "other/foo.bin",
            None,
            Some(FileAttributes::new(1000, 10)),
        ));
        let right_candidate_b = tree.insert(leaf(
            FileContentCategory::RightOnly,
            "",
            "other/bar.bin",
            None,
            Some(FileAttributes::new(1000, 10)),
        ));

        let lssdb = SyncFolder {
            files: vec![FileEntry {
                name: "dir/foo.bin".into(),
                variant: CompareVariant::ByTimeAndSize,
                left: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
                right: Descriptor {
                    mod_time: 1000,
                    size: 10,
                    fingerprint: 0,
                },
            }],
            symlinks: vec![],
            folders: vec![],
        };

        let linked = detect_moves(&mut tree, &[left_gone, right_candidate_a, right_candidate_b], &lssdb, 2);
        assert_eq!(linked, 0);
    }
}
