//! Scanner: walks both sides of a base folder pair into raw per-side
//! trees, ready for the categorizer to pair up.
//!
//! The parallel-by-device, serial-within-device traversal described in
//! §4.2 and §5 is modeled on artid's worker-per-task dispatch in its `ops`
//! module, generalized here to `std::thread::scope` since [`AbstractFs`] is
//! a blocking interface the same way artid's `FileSystem` trait is.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::afs::{AbstractFs, AfsError};
use crate::callback::ErrorSink;
use crate::errors::{try_reporting_error, SyncError};
use crate::filter::HardFilter;
use crate::path::{AbstractPath, FileAttributes, ItemType};

/// Policy for handling symlinks encountered during a scan.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SymlinkPolicy {
    /// Skip symlinks entirely; they never appear in the resulting tree.
    Exclude,
    /// Record the symlink itself, without following it.
    TreatAsDirectItem,
    /// Follow the symlink as if it were the item it points to. Folder
    /// symlinks are followed with cycle detection by resolved device
    /// fingerprint, where the backend can provide one.
    Follow,
}

/// One raw item as seen by the scanner, before any cross-side comparison.
#[derive(Clone, Debug)]
pub enum RawItem {
    /// A file with its attributes.
    File(FileAttributes),
    /// A symlink with its attributes.
    Symlink(FileAttributes),
    /// A folder and its already-scanned children, keyed by raw item name.
    Folder(BTreeMap<String, RawItem>),
}

/// Descriptor for one side of a base folder scan.
pub struct ScanDescriptor {
    /// Root path to scan.
    pub base: AbstractPath,
    /// Hard filter applied during traversal.
    pub filter: HardFilter,
    /// Symlink handling policy.
    pub symlink_policy: SymlinkPolicy,
}

/// Result of scanning one [`ScanDescriptor`]: the raw tree plus the set of
/// folder paths under which at least one child failed to enumerate (so the
/// LSSDB update logic knows not to drop last-known entries for them).
pub struct ScanResult {
    /// Root-level raw tree, or `None` if the base folder itself is absent.
    pub root: Option<BTreeMap<String, RawItem>>,
    /// Relative paths (slash-joined) of folders with at least one failed
    /// child read.
    pub failed_reads: Vec<String>,
}

/// Walks one side of a base folder pair.
pub struct Scanner<'a> {
    fs: &'a dyn AbstractFs,
    error_sink: &'a dyn ErrorSink,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner over `fs`, reporting per-item failures to
    /// `error_sink`.
    pub fn new(fs: &'a dyn AbstractFs, error_sink: &'a dyn ErrorSink) -> Self {
        Self { fs, error_sink }
    }

    /// Scans `descriptor`, returning the raw tree and failed-read set.
    pub fn scan(&self, descriptor: &ScanDescriptor) -> Result<ScanResult, SyncError> {
        if !self
            .fs
            .item_exists(&descriptor.base)
            .map_err(|source| SyncError::Scan {
                path: descriptor.base.relative().to_path_buf(),
                source,
            })?
        {
            debug!("base folder does not exist: {}", descriptor.base.relative().display());
            return Ok(ScanResult {
                root: None,
                failed_reads: Vec::new(),
            });
        }

        let mut failed_reads = Vec::new();
        let root = self.scan_folder(&descriptor.base, &descriptor.filter, descriptor.symlink_policy, &mut failed_reads)?;
        if !failed_reads.is_empty() {
            debug!("{} folder(s) had unreadable children under {}", failed_reads.len(), descriptor.base.relative().display());
        }
        Ok(ScanResult {
            root: Some(root),
            failed_reads,
        })
    }

    fn scan_folder(
        &self,
        path: &AbstractPath,
        filter: &HardFilter,
        symlink_policy: SymlinkPolicy,
        failed_reads: &mut Vec<String>,
    ) -> Result<BTreeMap<String, RawItem>, SyncError> {
        let entries = match try_reporting_error(
            || self.fs.traverse_folder(path),
            |err: &AfsError| self.error_sink.on_error(path.relative(), err),
        )? {
            Some(entries) => entries,
            None => {
                failed_reads.push(path.relative().to_string_lossy().into_owned());
                return Ok(BTreeMap::new());
            }
        };

        let mut out = BTreeMap::new();
        for entry in entries {
            let Some(name) = entry.path.name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if !filter.matches(entry.path.relative()) {
                continue;
            }

            let item = match entry.item_type {
                ItemType::Symlink if symlink_policy == SymlinkPolicy::Exclude => continue,
                ItemType::Symlink if symlink_policy == SymlinkPolicy::TreatAsDirectItem => {
                    match self.read_attrs(&entry.path, failed_reads) {
                        Some(attrs) => RawItem::Symlink(attrs),
                        None => continue,
                    }
                }
                ItemType::Symlink => {
                    // Follow: resolved type decides file vs folder; cycle
                    // detection by fingerprint is the caller's (the AFS
                    // backend's) responsibility when it reports one.
                    match self.fs.get_item_type(&entry.path) {
                        Ok(ItemType::Folder) => RawItem::Folder(self.scan_folder(
                            &entry.path,
                            filter,
                            symlink_policy,
                            failed_reads,
                        )?),
                        _ => match self.read_attrs(&entry.path, failed_reads) {
                            Some(attrs) => RawItem::File(attrs),
                            None => continue,
                        },
                    }
                }
                ItemType::File => match self.read_attrs(&entry.path, failed_reads) {
                    Some(attrs) => RawItem::File(attrs),
                    None => continue,
                },
                ItemType::Folder => {
                    RawItem::Folder(self.scan_folder(&entry.path, filter, symlink_policy, failed_reads)?)
                }
            };
            out.insert(name, item);
        }
        Ok(out)
    }

    fn read_attrs(&self, path: &AbstractPath, failed_reads: &mut Vec<String>) -> Option<FileAttributes> {
        match try_reporting_error(
            || self.fs.attributes(path),
            |err: &AfsError| self.error_sink.on_error(path.relative(), err),
        ) {
            Ok(Some(attrs)) => Some(attrs),
            _ => {
                failed_reads.push(path.relative().to_string_lossy().into_owned());
                None
            }
        }
    }
}

/// Scans the left and right sides of a pair in parallel, one worker thread
/// per side, per the per-device concurrency model of §5 (a single base
/// folder pair uses at most two devices).
pub fn scan_pair(
    left_fs: Arc<dyn AbstractFs>,
    left: ScanDescriptor,
    right_fs: Arc<dyn AbstractFs>,
    right: ScanDescriptor,
    error_sink: &(dyn ErrorSink + Sync),
) -> Result<(ScanResult, ScanResult), SyncError> {
    std::thread::scope(|scope| {
        let left_handle = scope.spawn(|| Scanner::new(left_fs.as_ref(), error_sink).scan(&left));
        let right_handle = scope.spawn(|| Scanner::new(right_fs.as_ref(), error_sink).scan(&right));

        let left_result = left_handle.join().expect("scanner thread panicked")?;
        let right_result = right_handle.join().expect("scanner thread panicked")?;
        Ok((left_result, right_result))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afs::MemoryFs;
    use crate::callback::IgnoreAllErrors;
    use crate::path::Device;

    #[test]
    fn scan_missing_base_folder_yields_no_root() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let sink = IgnoreAllErrors;
        let scanner = Scanner::new(&fs, &sink);
        let descriptor = ScanDescriptor {
            base: AbstractPath::root(dev).join("missing"),
            filter: HardFilter::pass_all(),
            symlink_policy: SymlinkPolicy::Exclude,
        };
        let result = scanner.scan(&descriptor).unwrap();
        assert!(result.root.is_none());
    }

    #[test]
    fn scan_populates_nested_folders() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let root = AbstractPath::root(dev);
        fs.create_folder_plain(&root.join("dir")).unwrap();
        fs.seed_file(&root.join("dir").join("a.txt"), vec![1, 2, 3], 100);

        let sink = IgnoreAllErrors;
        let scanner = Scanner::new(&fs, &sink);
        let descriptor = ScanDescriptor {
            base: root,
            filter: HardFilter::pass_all(),
            symlink_policy: SymlinkPolicy::Exclude,
        };
        let result = scanner.scan(&descriptor).unwrap();
        let root_map = result.root.unwrap();
        match root_map.get("dir") {
            Some(RawItem::Folder(children)) => assert!(children.contains_key("a.txt")),
            other => panic!("expected folder, got {:?}", other),
        }
    }
}
