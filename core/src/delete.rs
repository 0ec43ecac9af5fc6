//! Deletion Handler: permanent, recycler, and versioning deletion
//! strategies, selected per base folder, per §4.7.
//!
//! Grounded in artid's own deletion-adjacent logic for superseded backup
//! versions, and in its `EnvPath`-based versioning folder
//! (`examples/gabo01-artid/src/crates/env_path`), generalized here from "one
//! fixed naming style" to the three interchangeable styles the
//! specification names.

use chrono::{DateTime, Utc};
use log::warn;

use crate::afs::{AbstractFs, AfsError, ByteProgress, RecycleSession};
use crate::direction::RESERVED_TEMP_EXTENSION;
use crate::path::AbstractPath;

/// How the Deletion Handler disposes of an item scheduled for removal.
#[derive(Clone, Debug)]
pub enum DeletionPolicy {
    /// Route through `remove-file-plain` / `remove-folder-recursion`.
    Permanent,
    /// Defer to a recycle session; falls back to `Permanent` with a
    /// warning if the backend has none.
    Recycler,
    /// Move into a versioning folder under one of three naming styles.
    Versioning {
        /// Root of the versioning folder, on the same backend as the item.
        folder: AbstractPath,
        /// Naming style applied within the versioning folder.
        style: VersioningStyle,
    },
}

/// Naming style for items moved into a versioning folder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VersioningStyle {
    /// Overwrite any existing version at the same relative path.
    Replace,
    /// Append a timestamp to the base folder's own name.
    TimestampFolder,
    /// Append a timestamp before the item's extension.
    TimestampFile,
}

/// A warning surfaced at plan time rather than failing the run outright —
/// currently only "recycler unavailable, falling back to permanent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanWarning(pub String);

/// Resolves the effective policy for a base folder, downgrading
/// `Recycler` to `Permanent` (with a warning) when the backend cannot
/// support it, per testable scenario S6.
pub fn resolve_policy(fs: &dyn AbstractFs, requested: DeletionPolicy) -> (DeletionPolicy, Option<PlanWarning>) {
    match requested {
        DeletionPolicy::Recycler if !fs.supports_recycle_bin() => {
            warn!("recycle bin not supported by this backend; falling back to permanent deletion");
            (
                DeletionPolicy::Permanent,
                Some(PlanWarning(
                    "recycle bin not supported by this backend; falling back to permanent deletion".into(),
                )),
            )
        }
        other => (other, None),
    }
}

/// Executes one deletion according to `policy`. Items whose name carries
/// the reserved temp-file extension are always routed to permanent
/// deletion regardless of the configured policy.
pub struct Deleter<'a> {
    fs: &'a dyn AbstractFs,
    recycle_session: Option<&'a mut dyn RecycleSession>,
}

impl<'a> Deleter<'a> {
    /// Builds a deleter over `fs`, with an already-opened recycle session
    /// if the policy requires one.
    pub fn new(fs: &'a dyn AbstractFs, recycle_session: Option<&'a mut dyn RecycleSession>) -> Self {
        Self { fs, recycle_session }
    }

    /// Deletes a single file or symlink at `path`, of `size` bytes (used
    /// only for versioning's relative-path-preserving copy).
    pub fn delete_file(&mut self, path: &AbstractPath, policy: &DeletionPolicy, now: DateTime<Utc>) -> Result<(), AfsError> {
        if is_reserved_temp(path) {
            return self.fs.remove_file_plain(path);
        }
        match policy {
            DeletionPolicy::Permanent => self.fs.remove_file_plain(path),
            DeletionPolicy::Recycler => match self.recycle_session.as_deref_mut() {
                Some(session) => session.recycle(path),
                None => self.fs.remove_file_plain(path),
            },
            DeletionPolicy::Versioning { folder, style } => self.version_file(path, folder, *style, now),
        }
    }

    /// Deletes a folder and everything under it, per `policy`. Versioning
    /// walks one level and recurses, per §4.7; permanent/recycler delete
    /// the whole subtree in one call.
    pub fn delete_folder(&mut self, path: &AbstractPath, policy: &DeletionPolicy, now: DateTime<Utc>) -> Result<(), AfsError> {
        match policy {
            DeletionPolicy::Permanent => self.fs.remove_folder_recursion(path),
            DeletionPolicy::Recycler => match self.recycle_session.as_deref_mut() {
                Some(session) => session.recycle(path),
                None => self.fs.remove_folder_recursion(path),
            },
            DeletionPolicy::Versioning { folder, style } => {
                for entry in self.fs.traverse_folder(path)? {
                    match entry.item_type {
                        crate::path::ItemType::Folder => {
                            self.delete_folder(&entry.path, policy, now)?;
                        }
                        _ => {
                            self.version_file(&entry.path, folder, *style, now)?;
                        }
                    }
                }
                self.fs.remove_folder_recursion(path)
            }
        }
    }

    fn version_file(&mut self, path: &AbstractPath, versioning_folder: &AbstractPath, style: VersioningStyle, now: DateTime<Utc>) -> Result<(), AfsError> {
        let target = versioned_target(path, versioning_folder, style, now);
        if let Some(parent) = target.parent() {
            let _ = self.fs.create_folder_plain(&parent);
        }

        match self.fs.rename_item(path, &target) {
            Ok(()) => Ok(()),
            Err(AfsError::RenameUnsupported { .. }) => {
                let attrs = self.fs.attributes(path)?;
                struct NoProgress;
                impl ByteProgress for NoProgress {
                    fn on_bytes(&mut self, _transferred: u64) -> Result<(), AfsError> {
                        Ok(())
                    }
                }
                self.fs.copy_file_transactional(path, &attrs, &target, true, true, &mut || Ok(()), &mut NoProgress)?;
                self.fs.remove_file_plain(path)
            }
            Err(other) => Err(other),
        }
    }
}

fn is_reserved_temp(path: &AbstractPath) -> bool {
    path.name()
        .map(|n| n.to_string_lossy().ends_with(&format!(".{RESERVED_TEMP_EXTENSION}")))
        .unwrap_or(false)
}

fn versioned_target(path: &AbstractPath, versioning_folder: &AbstractPath, style: VersioningStyle, now: DateTime<Utc>) -> AbstractPath {
    let relative = path.relative();
    match style {
        VersioningStyle::Replace => versioning_folder.join(relative),
        VersioningStyle::TimestampFolder => {
            let stamp = now.format("%Y-%m-%d %H%M%S").to_string();
            let name = versioning_folder
                .name()
                .map(|n| format!("{} {stamp}", n.to_string_lossy()))
                .unwrap_or(stamp);
            let stamped_root = versioning_folder
                .parent()
                .map(|p| p.join(name.clone()))
                .unwrap_or_else(|| versioning_folder.join(name));
            stamped_root.join(relative)
        }
        VersioningStyle::TimestampFile => {
            let stamp = now.format("%Y-%m-%d %H%M%S").to_string();
            let name = relative.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let (stem, ext) = match name.rsplit_once('.') {
                Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
                None => (name, String::new()),
            };
            let stamped_name = format!("{stem} {stamp}{ext}");
            match relative.parent() {
                Some(parent) => versioning_folder.join(parent).join(stamped_name),
                None => versioning_folder.join(stamped_name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afs::MemoryFs;
    use crate::path::Device;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_000_000, 0).unwrap()
    }

    #[test]
    fn reserved_temp_files_always_delete_permanently() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let path = AbstractPath::root(dev.clone()).join("stale.ffs_tmp");
        fs.seed_file(&path, vec![1], 0);

        let mut deleter = Deleter::new(&fs, None);
        let versioning = DeletionPolicy::Versioning {
            folder: AbstractPath::root(dev).join("_versions"),
            style: VersioningStyle::Replace,
        };
        deleter.delete_file(&path, &versioning, epoch()).unwrap();
        assert!(!fs.item_exists(&path).unwrap());
    }

    #[test]
    fn recycler_unavailable_falls_back_to_permanent_with_warning() {
        let fs = MemoryFs::new();
        let (policy, warning) = resolve_policy(&fs, DeletionPolicy::Recycler);
        assert!(matches!(policy, DeletionPolicy::Permanent));
        assert!(warning.is_some());
    }

    #[test]
    fn versioning_replace_moves_item_under_versioning_root() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let root = AbstractPath::root(dev.clone());
        let path = root.join("docs").join("a.txt");
        fs.create_folder_plain(&root.join("docs")).unwrap();
        fs.seed_file(&path, vec![1, 2], 0);

        let mut deleter = Deleter::new(&fs, None);
        let policy = DeletionPolicy::Versioning {
            folder: root.join("_versions"),
            style: VersioningStyle::Replace,
        };
        deleter.delete_file(&path, &policy, epoch()).unwrap();

        assert!(!fs.item_exists(&path).unwrap());
        assert!(fs.item_exists(&root.join("_versions").join("docs").join("a.txt")).unwrap());
    }
}
