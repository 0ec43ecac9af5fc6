//! Local filesystem backend.
//!
//! A direct generalization of artid's `Local`
//! (`examples/gabo01-artid/src/core/src/ops/core/filesystem/local.rs`): where
//! the teacher's `Local` forwarded one-to-one to `std::fs` for a single
//! rooted path, this `Local` maps an [`AbstractPath`] to a real filesystem
//! path under a configured root and forwards the same way for the wider
//! [`AbstractFs`] capability set.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::{AbstractFs, AfsError, ByteProgress, CopyOutcome, DirEntry, ReadStream, RecycleSession, WriteStream};
use crate::path::{AbstractPath, FileAttributes, ItemType};

/// Backend rooted at a real directory on the machine's own filesystem.
/// `has_native_transactional_copy` is false: plain `std::fs` offers no
/// rename-on-complete copy primitive, so the executor must stage through a
/// temp file itself, same as every other backend without OS support.
#[derive(Debug, Clone)]
pub struct Local {
    root: PathBuf,
}

impl Local {
    /// Roots a new `Local` backend at `root`. `root` itself is not created;
    /// callers ensure their base folder exists before scanning it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &AbstractPath) -> PathBuf {
        self.root.join(path.relative())
    }

    fn metadata_for(&self, native: &Path, follow: bool) -> io::Result<fs::Metadata> {
        if follow {
            fs::metadata(native)
        } else {
            fs::symlink_metadata(native)
        }
    }
}

fn mod_time_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(-1)
}

#[cfg(unix)]
fn fingerprint_of(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn fingerprint_of(_meta: &fs::Metadata) -> u64 {
    0
}

impl AbstractFs for Local {
    fn get_item_type(&self, path: &AbstractPath) -> Result<ItemType, AfsError> {
        let native = self.resolve(path);
        let meta = self
            .metadata_for(&native, false)
            .map_err(|e| AfsError::from_io(&native, e))?;
        Ok(if meta.file_type().is_symlink() {
            ItemType::Symlink
        } else if meta.is_dir() {
            ItemType::Folder
        } else {
            ItemType::File
        })
    }

    fn item_exists(&self, path: &AbstractPath) -> Result<bool, AfsError> {
        Ok(self.resolve(path).symlink_metadata().is_ok())
    }

    fn attributes(&self, path: &AbstractPath) -> Result<FileAttributes, AfsError> {
        let native = self.resolve(path);
        let meta = self
            .metadata_for(&native, false)
            .map_err(|e| AfsError::from_io(&native, e))?;
        Ok(FileAttributes {
            mod_time: mod_time_secs(&meta),
            size: meta.len(),
            fingerprint: fingerprint_of(&meta),
            is_followed_symlink: false,
        })
    }

    fn read_stream(&self, path: &AbstractPath) -> Result<ReadStream, AfsError> {
        let native = self.resolve(path);
        let file = OpenOptions::new()
            .read(true)
            .open(&native)
            .map_err(|e| AfsError::from_io(&native, e))?;
        Ok(Box::new(file))
    }

    fn write_stream(&self, path: &AbstractPath) -> Result<WriteStream, AfsError> {
        let native = self.resolve(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&native)
            .map_err(|e| AfsError::from_io(&native, e))?;
        Ok(Box::new(file))
    }

    fn create_folder_plain(&self, path: &AbstractPath) -> Result<(), AfsError> {
        let native = self.resolve(path);
        fs::create_dir(&native).map_err(|e| AfsError::from_io(&native, e))
    }

    fn rename_item(&self, from: &AbstractPath, to: &AbstractPath) -> Result<(), AfsError> {
        let (native_from, native_to) = (self.resolve(from), self.resolve(to));
        fs::rename(&native_from, &native_to).map_err(|e| {
            if e.kind() == io::ErrorKind::Other || e.raw_os_error() == Some(libc_exdev()) {
                AfsError::RenameUnsupported {
                    from: native_from.clone(),
                    to: native_to.clone(),
                }
            } else {
                AfsError::from_io(&native_from, e)
            }
        })
    }

    fn remove_file_plain(&self, path: &AbstractPath) -> Result<(), AfsError> {
        let native = self.resolve(path);
        fs::remove_file(&native).map_err(|e| AfsError::from_io(&native, e))
    }

    fn remove_folder_recursion(&self, path: &AbstractPath) -> Result<(), AfsError> {
        let native = self.resolve(path);
        fs::remove_dir_all(&native).map_err(|e| AfsError::from_io(&native, e))
    }

    fn copy_symlink(&self, from: &AbstractPath, to: &AbstractPath) -> Result<(), AfsError> {
        let (native_from, native_to) = (self.resolve(from), self.resolve(to));
        let target = fs::read_link(&native_from).map_err(|e| AfsError::from_io(&native_from, e))?;
        make_symlink(&target, &native_to).map_err(|e| AfsError::from_io(&native_to, e))
    }

    fn traverse_folder(&self, path: &AbstractPath) -> Result<Vec<DirEntry>, AfsError> {
        let native = self.resolve(path);
        let mut out = Vec::new();
        for entry in fs::read_dir(&native).map_err(|e| AfsError::from_io(&native, e))? {
            let entry = entry.map_err(|e| AfsError::from_io(&native, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| AfsError::from_io(entry.path(), e))?;
            let item_type = if file_type.is_symlink() {
                ItemType::Symlink
            } else if file_type.is_dir() {
                ItemType::Folder
            } else {
                ItemType::File
            };
            out.push(DirEntry {
                path: path.join(entry.file_name()),
                item_type,
            });
        }
        Ok(out)
    }

    fn copy_file_transactional(
        &self,
        source: &AbstractPath,
        source_attrs: &FileAttributes,
        target: &AbstractPath,
        copy_permissions: bool,
        transactional: bool,
        pre_delete_target: &mut dyn FnMut() -> Result<(), AfsError>,
        on_bytes: &mut dyn ByteProgress,
    ) -> Result<CopyOutcome, AfsError> {
        let native_source = self.resolve(source);
        let native_target = self.resolve(target);

        let write_to = if transactional {
            sibling_temp_path(&native_target)
        } else {
            native_target.clone()
        };

        let size = stream_copy(&native_source, &write_to, on_bytes)?;

        if copy_permissions {
            if let Ok(meta) = fs::metadata(&native_source) {
                let _ = fs::set_permissions(&write_to, meta.permissions());
            }
        }

        if transactional {
            pre_delete_target()?;
            fs::rename(&write_to, &native_target)
                .map_err(|e| AfsError::from_io(&native_target, e))?;
        }

        let stamp = filetime::FileTime::from_unix_time(source_attrs.mod_time, 0);
        let set_mod_time_failed = filetime::set_file_mtime(&native_target, stamp).is_err();

        let final_meta = fs::metadata(&native_target).map_err(|e| AfsError::from_io(&native_target, e))?;
        let mod_time = mod_time_secs(&final_meta);

        Ok(CopyOutcome {
            size,
            mod_time,
            source_fingerprint: source_attrs.fingerprint,
            target_fingerprint: fingerprint_of(&final_meta),
            set_mod_time_failed,
        })
    }

    fn has_native_transactional_copy(&self) -> bool {
        false
    }

    fn supports_recycle_bin(&self) -> bool {
        false
    }

    fn create_recycle_session(&self) -> Result<Box<dyn RecycleSession>, AfsError> {
        Err(AfsError::RecycleUnsupported)
    }

    fn free_disk_space(&self, path: &AbstractPath) -> Result<Option<u64>, AfsError> {
        let _ = self.resolve(path);
        Ok(None)
    }
}

fn stream_copy(
    source: &Path,
    dest: &Path,
    on_bytes: &mut dyn ByteProgress,
) -> Result<u64, AfsError> {
    use std::io::{Read, Write};

    let mut reader = fs::File::open(source).map_err(|e| AfsError::from_io(source, e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dest)
        .map_err(|e| AfsError::from_io(dest, e))?;

    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).map_err(|e| AfsError::from_io(source, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(|e| AfsError::from_io(dest, e))?;
        total += n as u64;
        on_bytes.on_bytes(total)?;
    }
    writer.flush().map_err(|e| AfsError::from_io(dest, e))?;
    writer.sync_all().map_err(|e| AfsError::from_io(dest, e))?;
    Ok(total)
}

fn sibling_temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".ffs_tmp");
    target.with_file_name(name)
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV
}

#[cfg(not(unix))]
fn libc_exdev() -> i32 {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Device;

    fn root() -> (tempfile::TempDir, Local) {
        let dir = tempfile::tempdir().unwrap();
        let fs = Local::new(dir.path());
        (dir, fs)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_dir, fs) = root();
        let dev = Device::new("local");
        let path = AbstractPath::root(dev).join("a.txt");

        {
            let mut w = fs.write_stream(&path).unwrap();
            use std::io::Write;
            w.write_all(b"hello").unwrap();
        }

        let mut r = fs.read_stream(&path).unwrap();
        let mut buf = Vec::new();
        use std::io::Read;
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
        assert_eq!(fs.get_item_type(&path).unwrap(), ItemType::File);
    }

    #[test]
    fn traverse_folder_lists_children() {
        let (_dir, fs) = root();
        let dev = Device::new("local");
        let root_path = AbstractPath::root(dev);
        fs.create_folder_plain(&root_path.join("sub")).unwrap();
        let mut w = fs.write_stream(&root_path.join("file.txt")).unwrap();
        use std::io::Write;
        w.write_all(b"x").unwrap();
        drop(w);

        let mut entries = fs.traverse_folder(&root_path).unwrap();
        entries.sort_by_key(|e| e.path.relative().to_path_buf());
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn transactional_copy_leaves_no_partial_target_on_success() {
        let (_dir, fs) = root();
        let dev = Device::new("local");
        let root_path = AbstractPath::root(dev);
        let source = root_path.join("src.bin");
        let target = root_path.join("dst.bin");

        {
            let mut w = fs.write_stream(&source).unwrap();
            use std::io::Write;
            w.write_all(&[1, 2, 3, 4]).unwrap();
        }
        let attrs = fs.attributes(&source).unwrap();

        let outcome = fs
            .copy_file_transactional(
                &source,
                &attrs,
                &target,
                false,
                true,
                &mut || Ok(()),
                &mut |_| Ok(()),
            )
            .unwrap();

        assert_eq!(outcome.size, 4);
        assert!(fs.item_exists(&target).unwrap());
        let tmp_sibling = sibling_temp_path(&fs.resolve(&target));
        assert!(!tmp_sibling.exists());
    }
}
