//! Temp File Buffer: materializes remote file descriptors as local files.
//!
//! Grounded in `tempfile::TempDir`'s self-cleaning-on-drop semantics,
//! which map directly onto §4.10's "removes its directory recursively on
//! destruction." The per-process random-suffix directory naming mirrors
//! artid's versioned-backup folder naming style
//! (`examples/gabo01-artid/src/core/src/config/archive.rs`), which also
//! stamps a folder name with a value computed from the item being stored,
//! generalized here from a date stamp to a CRC16 cookie hash.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crc::{Crc, CRC_16_IBM_3740};
use rand::Rng;
use tempfile::TempDir;
use thiserror::Error;

use crate::afs::{AbstractFs, AfsError};
use crate::path::{AbstractPath, FileAttributes};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// A remote file identified by its abstract path plus the attribute
/// snapshot under which it was last observed, and the phrase used to seed
/// its buffer-local name.
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    /// The abstract path of the remote file.
    pub path: AbstractPath,
    /// Attributes as last observed.
    pub attrs: FileAttributes,
    /// A short phrase identifying which scan/comparison this descriptor
    /// came from, folded into the cookie so the same remote path observed
    /// under different runs does not collide.
    pub init_path_phrase: String,
}

/// Errors from materializing a descriptor into the buffer.
#[derive(Debug, Error)]
pub enum TempBufferError {
    /// Reading the remote file failed.
    #[error("failed to read remote file: {0}")]
    Afs(#[from] AfsError),
    /// Writing the local copy failed.
    #[error("failed to write temp buffer file: {0}")]
    Io(#[from] std::io::Error),
}

fn cookie(descriptor: &FileDescriptor) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(descriptor.attrs.mod_time.to_le_bytes().as_slice());
    digest.update(descriptor.attrs.size.to_le_bytes().as_slice());
    digest.update(descriptor.attrs.fingerprint.to_le_bytes().as_slice());
    digest.update(&[descriptor.attrs.is_followed_symlink as u8]);
    digest.update(descriptor.init_path_phrase.as_bytes());
    digest.finalize()
}

fn buffer_file_name(descriptor: &FileDescriptor) -> String {
    let name = descriptor
        .path
        .name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (name, String::new()),
    };
    format!("{stem}-{:04x}{ext}", cookie(descriptor))
}

/// Materializes remote files as local files under a self-cleaning per-
/// process temp directory, named with an 8-hex-digit random suffix.
/// Dropping the buffer recursively removes its directory.
pub struct TempFileBuffer {
    dir: TempDir,
    materialized: HashMap<String, PathBuf>,
}

impl TempFileBuffer {
    /// Creates a fresh buffer directory under the system temp root.
    pub fn new() -> std::io::Result<Self> {
        let suffix: u32 = rand::thread_rng().gen();
        let dir = tempfile::Builder::new()
            .prefix("duosync-")
            .suffix(&format!("-{suffix:08x}"))
            .tempdir()?;
        Ok(Self {
            dir,
            materialized: HashMap::new(),
        })
    }

    /// The buffer's root directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Materializes `descriptor` by reading it off `fs`, returning the
    /// local path. A descriptor whose cookie already has a materialized
    /// copy returns that copy unchanged, without re-reading the remote
    /// file.
    pub fn materialize(&mut self, fs: &dyn AbstractFs, descriptor: &FileDescriptor) -> Result<PathBuf, TempBufferError> {
        let name = buffer_file_name(descriptor);
        if let Some(existing) = self.materialized.get(&name) {
            return Ok(existing.clone());
        }

        let local_path = self.dir.path().join(&name);
        let mut reader = fs.read_stream(&descriptor.path)?;
        let mut file = std::fs::File::create(&local_path)?;
        std::io::copy(&mut reader, &mut file)?;
        file.flush()?;

        self.materialized.insert(name, local_path.clone());
        Ok(local_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afs::MemoryFs;
    use crate::path::Device;

    fn descriptor(path: AbstractPath, mod_time: i64, size: u64) -> FileDescriptor {
        FileDescriptor {
            path,
            attrs: FileAttributes {
                mod_time,
                size,
                fingerprint: 0,
                is_followed_symlink: false,
            },
            init_path_phrase: "run-1".into(),
        }
    }

    #[test]
    fn materializes_remote_file_to_local_path() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let remote = AbstractPath::root(dev).join("report.csv");
        fs.seed_file(&remote, b"a,b,c".to_vec(), 1000);

        let mut buffer = TempFileBuffer::new().unwrap();
        let desc = descriptor(remote, 1000, 5);
        let local = buffer.materialize(&fs, &desc).unwrap();

        assert_eq!(std::fs::read(&local).unwrap(), b"a,b,c");
        assert!(local.starts_with(buffer.path()));
    }

    #[test]
    fn repeated_materialize_of_same_cookie_returns_cached_copy() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let remote = AbstractPath::root(dev).join("report.csv");
        fs.seed_file(&remote, b"a,b,c".to_vec(), 1000);

        let mut buffer = TempFileBuffer::new().unwrap();
        let desc = descriptor(remote, 1000, 5);
        let first = buffer.materialize(&fs, &desc).unwrap();
        let second = buffer.materialize(&fs, &desc).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn directory_is_removed_on_drop() {
        let buffer = TempFileBuffer::new().unwrap();
        let path = buffer.path().to_path_buf();
        assert!(path.exists());
        drop(buffer);
        assert!(!path.exists());
    }
}
