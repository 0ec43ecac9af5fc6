//! In-memory backend used by the engine's own test suite.
//!
//! Not part of the original specification's backend list; added per the
//! supplement in `SPEC_FULL.md` so the comparison and sync engines can be
//! exercised without touching the real filesystem, and so a cross-backend
//! sync (`MemoryFs` ⇄ [`super::Local`]) can be tested at all. Modeled after
//! artid's `Local` in shape (one struct implementing the whole trait) but
//! backed by a `Mutex<HashMap<...>>` instead of `std::fs`.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::{AbstractFs, AfsError, ByteProgress, CopyOutcome, DirEntry, ReadStream, RecycleSession, WriteStream};
use crate::path::{AbstractPath, FileAttributes, ItemType};

#[derive(Clone)]
enum Node {
    File { data: Vec<u8>, attrs: FileAttributes },
    Folder,
    Symlink { target: PathBuf },
}

/// An entirely in-memory filesystem keyed by slash-normalized relative
/// path strings. Useful as a second, independent [`AbstractFs`]
/// implementation for tests that must not assume there is only one
/// backend in existence.
#[derive(Clone, Default)]
pub struct MemoryFs {
    nodes: Arc<Mutex<HashMap<String, Node>>>,
    next_fingerprint: Arc<Mutex<u64>>,
}

impl MemoryFs {
    /// Creates an empty in-memory backend, with its root folder already
    /// present.
    pub fn new() -> Self {
        let fs = Self::default();
        fs.nodes.lock().unwrap().insert(String::new(), Node::Folder);
        fs
    }

    fn key(path: &AbstractPath) -> String {
        path.relative().to_string_lossy().replace('\\', "/")
    }

    fn next_fingerprint(&self) -> u64 {
        let mut guard = self.next_fingerprint.lock().unwrap();
        *guard += 1;
        *guard
    }

    /// Test helper: inserts a file directly, bypassing `write_stream`.
    pub fn seed_file(&self, path: &AbstractPath, data: Vec<u8>, mod_time: i64) {
        let fingerprint = self.next_fingerprint();
        self.nodes.lock().unwrap().insert(
            Self::key(path),
            Node::File {
                data,
                attrs: FileAttributes {
                    mod_time,
                    size: 0,
                    fingerprint,
                    is_followed_symlink: false,
                },
            },
        );
        // size is derived from data length at read time via `attributes`.
    }
}

impl AbstractFs for MemoryFs {
    fn get_item_type(&self, path: &AbstractPath) -> Result<ItemType, AfsError> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&Self::key(path)) {
            Some(Node::File { .. }) => Ok(ItemType::File),
            Some(Node::Folder) => Ok(ItemType::Folder),
            Some(Node::Symlink { .. }) => Ok(ItemType::Symlink),
            None => Err(AfsError::NotFound(path.relative().to_path_buf())),
        }
    }

    fn item_exists(&self, path: &AbstractPath) -> Result<bool, AfsError> {
        Ok(self.nodes.lock().unwrap().contains_key(&Self::key(path)))
    }

    fn attributes(&self, path: &AbstractPath) -> Result<FileAttributes, AfsError> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&Self::key(path)) {
            Some(Node::File { data, attrs }) => Ok(FileAttributes {
                size: data.len() as u64,
                ..*attrs
            }),
            Some(_) => Err(AfsError::WrongType(path.relative().to_path_buf())),
            None => Err(AfsError::NotFound(path.relative().to_path_buf())),
        }
    }

    fn read_stream(&self, path: &AbstractPath) -> Result<ReadStream, AfsError> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&Self::key(path)) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(_) => Err(AfsError::WrongType(path.relative().to_path_buf())),
            None => Err(AfsError::NotFound(path.relative().to_path_buf())),
        }
    }

    fn write_stream(&self, path: &AbstractPath) -> Result<WriteStream, AfsError> {
        Ok(Box::new(MemoryWriter {
            fs: self.clone(),
            path: path.clone(),
            buf: Vec::new(),
        }))
    }

    fn create_folder_plain(&self, path: &AbstractPath) -> Result<(), AfsError> {
        self.nodes.lock().unwrap().insert(Self::key(path), Node::Folder);
        Ok(())
    }

    fn rename_item(&self, from: &AbstractPath, to: &AbstractPath) -> Result<(), AfsError> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .remove(&Self::key(from))
            .ok_or_else(|| AfsError::NotFound(from.relative().to_path_buf()))?;
        nodes.insert(Self::key(to), node);
        Ok(())
    }

    fn remove_file_plain(&self, path: &AbstractPath) -> Result<(), AfsError> {
        self.nodes
            .lock()
            .unwrap()
            .remove(&Self::key(path))
            .map(|_| ())
            .ok_or_else(|| AfsError::NotFound(path.relative().to_path_buf()))
    }

    fn remove_folder_recursion(&self, path: &AbstractPath) -> Result<(), AfsError> {
        let prefix = Self::key(path);
        self.nodes
            .lock()
            .unwrap()
            .retain(|k, _| !(k == &prefix || k.starts_with(&format!("{prefix}/"))));
        Ok(())
    }

    fn copy_symlink(&self, from: &AbstractPath, to: &AbstractPath) -> Result<(), AfsError> {
        let nodes = self.nodes.lock().unwrap();
        let target = match nodes.get(&Self::key(from)) {
            Some(Node::Symlink { target }) => target.clone(),
            _ => return Err(AfsError::WrongType(from.relative().to_path_buf())),
        };
        drop(nodes);
        self.nodes
            .lock()
            .unwrap()
            .insert(Self::key(to), Node::Symlink { target });
        Ok(())
    }

    fn traverse_folder(&self, path: &AbstractPath) -> Result<Vec<DirEntry>, AfsError> {
        let prefix = Self::key(path);
        let nodes = self.nodes.lock().unwrap();
        let mut out = Vec::new();
        for (key, node) in nodes.iter() {
            let rest = if prefix.is_empty() {
                Some(key.as_str())
            } else {
                key.strip_prefix(&prefix).and_then(|r| r.strip_prefix('/'))
            };
            let Some(rest) = rest else { continue };
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            let item_type = match node {
                Node::File { .. } => ItemType::File,
                Node::Folder => ItemType::Folder,
                Node::Symlink { .. } => ItemType::Symlink,
            };
            out.push(DirEntry {
                path: path.join(rest),
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
        _copy_permissions: bool,
        _transactional: bool,
        pre_delete_target: &mut dyn FnMut() -> Result<(), AfsError>,
        on_bytes: &mut dyn ByteProgress,
    ) -> Result<CopyOutcome, AfsError> {
        let data = {
            let nodes = self.nodes.lock().unwrap();
            match nodes.get(&Self::key(source)) {
                Some(Node::File { data, .. }) => data.clone(),
                _ => return Err(AfsError::NotFound(source.relative().to_path_buf())),
            }
        };
        pre_delete_target()?;
        on_bytes.on_bytes(data.len() as u64)?;
        let fingerprint = self.next_fingerprint();
        let size = data.len() as u64;
        self.nodes.lock().unwrap().insert(
            Self::key(target),
            Node::File {
                data,
                attrs: FileAttributes {
                    mod_time: source_attrs.mod_time,
                    size,
                    fingerprint,
                    is_followed_symlink: false,
                },
            },
        );
        Ok(CopyOutcome {
            size,
            mod_time: source_attrs.mod_time,
            source_fingerprint: source_attrs.fingerprint,
            target_fingerprint: fingerprint,
            set_mod_time_failed: false,
        })
    }

    fn has_native_transactional_copy(&self) -> bool {
        true
    }

    fn supports_recycle_bin(&self) -> bool {
        false
    }

    fn create_recycle_session(&self) -> Result<Box<dyn RecycleSession>, AfsError> {
        Err(AfsError::RecycleUnsupported)
    }

    fn free_disk_space(&self, _path: &AbstractPath) -> Result<Option<u64>, AfsError> {
        Ok(None)
    }
}

struct MemoryWriter {
    fs: MemoryFs,
    path: AbstractPath,
    buf: Vec<u8>,
}

impl std::io::Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let fingerprint = self.fs.next_fingerprint();
        let size = self.buf.len() as u64;
        self.fs.nodes.lock().unwrap().insert(
            MemoryFs::key(&self.path),
            Node::File {
                data: std::mem::take(&mut self.buf),
                attrs: FileAttributes {
                    mod_time: 0,
                    size,
                    fingerprint,
                    is_followed_symlink: false,
                },
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Device;

    #[test]
    fn write_then_read_round_trips() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let path = AbstractPath::root(dev).join("a.txt");

        {
            use std::io::Write;
            let mut w = fs.write_stream(&path).unwrap();
            w.write_all(b"hi").unwrap();
        }

        use std::io::Read;
        let mut r = fs.read_stream(&path).unwrap();
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hi");
    }

    #[test]
    fn traverse_folder_excludes_nested_grandchildren() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let root = AbstractPath::root(dev);
        fs.create_folder_plain(&root.join("dir")).unwrap();
        fs.seed_file(&root.join("dir").join("inner.txt"), vec![1], 0);
        fs.seed_file(&root.join("top.txt"), vec![2], 0);

        let entries = fs.traverse_folder(&root).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn remove_folder_recursion_drops_descendants() {
        let fs = MemoryFs::new();
        let dev = Device::new("memory");
        let root = AbstractPath::root(dev);
        fs.create_folder_plain(&root.join("dir")).unwrap();
        fs.seed_file(&root.join("dir").join("inner.txt"), vec![1], 0);

        fs.remove_folder_recursion(&root.join("dir")).unwrap();
        assert!(!fs.item_exists(&root.join("dir")).unwrap());
        assert!(!fs.item_exists(&root.join("dir").join("inner.txt")).unwrap());
    }
}
