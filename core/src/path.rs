//! Abstract paths and the item/attribute types attached to them.
//!
//! Grounded in artid's `Route` trait
//! (`examples/gabo01-artid/src/core/src/ops/core/filesystem/mod.rs`), which
//! kept path manipulation separate from filesystem access. [`AbstractPath`]
//! generalizes that idea to the two-sided model of the specification: a path
//! is a `(device, relative path)` pair, not just a `PathBuf`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opaque handle identifying a backend instance: a local volume, a
/// configured SFTP session, and so on. Two devices are the same device iff
/// they share a handle; the handle carries no comparable fields of its own.
#[derive(Clone)]
pub struct Device(Arc<str>);

impl Device {
    /// Names a device, usually with a human readable tag such as `"local"`
    /// or the configured remote's label.
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Device(label.into())
    }

    /// The label this device was constructed with.
    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.0)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Device {}

/// A `(device, relative path)` pair. Equality between two `AbstractPath`s is
/// case-insensitive on the relative path for display purposes (matching how
/// the comparison engine treats names), but the raw item names are preserved
/// and never normalized in storage.
#[derive(Clone)]
pub struct AbstractPath {
    device: Device,
    relative: PathBuf,
}

impl AbstractPath {
    /// Creates the path at the root of `device`.
    pub fn root(device: Device) -> Self {
        Self {
            device,
            relative: PathBuf::new(),
        }
    }

    /// Creates a path from an explicit relative component.
    pub fn new(device: Device, relative: impl Into<PathBuf>) -> Self {
        Self {
            device,
            relative: relative.into(),
        }
    }

    /// The distinguished "user left this side blank" / "move source slot
    /// emptied by a completed move" sentinel.
    pub fn null(device: Device) -> Self {
        Self {
            device,
            relative: PathBuf::from("\0null"),
        }
    }

    /// Whether this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.relative == Path::new("\0null")
    }

    /// Appends a name to the relative path, returning a new `AbstractPath`.
    pub fn join(&self, name: impl AsRef<Path>) -> Self {
        Self {
            device: self.device.clone(),
            relative: self.relative.join(name),
        }
    }

    /// The parent of this path, or `None` at the device root.
    pub fn parent(&self) -> Option<Self> {
        self.relative.parent().map(|p| Self {
            device: self.device.clone(),
            relative: p.to_path_buf(),
        })
    }

    /// The final path component, i.e. the item's raw (non-normalized) name.
    pub fn name(&self) -> Option<&std::ffi::OsStr> {
        self.relative.file_name()
    }

    /// The device this path lives on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The relative path, slash/OS-separator form as stored.
    pub fn relative(&self) -> &Path {
        &self.relative
    }
}

impl fmt::Debug for AbstractPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.device, self.relative.display())
    }
}

impl PartialEq for AbstractPath {
    fn eq(&self, other: &Self) -> bool {
        self.device == other.device && case_insensitive_eq(&self.relative, &other.relative)
    }
}

impl Eq for AbstractPath {}

fn case_insensitive_eq(a: &Path, b: &Path) -> bool {
    let (a, b) = (a.to_string_lossy(), b.to_string_lossy());
    a.eq_ignore_ascii_case(&b)
}

/// The kind of filesystem item an entry represents. Symlinks are a distinct
/// variant: the AFS layer never silently dereferences them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ItemType {
    /// A regular file.
    File,
    /// A directory.
    Folder,
    /// A symbolic link, reported without following it.
    Symlink,
}

/// Metadata captured for a single item on one side of a comparison.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FileAttributes {
    /// Modification time, signed seconds since the Unix epoch (negative
    /// values are valid and are what trigger the `invalid-time` category
    /// when they predate a sane epoch).
    pub mod_time: i64,
    /// Size in bytes.
    pub size: u64,
    /// Opaque per-volume identifier; `0` means "unknown", never "item zero".
    pub fingerprint: u64,
    /// Set when this item was reached by following a symlink during the
    /// scan rather than being a direct entry.
    pub is_followed_symlink: bool,
}

impl FileAttributes {
    /// Attributes for an item the backend could not fingerprint.
    pub fn new(mod_time: i64, size: u64) -> Self {
        Self {
            mod_time,
            size,
            fingerprint: 0,
            is_followed_symlink: false,
        }
    }

    /// True when the backend could not, or did not try to, produce a
    /// fingerprint for this item.
    pub fn fingerprint_unknown(&self) -> bool {
        self.fingerprint == 0
    }

    /// `1970-01-01T00:00:00Z` and anything before it is not a time a real
    /// filesystem clock should produce; the categorizer treats it as
    /// `invalid-time` rather than trusting it in a comparison.
    pub fn has_valid_time(&self) -> bool {
        self.mod_time >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_equality_is_by_identity_or_label() {
        let a = Device::new("local");
        let b = Device::new("local");
        let c = a.clone();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn abstract_path_equality_ignores_case_but_not_device() {
        let dev = Device::new("local");
        let left = AbstractPath::root(dev.clone()).join("Folder").join("File.TXT");
        let right = AbstractPath::root(dev.clone()).join("folder").join("file.txt");
        assert_eq!(left, right);

        let other_device = AbstractPath::root(Device::new("remote")).join("file.txt");
        assert_ne!(left, other_device);
    }

    #[test]
    fn null_path_round_trips() {
        let dev = Device::new("local");
        let null = AbstractPath::null(dev);
        assert!(null.is_null());
    }

    #[test]
    fn invalid_time_detection() {
        let ok = FileAttributes::new(1_000, 10);
        let bad = FileAttributes::new(-1, 10);
        assert!(ok.has_valid_time());
        assert!(!bad.has_valid_time());
    }
}
