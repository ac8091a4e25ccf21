//! # Filesystem Abstraction
//!
//! Every store in this crate reads and writes through the [`FileSystem`] trait so that the
//! manifest, the ledger and the installer can be exercised against an in-memory tree in tests
//! and against the real disk in the binary.
//!
//! [`FileSystem::write_atomic`] is the write-temp-then-persist path used for the manifest, the
//! ledger and install records: the target is never observed half written, and a failed write
//! leaves no temporary file behind. On disk this is a [`NamedTempFile`] persisted over the
//! target.


use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tempfile::NamedTempFile;

//================================================================================================
// Types
//================================================================================================

/// The real filesystem, backed by [`std::fs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

/// A thread-safe in-memory filesystem.
///
/// Directories are implicit parents of files unless created explicitly. Individual paths can
/// be marked to fail on rename or write, to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryFs {
    inner: RwLock<MemoryTree>,
}

#[derive(Debug, Default)]
struct MemoryTree {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    private: BTreeSet<PathBuf>,
    fail_rename_to: Option<PathBuf>,
    fail_write_to: Option<PathBuf>,
}

//================================================================================================
// Traits
//================================================================================================

/// The filesystem operations the core needs.
pub trait FileSystem: Send + Sync {
    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Create or truncate a file with the given contents.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    /// Rename `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Remove a single file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    /// Remove a directory and everything below it.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    /// Create a directory and all of its parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> io::Result<bool>;
    /// Whether `path` is a directory.
    fn is_dir(&self, path: &Path) -> io::Result<bool>;
    /// The immediate children of a directory, sorted.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
    /// Restrict a file to owner read/write.
    fn restrict(&self, path: &Path) -> io::Result<()>;
    /// Replace `path` with `contents` so that readers see either the old or the new file.
    ///
    /// With `private`, the new file is restricted to owner read/write before it becomes
    /// visible.
    fn write_atomic(&self, path: &Path, contents: &[u8], private: bool) -> io::Result<()>;

    /// Read a whole file as UTF-8, or `None` if it does not exist.
    fn read_to_string_opt(&self, path: &Path) -> io::Result<Option<String>> {
        match self.read(path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

//================================================================================================
// Impls
//================================================================================================

impl FileSystem for OsFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }

    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    #[cfg(unix)]
    fn restrict(&self, path: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
    }

    #[cfg(not(unix))]
    fn restrict(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8], private: bool) -> io::Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::with_prefix_in(format!(".{}", file_name(path)?), dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        set_mode(tmp.as_file(), private)?;
        tmp.persist(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e.error, "atomic write failed");
            e.error
        })?;
        Ok(())
    }
}

impl MemoryFs {
    /// An empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every rename onto `path` fail.
    pub fn fail_rename_to(&self, path: impl Into<PathBuf>) {
        self.tree_mut().fail_rename_to = Some(path.into());
    }

    /// Make every write to `path` fail.
    pub fn fail_write_to(&self, path: impl Into<PathBuf>) {
        self.tree_mut().fail_write_to = Some(path.into());
    }

    /// Every file path currently stored, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        self.tree().files.keys().cloned().collect()
    }

    /// Whether `path` was restricted to owner read/write.
    pub fn is_private(&self, path: &Path) -> bool {
        self.tree().private.contains(path)
    }

    fn tree(&self) -> std::sync::RwLockReadGuard<'_, MemoryTree> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tree_mut(&self) -> std::sync::RwLockWriteGuard<'_, MemoryTree> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryTree {
    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
            || self
                .files
                .keys()
                .chain(self.dirs.iter())
                .any(|p| p != path && p.starts_with(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.is_dir(path)
    }
}

impl FileSystem for MemoryFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.tree()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut tree = self.tree_mut();
        if tree.fail_write_to.as_deref() == Some(path) {
            return Err(io::Error::other(format!("injected write failure: {}", path.display())));
        }
        if tree.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                path.display().to_string(),
            ));
        }
        tree.files.insert(path.to_owned(), contents.to_vec());
        tree.private.remove(path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut tree = self.tree_mut();
        if tree.fail_rename_to.as_deref() == Some(to) {
            return Err(io::Error::other(format!("injected rename failure: {}", to.display())));
        }
        if let Some(contents) = tree.files.remove(from) {
            let private = tree.private.remove(from);
            tree.private.remove(to);
            if private {
                tree.private.insert(to.to_owned());
            }
            tree.files.insert(to.to_owned(), contents);
            return Ok(());
        }
        if !tree.is_dir(from) {
            return Err(not_found(from));
        }
        let moved_files: Vec<_> = tree
            .files
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved_files {
            if let Some(contents) = tree.files.remove(&old) {
                let new = rebase(&old, from, to);
                tree.files.insert(new, contents);
            }
        }
        let moved_dirs: Vec<_> = tree
            .dirs
            .iter()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved_dirs {
            tree.dirs.remove(&old);
            tree.dirs.insert(rebase(&old, from, to));
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.tree_mut();
        tree.private.remove(path);
        tree.files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.tree_mut();
        if !tree.is_dir(path) {
            return Err(not_found(path));
        }
        tree.files.retain(|p, _| !p.starts_with(path));
        tree.dirs.retain(|p| !p.starts_with(path));
        tree.private.retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.tree_mut();
        if tree.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                path.display().to_string(),
            ));
        }
        tree.dirs.insert(path.to_owned());
        Ok(())
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.tree().exists(path))
    }

    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(self.tree().is_dir(path))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let tree = self.tree();
        if !tree.is_dir(path) {
            return Err(not_found(path));
        }
        let mut children: Vec<PathBuf> = tree
            .files
            .keys()
            .chain(tree.dirs.iter())
            .filter_map(|p| {
                let rest = p.strip_prefix(path).ok()?;
                let first = rest.components().next()?;
                Some(path.join(first))
            })
            .collect();
        children.sort();
        children.dedup();
        Ok(children)
    }

    fn restrict(&self, path: &Path) -> io::Result<()> {
        let mut tree = self.tree_mut();
        if !tree.files.contains_key(path) {
            return Err(not_found(path));
        }
        tree.private.insert(path.to_owned());
        Ok(())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8], private: bool) -> io::Result<()> {
        let tmp = path.with_file_name(format!(".{}.tmp", file_name(path)?));
        self.write(&tmp, contents)?;

        let persist = || -> io::Result<()> {
            if private {
                self.restrict(&tmp)?;
            }
            self.rename(&tmp, path)
        };
        persist().inspect_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "atomic write failed");
            let _ = self.remove_file(&tmp);
        })
    }
}

//================================================================================================
// Functions
//================================================================================================

fn file_name(path: &Path) -> io::Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))
}

#[cfg(unix)]
fn set_mode(file: &File, private: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if private { 0o600 } else { 0o644 };
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _private: bool) -> io::Result<()> {
    Ok(())
}

fn rebase(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rest) if rest.as_os_str().is_empty() => to.to_owned(),
        Ok(rest) => to.join(rest),
        Err(_) => path.to_owned(),
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}
