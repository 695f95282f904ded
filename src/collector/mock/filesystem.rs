//! In-memory mock filesystem for testing collectors without real `/proc`.
//!
//! This module provides `MockFs` which simulates a filesystem in memory,
//! allowing tests to run on macOS and in CI environments without Linux.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tree {
    /// Map from path to file contents.
    files: HashMap<PathBuf, Vec<u8>>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Directories that exist but refuse to be listed.
    unreadable: HashSet<PathBuf>,
}

impl Tree {
    fn insert_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

/// In-memory filesystem for testing.
///
/// Clones share the same tree, so a test can hand one clone to a sampler and
/// keep mutating the process state through another between samples.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    tree: Arc<RwLock<Tree>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(|e| e.into_inner())
    }

    fn tree_mut(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds (or replaces) a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.add_bytes(path, content.into().into_bytes());
    }

    /// Adds (or replaces) a file with raw, possibly non-UTF-8 content.
    pub fn add_bytes(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut tree = self.tree_mut();
        tree.insert_parents(&path);
        tree.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut tree = self.tree_mut();
        tree.insert_parents(&path);
        tree.directories.insert(path);
    }

    /// Removes a file or a directory together with everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut tree = self.tree_mut();
        tree.files.retain(|p, _| !p.starts_with(path));
        tree.directories.retain(|p| !p.starts_with(path));
        tree.unreadable.retain(|p| !p.starts_with(path));
    }

    /// Keeps a directory present but makes `read_dir` on it fail with
    /// `PermissionDenied`, the way `/proc/<pid>/fd` behaves for another
    /// user's process.
    pub fn deny_listing(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut tree = self.tree_mut();
        tree.insert_parents(&path);
        tree.directories.insert(path.clone());
        tree.unreadable.insert(path);
    }

    /// Adds a process with its `/proc/[pid]/stat` and `fd_count` entries
    /// under `/proc/[pid]/fd`.
    ///
    /// fd entries are named `0..fd_count` like the kernel's.
    pub fn add_process(&self, pid: u32, stat: &str, fd_count: usize) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.set_open_fds(pid, fd_count);
    }

    /// Replaces the `/proc/[pid]/stat` line of an existing process.
    pub fn set_stat(&self, pid: u32, stat: &str) {
        self.add_file(format!("/proc/{}/stat", pid), stat);
    }

    /// Replaces the `/proc/[pid]/fd` directory with `count` entries.
    pub fn set_open_fds(&self, pid: u32, count: usize) {
        let fd_dir = PathBuf::from(format!("/proc/{}/fd", pid));
        self.remove(&fd_dir);
        self.add_dir(&fd_dir);
        for fd in 0..count {
            self.add_file(fd_dir.join(fd.to_string()), format!("socket:[{}]", 10000 + fd));
        }
    }

    /// Makes the process vanish, as if it exited and was reaped.
    pub fn remove_process(&self, pid: u32) {
        self.remove(format!("/proc/{}", pid));
    }

    /// Loads a mock filesystem from a directory snapshot.
    ///
    /// This is useful for regression tests with real `/proc` snapshots.
    pub fn from_snapshot(dir: &Path) -> io::Result<Self> {
        let fs = Self::new();
        load_directory_recursive(&fs, dir, Path::new("/proc"))?;
        Ok(fs)
    }
}

fn load_directory_recursive(fs: &MockFs, real_path: &Path, virtual_path: &Path) -> io::Result<()> {
    fs.add_dir(virtual_path);

    for entry in std::fs::read_dir(real_path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let real_child = entry.path();
        let virtual_child = virtual_path.join(&name);

        if file_type.is_dir() {
            load_directory_recursive(fs, &real_child, &virtual_child)?;
        } else if file_type.is_file() {
            fs.add_bytes(&virtual_child, std::fs::read(&real_child)?);
        }
    }
    Ok(())
}

impl FileSystem for MockFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.tree().files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        let tree = self.tree();
        tree.files.contains_key(path) || tree.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let tree = self.tree();
        if !tree.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }
        if tree.unreadable.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        // Find all files and directories that are direct children
        for file_path in tree.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &tree.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}
