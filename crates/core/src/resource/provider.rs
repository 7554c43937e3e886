use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use crate::resolve::import::normalize;

/// Source of document text, addressed by path.
///
/// Relative paths are interpreted against the provider's root. The paths a
/// provider hands out from [`resolve`](Self::resolve) are the ones reported
/// in errors and kept on the file stack.
pub trait ResourceProvider {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Absolute, normalized form of `path`.
    fn resolve(&self, path: &Path) -> PathBuf;

    /// Whether a resource exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Raw content at `path`.
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// UTF-8 content at `path`.
    fn read_text(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

/// Provider reading from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// Provider rooted at `root`.
    ///
    /// A relative root is anchored at the working directory, so resolved
    /// paths are absolute and resolving them again is a no-op.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = match std::env::current_dir() {
            Ok(cwd) if root.is_relative() => cwd.join(root),
            _ => root,
        };
        Self {
            root: normalize(&root),
        }
    }

    /// Provider rooted at the process working directory.
    pub fn working_dir() -> Self {
        Self::new(".")
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceProvider for DirectoryProvider {
    fn name(&self) -> &str {
        "directory"
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        normalize(&self.root.join(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }
}

/// Provider serving documents from memory, mounted under a virtual root.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    root: PathBuf,
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryProvider {
    /// Empty provider mounted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashMap::new(),
        }
    }

    /// Add a document at `path`.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Add or replace a document at `path`.
    pub fn insert(&mut self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = self.resolve(path.as_ref());
        self.files.insert(path, contents.into());
    }
}

impl ResourceProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        normalize(&self.root.join(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&self.resolve(path))
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = self.resolve(path);
        self.files.get(&path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not in memory", path.display()),
            )
        })
    }
}
