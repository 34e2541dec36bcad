//! Sources of bundled native library blobs.

use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};

/// A read-only collection of blobs addressed by internal path, e.g.
/// `/natives/x86_64/linux/gnu/libwebview.so`.
pub trait ResourceBundle: Send + Sync {
    /// Returns the blob's bytes, or `Ok(None)` when the bundle has no such path.
    fn open(&self, internal_path: &str) -> io::Result<Option<Cow<'_, [u8]>>>;
}

/// Bundle laid out on disk under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, internal_path: &str) -> PathBuf {
        internal_path
            .split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

impl ResourceBundle for DirectoryBundle {
    fn open(&self, internal_path: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        match std::fs::read(self.resolve(internal_path)) {
            Ok(bytes) => Ok(Some(Cow::Owned(bytes))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Bundle compiled into the binary, typically built from `include_bytes!`.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedBundle {
    entries: &'static [(&'static str, &'static [u8])],
}

impl EmbeddedBundle {
    pub const fn new(entries: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { entries }
    }
}

impl ResourceBundle for EmbeddedBundle {
    fn open(&self, internal_path: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        Ok(self
            .entries
            .iter()
            .find(|(path, _)| *path == internal_path)
            .map(|(_, bytes)| Cow::Borrowed(*bytes)))
    }
}
