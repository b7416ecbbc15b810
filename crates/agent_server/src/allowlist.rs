use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllowListError {
    #[error("path must not be empty")]
    EmptyPath,

    #[error("failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

/// Directories the built-in tools may touch.
///
/// Shared by every request the server handles; clones share one list.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    dirs: Arc<RwLock<Vec<PathBuf>>>,
}

impl AllowList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dirs<I, P>(dirs: I) -> Result<Self, AllowListError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let allowlist = Self::new();
        for dir in dirs {
            allowlist.allow(dir)?;
        }
        Ok(allowlist)
    }

    /// Registers an existing directory and returns its canonical form.
    pub fn allow(&self, path: impl AsRef<Path>) -> Result<PathBuf, AllowListError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(AllowListError::EmptyPath);
        }

        let canonical = path.canonicalize().map_err(|source| AllowListError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;
        if !canonical.is_dir() {
            return Err(AllowListError::NotADirectory { path: canonical });
        }

        let mut dirs = write_unpoisoned(&self.dirs);
        if !dirs.contains(&canonical) {
            dirs.push(canonical.clone());
        }
        Ok(canonical)
    }

    #[must_use]
    pub fn entries(&self) -> Vec<PathBuf> {
        read_unpoisoned(&self.dirs).clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        read_unpoisoned(&self.dirs).is_empty()
    }

    /// True when `path` resolves inside an allowed directory. Paths that do
    /// not exist yet are resolved through their nearest existing ancestor.
    #[must_use]
    pub fn can_access(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).is_some()
    }

    /// Resolved form of `path` when access is allowed.
    #[must_use]
    pub fn resolve(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        let resolved = resolve_for_check(path.as_ref())?;
        let dirs = read_unpoisoned(&self.dirs);
        dirs.iter()
            .any(|dir| resolved.starts_with(dir))
            .then_some(resolved)
    }
}

fn resolve_for_check(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut missing: Vec<OsString> = Vec::new();
    let mut cursor = absolute.as_path();
    loop {
        match cursor.canonicalize() {
            Ok(mut anchor) => {
                for component in missing.iter().rev() {
                    anchor.push(component);
                }
                return Some(anchor);
            }
            // `file_name` is None for `..`, so unresolvable parent hops are denied.
            Err(_) => {
                missing.push(cursor.file_name()?.to_os_string());
                cursor = cursor.parent()?;
            }
        }
    }
}

fn read_unpoisoned<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_unpoisoned<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
