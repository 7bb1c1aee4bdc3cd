//! Write confinement for `fs.write`.
//!
//! A path is writable only when its resolved form sits at or under one of the
//! allow-listed roots. Resolution happens on the filesystem view, not on the
//! raw string: `.`/`..` segments are folded and every existing prefix is
//! canonicalized, so neither traversal segments nor symlinks can step outside
//! a root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

/// Symlink hops followed for a single path before giving up.
const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
}

impl PathGuard {
    /// Build a guard for `roots`, each interpreted relative to `project_root`.
    ///
    /// Roots are resolved once here; they do not need to exist yet.
    pub fn new<S: AsRef<str>>(project_root: &Path, roots: &[S]) -> Self {
        let base = resolve(project_root);
        let roots = roots
            .iter()
            .map(|root| resolve(&base.join(root.as_ref())))
            .collect();
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// True if `path` (absolute) resolves to a location inside an allowed root.
    pub fn is_allowed(&self, path: &Path) -> bool {
        let resolved = resolve(path);
        let allowed = self.roots.iter().any(|root| resolved.starts_with(root));
        debug!(path = %resolved.display(), allowed, "path guard check");
        allowed
    }
}

/// Resolve `path` to an absolute, symlink-free form without requiring it to exist.
///
/// Existing prefixes are canonicalized; the non-existing tail is folded
/// lexically. Relative inputs are taken relative to the process working
/// directory.
pub fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut hops = 0;
    resolve_inner(&absolute, &mut hops)
}

fn resolve_inner(path: &Path, hops: &mut usize) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                resolved = resolve_existing(resolved, hops);
            }
        }
    }
    resolved
}

fn resolve_existing(candidate: PathBuf, hops: &mut usize) -> PathBuf {
    if let Ok(real) = fs::canonicalize(&candidate) {
        return real;
    }
    // Dangling symlink: follow its target lexically so a write through it is
    // judged by where it would land.
    let is_link = fs::symlink_metadata(&candidate)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link || *hops >= MAX_LINK_HOPS {
        return candidate;
    }
    let Ok(target) = fs::read_link(&candidate) else {
        return candidate;
    };
    *hops += 1;
    let parent = candidate.parent().map(Path::to_path_buf).unwrap_or_default();
    resolve_inner(&parent.join(target), hops)
}
