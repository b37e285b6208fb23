//! Path Resolution and Containment
//!
//! Path arguments are resolved to their real, symlink-free form before they
//! are compared with the sandbox root. Comparing the literal string would let
//! `sub/../../etc` or a symlink inside the sandbox escape it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Canonicalization and containment checks
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    /// Resolve `path` to an absolute real path
    ///
    /// Relative paths are joined with `base` first. All `..` segments and
    /// symlinks are resolved. A path whose final component does not exist yet
    /// resolves through its parent, so `sub/new.txt` works when `sub` exists.
    ///
    /// # Errors
    ///
    /// Fails when an intermediate directory is missing, when the final
    /// component is a dangling symlink, or when it is `.`/`..` and does not
    /// resolve.
    pub fn canonicalize(path: &Path, base: &Path) -> io::Result<PathBuf> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        };

        match fs::canonicalize(&joined) {
            Ok(resolved) => Ok(resolved),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // A dangling symlink must not resolve through its parent
                if fs::symlink_metadata(&joined).is_ok() {
                    return Err(err);
                }

                let leaf = match joined.components().next_back() {
                    Some(Component::Normal(name)) => name.to_os_string(),
                    _ => return Err(err),
                };
                let parent = match joined.parent() {
                    Some(parent) => parent,
                    None => return Err(err),
                };

                Ok(fs::canonicalize(parent)?.join(leaf))
            }
            Err(err) => Err(err),
        }
    }

    /// Whether `canonical` is `root` or lies beneath it
    ///
    /// Both paths must already be canonical. Comparison is per component, so
    /// `/data-other` is not inside `/data`.
    pub fn contain(canonical: &Path, root: &Path) -> bool {
        canonical.starts_with(root)
    }

    /// Canonicalize `path` against `root` and require containment
    ///
    /// Returns `None` when the path cannot be resolved or escapes `root`.
    pub fn resolve_within(path: &Path, root: &Path) -> Option<PathBuf> {
        match Self::canonicalize(path, root) {
            Ok(resolved) if Self::contain(&resolved, root) => Some(resolved),
            Ok(_) => {
                tracing::debug!("Path {:?} resolves outside the sandbox", path);
                None
            }
            Err(err) => {
                tracing::debug!("Path {:?} cannot be resolved: {}", path, err);
                None
            }
        }
    }
}
