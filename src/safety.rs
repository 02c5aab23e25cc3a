use regex::Regex;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Why a caller-supplied name was refused before any file was touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Name must not be empty")]
    Empty,
    #[error("Invalid name (path traversal rejected): {0:?}")]
    Traversal(String),
    #[error("Name produces empty slug: {0:?}")]
    EmptySlug(String),
}

/// Turn a caller-supplied project or strategy name into a directory-safe slug.
///
/// `"My Big Project"` becomes `my-big-project`. Names carrying path
/// separators or `..` are rejected outright rather than cleaned up.
pub fn safe_name(name: &str) -> Result<String, NameError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(NameError::Traversal(name.to_string()));
    }
    let lowered = name.to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        return Err(NameError::EmptySlug(name.to_string()));
    }
    Ok(slug.to_string())
}

/// Resolve `path` to an absolute form with every existing prefix
/// canonicalized (symlinks followed). Components past the first missing one
/// are appended lexically, so this works for files that are about to be
/// created.
pub fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => {
                out.push(part);
                // `out` stays canonical for as long as the prefix exists, so a
                // later `..` pops a real directory, not a symlink name.
                if let Ok(canonical) = fs::canonicalize(&out) {
                    out = canonical;
                }
            }
        }
    }
    out
}

/// True when `path` resolves to `root` or somewhere beneath it.
pub fn is_safe(path: &Path, root: &Path) -> bool {
    let contained = resolve(path).starts_with(resolve(root));
    if !contained {
        tracing::debug!(path = %path.display(), root = %root.display(), "path escapes root");
    }
    contained
}
