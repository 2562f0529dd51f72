//! C7: generic virtual-filesystem traversal core.
//!
//! This module knows nothing about ECMA-119 — it operates purely through
//! the [`VfsBackend`] capability trait, the way the teacher crate kept its
//! sector I/O (`IsoRead`) separate from format decoding. `reader.rs` is the
//! only caller, and it's the only place that knows what a `DirHandle` or
//! `Entry` concretely are.

use crate::constants::MAX_SYMLINK_HOPS;
use crate::error::{Error, Result};

/// Capability set a concrete filesystem exposes to the traversal core.
///
/// Deliberately a flat trait rather than a directory/file/entry type
/// hierarchy: the generic algorithms below (`resolve`, `enumerate`) only
/// ever need "give me the entry named X in this directory" and "is this
/// entry a directory/symlink", never anything a class hierarchy would add.
pub trait VfsBackend {
    type DirHandle: Clone;
    type Entry: Clone;

    fn root(&self) -> Result<Self::DirHandle>;
    fn get_entry(&self, dir: &Self::DirHandle, name: &str) -> Result<Option<Self::Entry>>;
    fn list(&self, dir: &Self::DirHandle) -> Result<Vec<Self::Entry>>;
    fn as_directory(&self, entry: &Self::Entry) -> Result<Self::DirHandle>;

    fn entry_name(&self, entry: &Self::Entry) -> String;
    fn is_directory(&self, entry: &Self::Entry) -> bool;
    fn is_symlink(&self, entry: &Self::Entry) -> bool;
    fn symlink_target(&self, entry: &Self::Entry) -> Option<String>;
}

/// Splits a backslash-separated path into non-empty components. Both `""`
/// and `"\"` denote the root and split to an empty component list.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('\\').filter(|segment| !segment.is_empty()).collect()
}

/// Joins path components back into the consumer-facing backslash syntax.
pub fn join_path(components: &[String]) -> String {
    components.join("\\")
}

/// Resolves `..`/`.` segments out of a component list. A leading `..` past
/// the root is simply dropped rather than erroring, matching typical
/// path-normalisation leniency.
fn normalize(components: Vec<&str>) -> Vec<String> {
    let mut stack: Vec<String> = Vec::new();
    for component in components {
        match component {
            "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other.to_string()),
        }
    }
    stack
}

/// Resolves a relative (or absolute) symlink target against the directory
/// containing the symlink. An absolute target (leading `\`) replaces the
/// base path outright; a relative one is combined and normalised.
fn resolve_relative(containing_dir: &[String], target: &str) -> Vec<String> {
    if let Some(stripped) = target.strip_prefix('\\') {
        return normalize(split_path(stripped));
    }
    if let Some(stripped) = target.strip_prefix('/') {
        return normalize(split_path(&stripped.replace('/', "\\")));
    }

    let target = target.replace('/', "\\");
    let mut combined: Vec<&str> = containing_dir.iter().map(String::as_str).collect();
    combined.extend(split_path(&target));
    normalize(combined)
}

/// Looks up `path` starting from the backend's root, following Rock Ridge
/// symlinks as they're encountered (bounded to [`MAX_SYMLINK_HOPS`] hops).
///
/// Returns `Ok(None)` when a component genuinely doesn't exist; returns an
/// error when a non-final path component resolves to a file, or when
/// symlink resolution loops.
pub fn resolve<B: VfsBackend>(backend: &B, path: &str) -> Result<Option<B::Entry>> {
    resolve_from(backend, Vec::new(), split_path(path), 0)
}

fn resolve_from<B: VfsBackend>(
    backend: &B,
    base_dir: Vec<String>,
    components: Vec<&str>,
    hops: u32,
) -> Result<Option<B::Entry>> {
    if hops > MAX_SYMLINK_HOPS {
        return Err(Error::SymlinkLoop(base_dir.join("\\").into()));
    }

    let mut dir = match ascend_to(backend, &base_dir)? {
        Some(dir) => dir,
        None => return Ok(None),
    };

    let mut visited_dir = base_dir;
    let n = components.len();

    for (i, name) in components.iter().enumerate() {
        let Some(entry) = backend.get_entry(&dir, name)? else {
            return Ok(None);
        };

        if backend.is_symlink(&entry) {
            let target = backend.symlink_target(&entry).unwrap_or_default();
            let resolved_components = resolve_relative(&visited_dir, &target);
            let remaining: Vec<&str> = components[i + 1..].to_vec();
            let mut next_components: Vec<&str> =
                resolved_components.iter().map(String::as_str).collect();
            next_components.extend(remaining);
            return resolve_from(backend, Vec::new(), next_components, hops + 1);
        }

        if i == n - 1 {
            return Ok(Some(entry));
        }

        if !backend.is_directory(&entry) {
            return Err(Error::NotADirectory(name.to_string().into()));
        }

        dir = backend.as_directory(&entry)?;
        visited_dir.push(name.to_string());
    }

    Ok(None)
}

fn ascend_to<B: VfsBackend>(backend: &B, components: &[String]) -> Result<Option<B::DirHandle>> {
    let mut dir = backend.root()?;
    for name in components {
        let Some(entry) = backend.get_entry(&dir, name)? else {
            return Ok(None);
        };
        if !backend.is_directory(&entry) {
            return Err(Error::NotADirectory(name.clone().into()));
        }
        dir = backend.as_directory(&entry)?;
    }
    Ok(Some(dir))
}

/// Enumerates the entries of the directory at `path`, optionally filtering
/// by a DOS-style wildcard pattern and optionally recursing depth-first.
///
/// Results preserve on-disc order within a directory, and depth-first order
/// across recursion, matching `PathToClusters`'s own ordering guarantee.
pub fn enumerate<B: VfsBackend>(
    backend: &B,
    path: &str,
    pattern: Option<&str>,
    recursive: bool,
    want_directories: bool,
    want_files: bool,
) -> Result<Vec<String>> {
    let dir_handle = match ascend_to(backend, &normalize(split_path(path)))? {
        Some(dir) => dir,
        None => return Err(Error::DirectoryNotFound(path.to_string().into())),
    };

    let base = split_path(path).into_iter().map(String::from).collect::<Vec<_>>();
    let mut results = Vec::new();
    walk(backend, &dir_handle, &base, pattern, recursive, want_directories, want_files, &mut results)?;
    Ok(results)
}

#[allow(clippy::too_many_arguments)]
fn walk<B: VfsBackend>(
    backend: &B,
    dir: &B::DirHandle,
    base: &[String],
    pattern: Option<&str>,
    recursive: bool,
    want_directories: bool,
    want_files: bool,
    results: &mut Vec<String>,
) -> Result<()> {
    for entry in backend.list(dir)? {
        let name = backend.entry_name(&entry);
        let is_dir = backend.is_directory(&entry);

        let matches = pattern.map(|p| wildcard_match(&name, p)).unwrap_or(true);
        if matches && ((is_dir && want_directories) || (!is_dir && want_files)) {
            let mut full = base.to_vec();
            full.push(name.clone());
            results.push(join_path(&full));
        }

        if is_dir && recursive {
            let mut full = base.to_vec();
            full.push(name.clone());
            let child_dir = backend.as_directory(&entry)?;
            walk(backend, &child_dir, &full, pattern, recursive, want_directories, want_files, results)?;
        }
    }
    Ok(())
}

/// Matches `name` against a DOS-style wildcard `pattern`: `*` matches any
/// run of characters (including `.`), `?` matches exactly one non-`.`
/// character. A pattern without a `.` has one appended first, mirroring the
/// legacy behaviour of extension-less glob matching.
pub fn wildcard_match(name: &str, pattern: &str) -> bool {
    let owned;
    let pattern = if pattern.contains('.') {
        pattern
    } else {
        owned = format!("{pattern}.");
        &owned
    };

    let name: Vec<char> = name.to_ascii_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    matches_from(&name, &pattern, 0, 0)
}

fn matches_from(name: &[char], pattern: &[char], ni: usize, pi: usize) -> bool {
    if pi == pattern.len() {
        return ni == name.len();
    }

    match pattern[pi] {
        '*' => {
            for skip in 0..=(name.len() - ni) {
                if matches_from(name, pattern, ni + skip, pi + 1) {
                    return true;
                }
            }
            false
        }
        '?' => ni < name.len() && name[ni] != '.' && matches_from(name, pattern, ni + 1, pi + 1),
        c => ni < name.len() && name[ni] == c && matches_from(name, pattern, ni + 1, pi + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_drops_empty_components() {
        assert_eq!(split_path("\\foo\\bar"), vec!["foo", "bar"]);
        assert_eq!(split_path(""), Vec::<&str>::new());
        assert_eq!(split_path("\\"), Vec::<&str>::new());
    }

    #[test]
    fn wildcard_star_matches_any_run_including_dot() {
        assert!(wildcard_match("readme.txt", "*"));
        assert!(wildcard_match("readme.txt", "*.txt"));
        assert!(!wildcard_match("readme.md", "*.txt"));
    }

    #[test]
    fn wildcard_question_mark_excludes_dot() {
        assert!(wildcard_match("a.b", "?.b"));
        assert!(!wildcard_match(".b", "?.b"));
    }

    #[test]
    fn wildcard_is_case_insensitive() {
        assert!(wildcard_match("README.TXT", "readme.txt"));
    }

    #[test]
    fn extension_less_pattern_gets_dot_appended() {
        assert!(wildcard_match("noext", "*"));
        assert!(!wildcard_match("readme.txt", "readme"));
    }

    #[test]
    fn resolve_relative_symlink_replaces_only_when_absolute() {
        let base = vec!["usr".to_string(), "bin".to_string()];
        assert_eq!(resolve_relative(&base, "..\\lib"), vec!["usr", "lib"]);
        assert_eq!(resolve_relative(&base, "\\etc"), vec!["etc"]);
    }
}
