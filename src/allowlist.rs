// Path Gate - Allowed-Path Set
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Ordered set of absolute directory prefixes, built once from config and
// never mutated. Membership is component-wise: `/allowed-evil` is NOT
// inside `/allowed`.

use crate::error::PathError;
use crate::paths::{normalize, Resolver, PATH_LIST_SEPARATOR};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedPaths {
    entries: Vec<PathBuf>,
}

impl AllowedPaths {
    /// Build from a separator-delimited list such as `~:/tmp`.
    ///
    /// Each entry is tilde-expanded, anchored at the workspace root,
    /// normalized, and canonicalized when it exists. When the configured
    /// form is itself a link (`/tmp` -> `/private/tmp`), both forms are
    /// kept so paths written either way match. Duplicates keep their
    /// first position.
    pub fn parse(list: &str, resolver: &Resolver) -> Result<Self, PathError> {
        let mut entries: Vec<PathBuf> = Vec::new();
        for raw in list.split(PATH_LIST_SEPARATOR) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let absolute = resolver.absolutize(raw)?;
            let real = resolver.resolve_lenient(raw)?;
            for entry in [real, absolute] {
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }

        if entries.is_empty() {
            return Err(PathError::invalid(list, "no allowed directories configured"));
        }

        log::info!(
            "Allowed directories: {}",
            entries.iter().map(|e| e.display().to_string()).collect::<Vec<_>>().join(", ")
        );
        Ok(Self { entries })
    }

    /// Build from already-absolute entries without touching the filesystem.
    /// Relative entries are skipped: they could never match an absolute path.
    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut out: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            if !entry.is_absolute() {
                log::warn!("Ignoring relative allowed entry {}", entry.display());
                continue;
            }
            let entry = normalize(entry);
            if !out.contains(&entry) {
                out.push(entry);
            }
        }
        Self { entries: out }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Exact membership: `path` is one of the configured roots.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.as_path() == path)
    }

    /// True iff `path` equals an entry or lies strictly beneath one.
    pub fn is_allowed(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| is_within(path, entry))
    }

    /// First of `path` and its ancestors (up to and including the root)
    /// that is allowed.
    pub fn find_allowed_ancestor<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.ancestors().find(|candidate| self.is_allowed(candidate))
    }
}

/// `path == root` or `path` continues `root` at a separator boundary.
fn is_within(path: &Path, root: &Path) -> bool {
    // Path::starts_with compares whole components, never raw string prefixes.
    path.starts_with(root)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn set(entries: &[&str]) -> AllowedPaths {
        AllowedPaths::from_entries(entries.iter().map(Path::new))
    }

    #[test]
    fn exact_and_children_allowed() {
        let allowed = set(&["/allowed"]);
        assert!(allowed.is_allowed(Path::new("/allowed")));
        assert!(allowed.is_allowed(Path::new("/allowed/a")));
        assert!(allowed.is_allowed(Path::new("/allowed/a/b/c.txt")));
    }

    #[test]
    fn string_prefix_sibling_denied() {
        let allowed = set(&["/allowed"]);
        assert!(!allowed.is_allowed(Path::new("/allowed-other")));
        assert!(!allowed.is_allowed(Path::new("/allowedx/file")));
        assert!(!allowed.is_allowed(Path::new("/")));
        assert!(!allowed.is_allowed(Path::new("/etc/passwd")));
    }

    #[test]
    fn trailing_separator_normalized() {
        let allowed = set(&["/allowed/"]);
        assert_eq!(allowed.entries(), &[PathBuf::from("/allowed")]);
        assert!(allowed.contains(Path::new("/allowed")));
    }

    #[test]
    fn relative_entries_are_skipped() {
        let allowed = set(&["relative/dir", "/allowed", "./x"]);
        assert_eq!(allowed.entries(), &[PathBuf::from("/allowed")]);
        assert!(!allowed.is_allowed(Path::new("relative/dir")));
    }

    #[cfg(unix)]
    #[test]
    fn linked_entry_keeps_both_forms() {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::create_dir(base.join("real")).unwrap();
        std::os::unix::fs::symlink(base.join("real"), base.join("alias")).unwrap();
        let resolver = Resolver::new(&base, None, true);

        let allowed = AllowedPaths::parse("alias", &resolver).unwrap();
        assert_eq!(allowed.entries(), &[base.join("real"), base.join("alias")]);
    }

    #[test]
    fn root_entry_allows_everything() {
        let allowed = set(&["/"]);
        assert!(allowed.is_allowed(Path::new("/")));
        assert!(allowed.is_allowed(Path::new("/etc/passwd")));
    }

    #[test]
    fn ancestor_walk() {
        let allowed = set(&["/data/projects"]);
        assert_eq!(
            allowed.find_allowed_ancestor(Path::new("/data/projects/new/file.txt")),
            Some(Path::new("/data/projects/new/file.txt"))
        );
        assert_eq!(allowed.find_allowed_ancestor(Path::new("/data/other/file.txt")), None);
        assert_eq!(allowed.find_allowed_ancestor(Path::new("/data")), None);
    }

    #[test]
    fn parse_expands_and_dedups() {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let resolver = Resolver::new(&base, Some(base.clone()), true);

        let list = format!("~{sep}{}{sep}{}/missing{sep}", base.display(), base.display(), sep = PATH_LIST_SEPARATOR);
        let allowed = AllowedPaths::parse(&list, &resolver).unwrap();
        assert_eq!(allowed.entries(), &[base.clone(), base.join("missing")]);
    }

    #[test]
    fn parse_relative_entry_uses_workspace() {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::create_dir(base.join("sub")).unwrap();
        let resolver = Resolver::new(&base, None, true);

        let allowed = AllowedPaths::parse("sub", &resolver).unwrap();
        assert_eq!(allowed.entries(), &[base.join("sub")]);
    }

    #[test]
    fn parse_empty_list_is_error() {
        let resolver = Resolver::new(Path::new("/"), None, true);
        let err = AllowedPaths::parse(&format!(" {} ", PATH_LIST_SEPARATOR), &resolver).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }
}
