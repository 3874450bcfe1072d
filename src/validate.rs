// Path Gate - Path Validator
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// The single chokepoint every filesystem-touching tool crosses:
// raw string + intent -> canonical path or classified failure.
//
// Intent decides the procedure:
// - Read:      resolve symlinks, must exist, canonical path must be allowed
// - Write:     need not exist; the path as written and the real location
//              of its deepest existing ancestor (plus the missing tail) must
//              both be under an allowed root
// - Create:    allowed root itself, or parent resolvable and allowed
// - Unchecked: internal callers only; no permission check
//
// Fails closed. Never logs-and-continues on a denial.

use crate::allowlist::AllowedPaths;
use crate::error::{ErrorKind, PathError};
use crate::paths::{Resolution, Resolver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// INTENT
// ============================================================================

/// Declared purpose of a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Read,
    Write,
    Create,
    /// Skips the allowlist. Never constructed from caller input: `FromStr`
    /// and serde at the tool boundary go through `BoundaryIntent`.
    #[serde(skip)]
    Unchecked { require_existence: bool },
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Read => f.write_str("read"),
            Intent::Write => f.write_str("write"),
            Intent::Create => f.write_str("create"),
            Intent::Unchecked { .. } => f.write_str("unchecked"),
        }
    }
}

/// Intents a caller at the system boundary may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryIntent {
    Read,
    Write,
    Create,
}

impl From<BoundaryIntent> for Intent {
    fn from(intent: BoundaryIntent) -> Self {
        match intent {
            BoundaryIntent::Read => Intent::Read,
            BoundaryIntent::Write => Intent::Write,
            BoundaryIntent::Create => Intent::Create,
        }
    }
}

impl FromStr for BoundaryIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(BoundaryIntent::Read),
            "write" => Ok(BoundaryIntent::Write),
            "create" => Ok(BoundaryIntent::Create),
            other => Err(format!("unknown intent '{}' (expected read, write or create)", other)),
        }
    }
}

// ============================================================================
// EXISTENCE CHECKS
// ============================================================================

/// Non-failing check. Follows symlinks.
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// `NotFound` (naming the caller's input) when `required` and `path` is absent.
pub fn ensure_exists(path: &Path, input: &str, required: bool) -> Result<(), PathError> {
    if required && !exists(path) {
        return Err(PathError::not_found(input));
    }
    Ok(())
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Immutable validation context. Built once at startup, shared by reference
/// (or `Arc`) across every concurrent tool call.
#[derive(Debug, Clone)]
pub struct PathValidator {
    allowed: AllowedPaths,
    resolver: Resolver,
}

impl PathValidator {
    pub fn new(allowed: AllowedPaths, resolver: Resolver) -> Self {
        Self { allowed, resolver }
    }

    pub fn allowed(&self) -> &AllowedPaths {
        &self.allowed
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Validate `raw` for `intent`. The returned path may be handed straight
    /// to a raw filesystem call.
    pub fn validate(&self, raw: &str, intent: Intent) -> Result<PathBuf, PathError> {
        let result = self.dispatch(raw, intent);

        match &result {
            Ok(path) => log::debug!("{} ok: {} -> {}", intent, raw, path.display()),
            Err(e) if matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::SymlinkResolutionFailed) => {
                log::warn!("{} rejected: {}", intent, e)
            }
            Err(e) => log::debug!("{} failed: {}", intent, e),
        }

        result
    }

    pub fn validate_read(&self, raw: &str) -> Result<PathBuf, PathError> {
        self.validate(raw, Intent::Read)
    }

    pub fn validate_write(&self, raw: &str) -> Result<PathBuf, PathError> {
        self.validate(raw, Intent::Write)
    }

    pub fn validate_create(&self, raw: &str) -> Result<PathBuf, PathError> {
        self.validate(raw, Intent::Create)
    }

    fn dispatch(&self, raw: &str, intent: Intent) -> Result<PathBuf, PathError> {
        if raw.trim().is_empty() {
            return Err(PathError::invalid(raw, "path is empty"));
        }
        if raw.contains('\0') {
            return Err(PathError::invalid(raw, "path contains a NUL byte"));
        }

        match intent {
            Intent::Read => self.read(raw),
            Intent::Write => self.write(raw),
            Intent::Create => self.create(raw),
            Intent::Unchecked { require_existence } => self.unchecked(raw, require_existence),
        }
    }

    fn read(&self, raw: &str) -> Result<PathBuf, PathError> {
        let absolute = self.resolver.absolutize(raw)?;

        let canonical = match self.resolver.resolve_symlinks(&absolute, raw)? {
            Resolution::Resolved(real) => real,
            Resolution::Missing => return Err(PathError::not_found(raw)),
        };

        // The link's real target is what gets checked, not where the link sits.
        if !self.allowed.is_allowed(&canonical) {
            return Err(PathError::denied(raw, &canonical));
        }

        ensure_exists(&canonical, raw, true)?;
        Ok(canonical)
    }

    fn write(&self, raw: &str) -> Result<PathBuf, PathError> {
        let absolute = self.resolver.absolutize(raw)?;

        // The returned path is the unresolved one, so it must sit under an
        // allowed root as written, not only after link resolution.
        if self.allowed.find_allowed_ancestor(&absolute).is_none() {
            return Err(PathError::denied(raw, &absolute));
        }

        let real = self.resolver.resolve_existing_prefix(&absolute, raw)?;
        if self.allowed.find_allowed_ancestor(&real).is_none() {
            return Err(PathError::denied(raw, &real));
        }

        Ok(absolute)
    }

    fn create(&self, raw: &str) -> Result<PathBuf, PathError> {
        let absolute = self.resolver.absolutize(raw)?;

        // Creating directly onto an allowed root (e.g. extracting into it).
        if self.allowed.contains(&absolute) {
            return Ok(absolute);
        }

        // Root is never implicitly creatable.
        let Some(parent) = absolute.parent() else {
            return Err(PathError::denied(raw, &absolute));
        };

        match self.resolver.resolve_symlinks(parent, raw)? {
            Resolution::Resolved(real_parent) => {
                if !self.allowed.is_allowed(&real_parent) {
                    return Err(PathError::denied(raw, &real_parent));
                }
            }
            Resolution::Missing => {
                let real_parent = self.resolver.resolve_existing_prefix(parent, raw)?;
                if !self.allowed.is_allowed(&real_parent) {
                    return Err(PathError::directory_not_found(raw));
                }
            }
        }

        // An existing target (or a link sitting at the target) must not lead outside.
        if let Resolution::Resolved(real) = self.resolver.resolve_symlinks(&absolute, raw)? {
            if !self.allowed.is_allowed(&real) {
                return Err(PathError::denied(raw, &real));
            }
        }

        Ok(absolute)
    }

    fn unchecked(&self, raw: &str, require_existence: bool) -> Result<PathBuf, PathError> {
        let path = self.resolver.resolve_lenient(raw)?;
        ensure_exists(&path, raw, require_existence)?;
        Ok(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    /// base/allowed is the only allowed root and the workspace; base/outside is not.
    fn fixture() -> (TempDir, PathBuf, PathValidator) {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        fs::create_dir_all(base.join("allowed/sub")).unwrap();
        fs::create_dir_all(base.join("outside")).unwrap();
        fs::write(base.join("allowed/sub/file.txt"), "hello").unwrap();
        fs::write(base.join("outside/secret.txt"), "secret").unwrap();

        let resolver = Resolver::new(&base.join("allowed"), Some(base.join("allowed")), true);
        let allowed = AllowedPaths::from_entries([base.join("allowed")]);
        (dir, base, PathValidator::new(allowed, resolver))
    }

    #[test]
    fn empty_input_is_invalid_for_every_intent() {
        let (_dir, _base, v) = fixture();
        for intent in [Intent::Read, Intent::Write, Intent::Create, Intent::Unchecked { require_existence: false }] {
            assert_eq!(v.validate("", intent).unwrap_err().kind(), ErrorKind::InvalidPath);
            assert_eq!(v.validate("   \t", intent).unwrap_err().kind(), ErrorKind::InvalidPath);
        }
    }

    #[test]
    fn nul_byte_is_invalid() {
        let (_dir, _base, v) = fixture();
        assert_eq!(v.validate_read("sub/\0file").unwrap_err().kind(), ErrorKind::InvalidPath);
    }

    #[test]
    fn read_existing_relative_file() {
        let (_dir, base, v) = fixture();
        assert_eq!(v.validate_read("sub/file.txt").unwrap(), base.join("allowed/sub/file.txt"));
    }

    #[test]
    fn read_missing_is_not_found() {
        let (_dir, _base, v) = fixture();
        assert_eq!(v.validate_read("sub/nope.txt").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn read_traversal_is_denied() {
        let (_dir, base, v) = fixture();
        let err = v.validate_read("../outside/secret.txt").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(err.to_string().contains(&base.join("outside/secret.txt").display().to_string()));
    }

    #[test]
    fn read_tilde_uses_home() {
        let (_dir, base, v) = fixture();
        assert_eq!(v.validate_read("~/sub/file.txt").unwrap(), base.join("allowed/sub/file.txt"));
    }

    #[test]
    fn write_new_nested_path() {
        let (_dir, base, v) = fixture();
        assert_eq!(
            v.validate_write("newdir/deeper/out.txt").unwrap(),
            base.join("allowed/newdir/deeper/out.txt")
        );
    }

    #[test]
    fn write_outside_is_denied() {
        let (_dir, base, v) = fixture();
        let target = base.join("outside/new.txt");
        let err = v.validate_write(target.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn create_on_allowed_root_itself() {
        let (_dir, base, v) = fixture();
        let root = base.join("allowed");
        assert_eq!(v.validate_create(root.to_str().unwrap()).unwrap(), root);
    }

    #[test]
    fn create_under_missing_intermediate() {
        let (_dir, base, v) = fixture();
        assert_eq!(v.validate_create("newdir/file").unwrap(), base.join("allowed/newdir/file"));
    }

    #[test]
    fn create_with_missing_parent_outside() {
        let (_dir, base, v) = fixture();
        let target = base.join("missing-parent/x");
        let err = v.validate_create(target.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
    }

    #[test]
    fn create_with_existing_parent_outside() {
        let (_dir, base, v) = fixture();
        let target = base.join("outside/newdir");
        let err = v.validate_create(target.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn create_filesystem_root_is_denied() {
        let (_dir, _base, v) = fixture();
        let root = if cfg!(windows) { "C:\\" } else { "/" };
        assert_eq!(v.validate_create(root).unwrap_err().kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn unchecked_skips_allowlist() {
        let (_dir, base, v) = fixture();
        let secret = base.join("outside/secret.txt");
        let got = v
            .validate(secret.to_str().unwrap(), Intent::Unchecked { require_existence: true })
            .unwrap();
        assert_eq!(got, secret);

        let missing = base.join("outside/missing");
        let lenient = v
            .validate(missing.to_str().unwrap(), Intent::Unchecked { require_existence: false })
            .unwrap();
        assert_eq!(lenient, missing);
        assert_eq!(
            v.validate(missing.to_str().unwrap(), Intent::Unchecked { require_existence: true })
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn boundary_intent_never_yields_unchecked() {
        assert_eq!("READ".parse::<BoundaryIntent>().unwrap(), BoundaryIntent::Read);
        assert_eq!(Intent::from("create".parse::<BoundaryIntent>().unwrap()), Intent::Create);
        assert!("unchecked".parse::<BoundaryIntent>().is_err());
        assert!(serde_json::from_str::<BoundaryIntent>("\"unchecked\"").is_err());
    }

    #[cfg(unix)]
    mod links {
        use super::*;
        use std::os::unix::fs::symlink;

        #[test]
        fn read_through_escaping_link_is_denied() {
            let (_dir, base, v) = fixture();
            symlink(base.join("outside/secret.txt"), base.join("allowed/innocent.txt")).unwrap();
            let err = v.validate_read("innocent.txt").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        }

        #[test]
        fn read_through_internal_link_returns_target() {
            let (_dir, base, v) = fixture();
            symlink(base.join("allowed/sub"), base.join("allowed/alias")).unwrap();
            assert_eq!(v.validate_read("alias/file.txt").unwrap(), base.join("allowed/sub/file.txt"));
        }

        #[test]
        fn write_through_escaping_dir_link_is_denied() {
            let (_dir, base, v) = fixture();
            symlink(base.join("outside"), base.join("allowed/exit")).unwrap();
            let err = v.validate_write("exit/planted.sh").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        }

        #[test]
        fn write_via_outside_link_into_allowed_is_denied() {
            let (_dir, base, v) = fixture();
            symlink(base.join("allowed"), base.join("outside/link")).unwrap();
            let target = base.join("outside/link/x.txt");
            let err = v.validate_write(target.to_str().unwrap()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied);

            let existing = base.join("outside/link/sub/file.txt");
            let err = v.validate_write(existing.to_str().unwrap()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        }

        #[test]
        fn write_keeps_unresolved_form() {
            let (_dir, base, v) = fixture();
            symlink(base.join("allowed/sub"), base.join("allowed/alias")).unwrap();
            assert_eq!(v.validate_write("alias/new.txt").unwrap(), base.join("allowed/alias/new.txt"));
        }

        #[test]
        fn write_to_dangling_link_fails_resolution() {
            let (_dir, base, v) = fixture();
            symlink(base.join("outside/not-yet"), base.join("allowed/trap")).unwrap();
            let err = v.validate_write("trap").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SymlinkResolutionFailed);
        }

        #[test]
        fn create_onto_escaping_link_is_denied() {
            let (_dir, base, v) = fixture();
            symlink(base.join("outside"), base.join("allowed/dest")).unwrap();
            let err = v.validate_create("dest").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        }

        #[test]
        fn cycle_is_never_not_found() {
            let (_dir, base, v) = fixture();
            symlink(base.join("allowed/b"), base.join("allowed/a")).unwrap();
            symlink(base.join("allowed/a"), base.join("allowed/b")).unwrap();
            for intent in [Intent::Read, Intent::Write, Intent::Create] {
                let err = v.validate("a/x", intent).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::SymlinkResolutionFailed, "intent {}", intent);
            }
        }
    }
}
