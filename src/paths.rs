// Path Gate - Path Resolution
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Turns a raw caller string into an absolute path: tilde expansion,
// anchoring at the workspace root, lexical normalization, and OS-level
// symlink resolution. Only resolve_symlinks() and resolve_existing_prefix()
// touch the filesystem, and both are read-only lookups.

use crate::error::PathError;
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Outcome of asking the OS for the real location of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every symlink on the path resolved; this is the real location.
    Resolved(PathBuf),
    /// Some component does not exist. Whether that is fatal is the caller's call.
    Missing,
}

/// Home directory as reported by the platform.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Separator for configured path lists (`~:/tmp`).
pub const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Lexically normalize: drop `.`, fold `..` into its parent, never climb
/// above the root. Does not consult the filesystem.
///
/// Leading `..` on a relative path is discarded, so only call this on
/// paths that are already absolute.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Resolver configuration: where relative paths anchor and what `~` means.
#[derive(Debug, Clone)]
pub struct Resolver {
    workspace_root: PathBuf,
    home: Option<PathBuf>,
    expand_tilde: bool,
}

impl Resolver {
    /// `workspace_root` is normalized here; it must be absolute.
    pub fn new(workspace_root: &Path, home: Option<PathBuf>, expand_tilde: bool) -> Self {
        Self {
            workspace_root: normalize(workspace_root),
            home: home.map(|h| normalize(&h)),
            expand_tilde,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn tilde_enabled(&self) -> bool {
        self.expand_tilde
    }

    /// Replace a leading `~` (alone or followed by a separator) with the home
    /// directory. Anything not starting with `~` passes through untouched.
    pub fn expand_tilde(&self, input: &str) -> Result<PathBuf, PathError> {
        let Some(rest) = input.strip_prefix('~') else {
            return Ok(PathBuf::from(input));
        };

        if !self.expand_tilde {
            return Err(PathError::invalid(input, "tilde expansion is disabled by configuration"));
        }

        if !rest.is_empty() && !rest.starts_with(std::path::is_separator) {
            return Err(PathError::invalid(input, "'~user' paths are not supported"));
        }

        let home = self
            .home
            .as_ref()
            .ok_or_else(|| PathError::invalid(input, "home directory is unknown"))?;

        let rest = rest.trim_start_matches(std::path::is_separator);
        if rest.is_empty() {
            Ok(home.clone())
        } else {
            Ok(home.join(rest))
        }
    }

    /// Anchor a relative path at the workspace root and normalize. Pure.
    pub fn to_absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.workspace_root.join(path))
        }
    }

    /// Tilde expansion followed by `to_absolute`.
    pub fn absolutize(&self, input: &str) -> Result<PathBuf, PathError> {
        let expanded = self.expand_tilde(input)?;
        Ok(self.to_absolute(&expanded))
    }

    /// Canonical form of `input` when it exists, otherwise its normalized
    /// absolute form. Resolution failures (cycles, dangling links) still fail.
    pub fn resolve_lenient(&self, input: &str) -> Result<PathBuf, PathError> {
        let absolute = self.absolutize(input)?;
        match self.resolve_symlinks(&absolute, input)? {
            Resolution::Resolved(real) => Ok(real),
            Resolution::Missing => Ok(absolute),
        }
    }

    /// Ask the OS to canonicalize `path`.
    ///
    /// A dangling symlink at the leaf is a resolution failure, not a missing
    /// path: the link exists, its target does not. Cycles (`ELOOP`) and any
    /// other OS error are resolution failures too.
    pub fn resolve_symlinks(&self, path: &Path, input: &str) -> Result<Resolution, PathError> {
        match std::fs::canonicalize(path) {
            Ok(real) => Ok(Resolution::Resolved(real)),
            Err(e) if is_missing(&e) => match std::fs::symlink_metadata(path) {
                Ok(meta) if meta.file_type().is_symlink() => Err(PathError::SymlinkResolutionFailed {
                    input: input.to_string(),
                    reason: format!("dangling symbolic link at {}", path.display()),
                }),
                _ => Ok(Resolution::Missing),
            },
            Err(e) => Err(PathError::SymlinkResolutionFailed {
                input: input.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Real location of a possibly nonexistent path: canonicalize the deepest
    /// existing ancestor and re-append the missing tail.
    pub fn resolve_existing_prefix(&self, path: &Path, input: &str) -> Result<PathBuf, PathError> {
        let mut tail: Vec<&OsStr> = Vec::new();
        let mut current = path;

        loop {
            match self.resolve_symlinks(current, input)? {
                Resolution::Resolved(mut real) => {
                    for part in tail.iter().rev() {
                        real.push(part);
                    }
                    return Ok(real);
                }
                Resolution::Missing => match (current.parent(), current.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name);
                        current = parent;
                    }
                    _ => return Ok(path.to_path_buf()),
                },
            }
        }
    }
}

fn is_missing(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory)
}

// ============================================================================
// TESTS
// ============================================================================
