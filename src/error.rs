// Path Gate - Classified Path Failures
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every validation either returns a canonical path or one of these.
// The OS error is classified once, where it is observed, never re-guessed
// from message strings downstream.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure kind, stable across releases. Surfaced to tool callers as `code()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidPath,
    NotFound,
    DirectoryNotFound,
    PermissionDenied,
    SymlinkResolutionFailed,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidPath => "INVALID_PATH",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::DirectoryNotFound => "DIRECTORY_NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::SymlinkResolutionFailed => "SYMLINK_RESOLUTION_FAILED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal failure of a single validation. `input` is always the caller's raw string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("invalid path '{input}': {reason}")]
    InvalidPath { input: String, reason: String },

    #[error("path not found: {input}")]
    NotFound { input: String },

    #[error("parent directory does not exist: {input}")]
    DirectoryNotFound { input: String },

    #[error("access denied - path outside allowed directories: {input} (resolved to {resolved})")]
    PermissionDenied { input: String, resolved: String },

    #[error("failed to resolve symlinks for {input}: {reason}")]
    SymlinkResolutionFailed { input: String, reason: String },
}

impl PathError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PathError::InvalidPath { .. } => ErrorKind::InvalidPath,
            PathError::NotFound { .. } => ErrorKind::NotFound,
            PathError::DirectoryNotFound { .. } => ErrorKind::DirectoryNotFound,
            PathError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            PathError::SymlinkResolutionFailed { .. } => ErrorKind::SymlinkResolutionFailed,
        }
    }

    /// The raw input the failure refers to.
    pub fn input(&self) -> &str {
        match self {
            PathError::InvalidPath { input, .. }
            | PathError::NotFound { input }
            | PathError::DirectoryNotFound { input }
            | PathError::PermissionDenied { input, .. }
            | PathError::SymlinkResolutionFailed { input, .. } => input,
        }
    }

    pub(crate) fn invalid(input: &str, reason: impl Into<String>) -> Self {
        PathError::InvalidPath { input: input.to_string(), reason: reason.into() }
    }

    pub(crate) fn not_found(input: &str) -> Self {
        PathError::NotFound { input: input.to_string() }
    }

    pub(crate) fn directory_not_found(input: &str) -> Self {
        PathError::DirectoryNotFound { input: input.to_string() }
    }

    pub(crate) fn denied(input: &str, resolved: &std::path::Path) -> Self {
        PathError::PermissionDenied {
            input: input.to_string(),
            resolved: resolved.display().to_string(),
        }
    }
}
