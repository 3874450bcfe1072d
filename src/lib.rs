// Path Gate - Library Root
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// All modules exported here for use by the binary and tests.

// ============================================================================
// PATH ENGINE
// ============================================================================

pub mod error;
pub mod paths;
pub mod allowlist;
pub mod validate;
pub mod config;

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Real filesystem operations over validated paths
pub mod fs;

/// Zip create / extract
pub mod archive;

/// URL fetch and download
pub mod web;

/// JSON-RPC stdio transport and tool dispatch
pub mod mcp;

pub use allowlist::AllowedPaths;
pub use error::{ErrorKind, PathError};
pub use paths::Resolver;
pub use validate::{BoundaryIntent, Intent, PathValidator};
