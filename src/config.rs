// Path Gate - Configuration
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Read once at startup: defaults < JSON file < environment < CLI flags.
// build_validator() performs the one-time Allowed-Path Set build; nothing
// here is consulted again after that.

use crate::allowlist::AllowedPaths;
use crate::paths::{self, Resolver};
use crate::validate::PathValidator;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_ALLOWED_PATHS: &str = "PATH_GATE_ALLOWED_PATHS";
pub const ENV_WORKSPACE: &str = "PATH_GATE_WORKSPACE";
pub const ENV_EXPAND_TILDE: &str = "PATH_GATE_EXPAND_TILDE";
pub const ENV_AUDIT_LOG: &str = "PATH_GATE_AUDIT_LOG";

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Separator-delimited allowed directories (`~:/tmp`)
    pub allowed_paths: String,
    /// Anchor for relative paths; process CWD when unset
    pub workspace_root: Option<PathBuf>,
    /// When false, any caller path starting with `~` is rejected
    pub expand_tilde: bool,
    /// Override for the platform home directory
    pub home_dir: Option<PathBuf>,
    pub max_read_bytes: u64,
    pub max_find_results: usize,
    pub fetch_timeout_secs: u64,
    pub max_fetch_chars: usize,
    /// Append-only call log; disabled when unset
    pub audit_log: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_paths: default_allowed_paths(),
            workspace_root: None,
            expand_tilde: true,
            home_dir: None,
            max_read_bytes: 1_048_576,
            max_find_results: 1000,
            fetch_timeout_secs: 30,
            max_fetch_chars: 50_000,
            audit_log: None,
        }
    }
}

/// `~` plus the system temp directory.
fn default_allowed_paths() -> String {
    if cfg!(windows) {
        format!("~{}{}", paths::PATH_LIST_SEPARATOR, std::env::temp_dir().display())
    } else {
        "~:/tmp".to_string()
    }
}

impl GatewayConfig {
    /// Load config from JSON file, falling back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            let config: Self = serde_json::from_str(&content)
                .with_context(|| format!("Invalid config JSON in {:?}", path))?;
            Ok(config)
        } else {
            log::warn!("Config not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save config to JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `PATH_GATE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup(ENV_ALLOWED_PATHS).filter(|v| !v.trim().is_empty()) {
            self.allowed_paths = list;
        }
        if let Some(root) = lookup(ENV_WORKSPACE).filter(|v| !v.trim().is_empty()) {
            self.workspace_root = Some(PathBuf::from(root));
        }
        if let Some(flag) = lookup(ENV_EXPAND_TILDE) {
            self.expand_tilde = parse_flag(&flag);
        }
        if let Some(log_path) = lookup(ENV_AUDIT_LOG).filter(|v| !v.trim().is_empty()) {
            self.audit_log = Some(PathBuf::from(log_path));
        }
    }

    /// Build the immutable validation context.
    ///
    /// Configured entries are trusted: `~` in them always expands, whatever
    /// `expand_tilde` says about caller input.
    pub fn build_validator(&self) -> Result<PathValidator> {
        let cwd = std::env::current_dir().context("Cannot determine current directory")?;
        let home = self.home_dir.clone().or_else(paths::home_dir);

        let bootstrap = Resolver::new(&cwd, home.clone(), true);
        let workspace = match &self.workspace_root {
            Some(root) => bootstrap
                .resolve_lenient(&root.to_string_lossy())
                .with_context(|| format!("Invalid workspace root {:?}", root))?,
            None => cwd.canonicalize().unwrap_or(cwd),
        };

        let entry_resolver = Resolver::new(&workspace, home.clone(), true);
        let allowed = AllowedPaths::parse(&self.allowed_paths, &entry_resolver)
            .with_context(|| format!("Invalid allowed_paths '{}'", self.allowed_paths))?;

        log::info!("Workspace root: {}", workspace.display());
        if !self.expand_tilde {
            log::info!("Tilde expansion disabled for caller paths");
        }

        Ok(PathValidator::new(allowed, Resolver::new(&workspace, home, self.expand_tilde)))
    }
}

/// `0`, `false`, `no`, `off` (any case) are false; everything else is true.
pub fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

// ============================================================================
// TESTS
// ============================================================================
