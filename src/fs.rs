// Path Gate - Filesystem Operations
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Real filesystem operations exposed as tools:
// read, write, list, find, info, mkdir, move, delete.
// Every raw path goes through PathValidator first; the fs calls below only
// ever see the path it hands back.

use crate::error::PathError;
use crate::validate::PathValidator;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

impl EntryKind {
    fn from_file_type(ft: fs::FileType) -> Self {
        if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Dir
        } else if ft.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
            EntryKind::Symlink => "symlink",
            EntryKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Zero-based first line
    pub offset: usize,
    /// Max lines; whole file when None
    pub limit: Option<usize>,
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub path: PathBuf,
    pub size: u64,
    pub total_lines: usize,
    /// 1-based, inclusive; 0 when the window is empty
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub bytes: usize,
    pub created: bool,
    pub appended: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    /// Relative to the listed directory
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindOutcome {
    pub root: PathBuf,
    pub matches: Vec<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Recursive total for directories
    pub size: u64,
    pub modified: Option<String>,
    pub readonly: bool,
    pub mime: Option<&'static str>,
    pub sha256: Option<String>,
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Read a UTF-8 text file, optionally a window of its lines.
pub fn read_file(validator: &PathValidator, raw: &str, opts: ReadOptions) -> Result<FileContent> {
    let path = validator.validate_read(raw)?;
    let meta = fs::metadata(&path).with_context(|| format!("Failed to stat {}", raw))?;

    if meta.is_dir() {
        bail!("{} is a directory; use list_directory", raw);
    }
    if meta.len() > opts.max_bytes {
        bail!("{} is {} bytes, over the {} byte read limit", raw, meta.len(), opts.max_bytes);
    }

    let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", raw))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| anyhow!("{} is not UTF-8 text; use file_info for binary files", raw))?;

    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    let start = opts.offset.min(total);
    let end = match opts.limit {
        Some(limit) => start.saturating_add(limit).min(total),
        None => total,
    };

    let content = if start == 0 && end == total {
        text.clone()
    } else {
        lines[start..end].join("\n")
    };

    Ok(FileContent {
        path,
        size: meta.len(),
        total_lines: total,
        start_line: if end > start { start + 1 } else { 0 },
        end_line: end,
        content,
    })
}

/// Write (or append) text, creating missing parent directories.
pub fn write_file(validator: &PathValidator, raw: &str, content: &str, append: bool) -> Result<WriteOutcome> {
    let path = validator.validate_write(raw)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directories for {}", raw))?;
    }

    let created = !path.exists();
    if append {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {} for append", raw))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to append to {}", raw))?;
    } else {
        fs::write(&path, content).with_context(|| format!("Failed to write {}", raw))?;
    }

    Ok(WriteOutcome { path, bytes: content.len(), created, appended: append })
}

/// List a directory, recursing `depth` levels (1 = direct children).
/// Symlinks are reported, never followed.
pub fn list_directory(validator: &PathValidator, raw: &str, depth: usize) -> Result<Vec<DirEntry>> {
    let root = validator.validate_read(raw)?;
    if !root.is_dir() {
        bail!("{} is not a directory", raw);
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(depth.max(1))
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to list {}", raw))?;
        let kind = EntryKind::from_file_type(entry.file_type());
        let size = match kind {
            EntryKind::File => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        };
        entries.push(DirEntry { path: relative(&root, entry.path()), kind, size });
    }

    Ok(entries)
}

/// Glob search beneath a directory. The pattern is matched against the
/// root-relative path and against the bare file name.
pub fn find_files(validator: &PathValidator, raw: &str, pattern: &str, max_results: usize) -> Result<FindOutcome> {
    let root = validator.validate_read(raw)?;
    if !root.is_dir() {
        bail!("{} is not a directory", raw);
    }

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .with_context(|| format!("Invalid glob pattern '{}'", pattern))?
        .compile_matcher();

    let mut matches = Vec::new();
    let mut truncated = false;

    for entry in WalkDir::new(&root).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::debug!("find: skipping unreadable entry: {}", e);
                continue;
            }
        };

        let rel = relative(&root, entry.path());
        if matcher.is_match(&rel) || matcher.is_match(entry.file_name()) {
            if matches.len() >= max_results {
                truncated = true;
                break;
            }
            matches.push(rel);
        }
    }

    Ok(FindOutcome { root, matches, truncated })
}

/// Metadata, MIME guess, and optionally a SHA-256 of a file or directory.
pub fn file_info(validator: &PathValidator, raw: &str, checksum: bool) -> Result<FileInfo> {
    let path = validator.validate_read(raw)?;
    let meta = fs::metadata(&path).with_context(|| format!("Failed to stat {}", raw))?;
    let kind = EntryKind::from_file_type(meta.file_type());

    let size = if meta.is_dir() { dir_size(&path) } else { meta.len() };
    let mime = if meta.is_file() { Some(sniff_mime(&path)) } else { None };
    let sha256 = if checksum && meta.is_file() { Some(sha256_file(&path)?) } else { None };

    Ok(FileInfo {
        path,
        kind,
        size,
        modified: meta.modified().ok().map(format_time),
        readonly: meta.permissions().readonly(),
        mime,
        sha256,
    })
}

/// mkdir -p on a Create-validated path.
pub fn create_directory(validator: &PathValidator, raw: &str) -> Result<PathBuf> {
    let path = validator.validate_create(raw)?;
    fs::create_dir_all(&path).with_context(|| format!("Failed to create directory {}", raw))?;
    Ok(path)
}

/// Rename `source` to `destination`. Never overwrites.
pub fn move_path(validator: &PathValidator, source: &str, destination: &str) -> Result<(PathBuf, PathBuf)> {
    let from = validator.validate_write(source)?;
    if fs::symlink_metadata(&from).is_err() {
        return Err(PathError::not_found(source).into());
    }
    if is_allowed_root(validator, &from) {
        bail!("refusing to move allowed root {}", source);
    }

    let to = validator.validate_create(destination)?;
    if fs::symlink_metadata(&to).is_ok() {
        bail!("destination already exists: {}", destination);
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directories for {}", destination))?;
    }

    fs::rename(&from, &to).with_context(|| format!("Failed to move {} to {}", source, destination))?;
    Ok((from, to))
}

/// Remove a file, symlink, or directory. Symlinks are removed, not followed.
pub fn delete_path(validator: &PathValidator, raw: &str, recursive: bool) -> Result<PathBuf> {
    let path = validator.validate_write(raw)?;
    let meta = fs::symlink_metadata(&path).map_err(|_| PathError::not_found(raw))?;

    if is_allowed_root(validator, &path) {
        bail!("refusing to delete allowed root {}", raw);
    }

    if meta.is_dir() {
        if recursive {
            fs::remove_dir_all(&path).with_context(|| format!("Failed to delete {}", raw))?;
        } else {
            fs::remove_dir(&path).with_context(|| {
                format!("Failed to delete {} (non-empty directories need recursive=true)", raw)
            })?;
        }
    } else {
        fs::remove_file(&path).with_context(|| format!("Failed to delete {}", raw))?;
    }

    Ok(path)
}

// ============================================================================
// HELPERS
// ============================================================================

fn is_allowed_root(validator: &PathValidator, path: &Path) -> bool {
    validator.allowed().contains(path)
        || fs::canonicalize(path).map(|real| validator.allowed().contains(&real)).unwrap_or(false)
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string()
}

/// Total bytes of regular files beneath `path`. Links are not followed;
/// unreadable entries are skipped.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// SHA256 of a file's contents as hex, streamed.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).with_context(|| format!("Failed to hash {:?}", path))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Magic bytes first, extension second.
pub fn sniff_mime(path: &Path) -> &'static str {
    let mut head = [0u8; 16];
    let n = fs::File::open(path).and_then(|mut f| f.read(&mut head)).unwrap_or(0);
    let head = &head[..n];

    const MAGIC: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
        (b"\x7fELF", "application/x-elf"),
    ];
    if let Some(mime) = MAGIC.iter().find(|(magic, _)| head.starts_with(magic)).map(|(_, mime)| *mime) {
        return mime;
    }
    if head.starts_with(b"RIFF") && head.get(8..12) == Some(b"WEBP".as_slice()) {
        return "image/webp";
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "rs" | "py" | "go" | "c" | "h" | "cpp" | "ts" | "sh" => "text/plain",
        "svg" => "image/svg+xml",
        _ if !head.is_empty() && std::str::from_utf8(head).is_ok() => "text/plain",
        _ => "application/octet-stream",
    }
}

fn format_time(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339()
}

/// 1536 -> "1.5 KB"
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

// ============================================================================
// TESTS
// ============================================================================
