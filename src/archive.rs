// Path Gate - Zip Archives
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Pack files and directory trees into a zip, and unpack one onto disk.
// Extraction never trusts entry names: unsafe names are refused and every
// output path goes back through the validator before it is opened.

use crate::validate::PathValidator;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub archive: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub destination: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    /// Entry names refused as unsafe
    pub skipped: Vec<String>,
}

/// Zip `sources` into `destination`. A source directory is stored with
/// its own name as the top-level entry.
pub fn create_archive(validator: &PathValidator, sources: &[String], destination: &str) -> Result<ArchiveSummary> {
    if sources.is_empty() {
        bail!("no sources given");
    }

    // Validate everything before creating the output file.
    let mut resolved = Vec::with_capacity(sources.len());
    for source in sources {
        resolved.push(validator.validate_read(source)?);
    }
    let dest = validator.validate_write(destination)?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create parent for {}", destination))?;
    }
    let file = File::create(&dest).with_context(|| format!("Failed to create {}", destination))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut summary = ArchiveSummary { archive: dest.clone(), files: 0, directories: 0, bytes: 0 };

    for source in &resolved {
        let base = source.parent().unwrap_or(source.as_path());

        for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
            let path = entry.path();
            // The archive being written may sit inside a source tree.
            if path == dest {
                continue;
            }
            let name = entry_name(base, path);
            if name.is_empty() {
                continue;
            }

            if entry.file_type().is_dir() {
                zip.add_directory(format!("{}/", name), options)?;
                summary.directories += 1;
            } else if entry.file_type().is_file() {
                zip.start_file(name, options)?;
                let mut input = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
                summary.bytes += io::copy(&mut input, &mut zip)
                    .with_context(|| format!("Failed to compress {}", path.display()))?;
                summary.files += 1;
            } else {
                log::debug!("archive: skipping non-regular entry {}", path.display());
            }
        }
    }

    zip.finish().context("Failed to finalize archive")?;
    log::info!("Archived {} files into {}", summary.files, dest.display());
    Ok(summary)
}

/// Unpack `archive` under `destination`. Existing files are overwritten
/// only if the validator still approves their location.
pub fn extract_archive(validator: &PathValidator, archive: &str, destination: &str) -> Result<ExtractSummary> {
    let source = validator.validate_read(archive)?;
    let dest = validator.validate_create(destination)?;

    let file = File::open(&source).with_context(|| format!("Failed to open {}", archive))?;
    let mut zip = ZipArchive::new(file).with_context(|| format!("{} is not a valid zip archive", archive))?;

    fs::create_dir_all(&dest).with_context(|| format!("Failed to create {}", destination))?;

    let mut summary = ExtractSummary {
        destination: dest.clone(),
        files: 0,
        directories: 0,
        bytes: 0,
        skipped: Vec::new(),
    };

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).context("Failed to read zip entry")?;
        let name = entry.name().to_string();

        let Some(relative) = safe_entry_path(&name) else {
            log::warn!("archive: refusing unsafe entry name '{}' in {}", name, archive);
            summary.skipped.push(name);
            continue;
        };

        // Re-validate the concrete output path; a link planted by an earlier
        // entry or already on disk must not redirect the write.
        let target = dest.join(&relative);
        let out_path = validator.validate_write(&target.to_string_lossy())?;

        if entry.is_dir() {
            fs::create_dir_all(&out_path).with_context(|| format!("Failed to create {}", out_path.display()))?;
            summary.directories += 1;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let mut output =
                File::create(&out_path).with_context(|| format!("Failed to create {}", out_path.display()))?;
            summary.bytes += io::copy(&mut entry, &mut output).with_context(|| format!("Failed to extract {}", name))?;
            summary.files += 1;
        }
    }

    log::info!("Extracted {} files into {}", summary.files, dest.display());
    Ok(summary)
}

/// Forward-slash entry name for `path` relative to `base`.
fn entry_name(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Relative path for an entry name, or None if it is absolute, climbs with
/// `..`, carries a drive prefix, or is empty.
fn safe_entry_path(name: &str) -> Option<PathBuf> {
    if name.contains('\0') || name.starts_with('/') || name.starts_with('\\') {
        return None;
    }

    let mut out = PathBuf::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return None,
            p if p.contains(':') => return None,
            p => out.push(p),
        }
    }

    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

// ============================================================================
// TESTS
// ============================================================================
