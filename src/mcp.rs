// Path Gate - MCP Server (JSON-RPC 2.0 over stdio)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every tool call lands here, and every path-bearing argument is handed to
// the PathValidator (via fs / archive / web) before anything touches disk.
// Exposes: read_files, write_files, list_directory, find_files, file_info,
//          create_directory, move_paths, delete_paths, archive_create,
//          archive_extract, fetch_url, download_url,
//          list_allowed_directories, check_path

use crate::archive;
use crate::config::GatewayConfig;
use crate::error::PathError;
use crate::fs::{self, EntryKind, ReadOptions};
use crate::validate::{BoundaryIntent, Intent, PathValidator};
use crate::web::WebClient;
use anyhow::Result;
use chrono::Local;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "path-gate";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const METHOD_NOT_FOUND: i64 = -32601;

// ============================================================================
// TOOL ARGUMENTS
// ============================================================================

#[derive(Deserialize)]
struct ReadArgs {
    paths: Vec<String>,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct WriteItem {
    path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

#[derive(Deserialize)]
struct WriteArgs {
    files: Vec<WriteItem>,
}

#[derive(Deserialize)]
struct ListArgs {
    path: String,
    #[serde(default = "default_depth")]
    depth: usize,
}

fn default_depth() -> usize {
    1
}

#[derive(Deserialize)]
struct FindArgs {
    path: String,
    pattern: String,
    max_results: Option<usize>,
}

#[derive(Deserialize)]
struct InfoArgs {
    paths: Vec<String>,
    #[serde(default)]
    checksum: bool,
}

#[derive(Deserialize)]
struct PathsArgs {
    paths: Vec<String>,
}

#[derive(Deserialize)]
struct MoveItem {
    source: String,
    destination: String,
}

#[derive(Deserialize)]
struct MoveArgs {
    moves: Vec<MoveItem>,
}

#[derive(Deserialize)]
struct DeleteArgs {
    paths: Vec<String>,
    #[serde(default)]
    recursive: bool,
}

#[derive(Deserialize)]
struct ArchiveCreateArgs {
    sources: Vec<String>,
    destination: String,
}

#[derive(Deserialize)]
struct ArchiveExtractArgs {
    archive: String,
    destination: String,
}

#[derive(Deserialize)]
struct FetchArgs {
    url: String,
    max_chars: Option<usize>,
}

#[derive(Deserialize)]
struct DownloadArgs {
    url: String,
    save_path: String,
}

#[derive(Deserialize)]
struct CheckArgs {
    path: String,
    intent: BoundaryIntent,
}

// ============================================================================
// TOOL OUTPUT
// ============================================================================

/// Text block returned to the caller.
#[derive(Debug)]
struct ToolOutput {
    text: String,
    is_error: bool,
}

impl ToolOutput {
    fn ok(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: false }
    }

    fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: true }
    }

    fn into_result(self) -> Value {
        json!({
            "content": [{"type": "text", "text": self.text}],
            "isError": self.is_error,
        })
    }
}

/// `[KIND] message`. Path failures keep their classified kind; anything
/// else is reported under `fallback`.
fn failure_line(err: &anyhow::Error, fallback: &str) -> String {
    match err.downcast_ref::<PathError>() {
        Some(path_err) => format!("[{}] {}", path_err.kind().code(), path_err),
        None => format!("[{}] {:#}", fallback, err),
    }
}

/// Run `op` on every item; one failure never aborts the rest.
/// The result is an error only when every item failed.
fn batch<T, F>(items: &[T], fallback: &str, mut op: F) -> ToolOutput
where
    F: FnMut(&T) -> Result<String>,
{
    if items.is_empty() {
        return ToolOutput::error("[INVALID_ARGUMENTS] no items given");
    }

    let mut blocks = Vec::with_capacity(items.len());
    let mut failures = 0;
    for item in items {
        match op(item) {
            Ok(text) => blocks.push(text),
            Err(e) => {
                failures += 1;
                blocks.push(failure_line(&e, fallback));
            }
        }
    }

    ToolOutput { text: blocks.join("\n\n"), is_error: failures == items.len() }
}

fn single(result: Result<String>, fallback: &str) -> ToolOutput {
    match result {
        Ok(text) => ToolOutput::ok(text),
        Err(e) => ToolOutput::error(failure_line(&e, fallback)),
    }
}

fn parse_args<T: DeserializeOwned>(args: &Value) -> std::result::Result<T, ToolOutput> {
    serde_json::from_value(args.clone()).map_err(|e| ToolOutput::error(format!("[INVALID_ARGUMENTS] {}", e)))
}

// ============================================================================
// TOOL DEFINITIONS
// ============================================================================

/// MCP tool definition helper
fn tool_def(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

fn string_array(description: &str) -> Value {
    json!({"type": "array", "items": {"type": "string"}, "description": description})
}

/// Return all tool definitions
fn tool_definitions() -> Vec<Value> {
    vec![
        // ====== FILE OPERATIONS ======
        tool_def(
            "read_files",
            "Read one or more UTF-8 text files. Optional line window via offset (0-based) and limit.",
            json!({
                "paths": string_array("Files to read"),
                "offset": {"type": "integer", "description": "First line, 0-based"},
                "limit": {"type": "integer", "description": "Max lines per file"}
            }),
            vec!["paths"],
        ),
        tool_def(
            "write_files",
            "Write (or append) text files. Missing parent directories are created.",
            json!({
                "files": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": {"type": "string"},
                            "content": {"type": "string"},
                            "append": {"type": "boolean"}
                        },
                        "required": ["path", "content"]
                    }
                }
            }),
            vec!["files"],
        ),
        tool_def(
            "list_directory",
            "List directory entries with kind and size. depth=1 lists direct children.",
            json!({
                "path": {"type": "string", "description": "Directory to list"},
                "depth": {"type": "integer", "description": "Recursion depth (default 1)"}
            }),
            vec!["path"],
        ),
        tool_def(
            "find_files",
            "Find files under a directory by glob pattern (e.g. *.rs, src/**/mod.rs).",
            json!({
                "path": {"type": "string", "description": "Directory to search"},
                "pattern": {"type": "string", "description": "Glob pattern"},
                "max_results": {"type": "integer", "description": "Result cap"}
            }),
            vec!["path", "pattern"],
        ),
        tool_def(
            "file_info",
            "Metadata for files or directories: kind, size, modified time, MIME type, optional SHA-256.",
            json!({
                "paths": string_array("Paths to inspect"),
                "checksum": {"type": "boolean", "description": "Compute SHA-256 for files"}
            }),
            vec!["paths"],
        ),
        tool_def(
            "create_directory",
            "Create directories (with missing intermediate directories under an allowed root).",
            json!({"paths": string_array("Directories to create")}),
            vec!["paths"],
        ),
        tool_def(
            "move_paths",
            "Move or rename files and directories. Never overwrites an existing destination.",
            json!({
                "moves": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "source": {"type": "string"},
                            "destination": {"type": "string"}
                        },
                        "required": ["source", "destination"]
                    }
                }
            }),
            vec!["moves"],
        ),
        tool_def(
            "delete_paths",
            "Delete files, symlinks or directories. Non-empty directories need recursive=true.",
            json!({
                "paths": string_array("Paths to delete"),
                "recursive": {"type": "boolean"}
            }),
            vec!["paths"],
        ),

        // ====== ARCHIVES ======
        tool_def(
            "archive_create",
            "Create a zip archive from files and directories.",
            json!({
                "sources": string_array("Files or directories to include"),
                "destination": {"type": "string", "description": "Zip file to write"}
            }),
            vec!["sources", "destination"],
        ),
        tool_def(
            "archive_extract",
            "Extract a zip archive into a directory.",
            json!({
                "archive": {"type": "string", "description": "Zip file to read"},
                "destination": {"type": "string", "description": "Directory to extract into"}
            }),
            vec!["archive", "destination"],
        ),

        // ====== WEB ======
        tool_def(
            "fetch_url",
            "Fetch a public http(s) URL as readable text (HTML converted, JSON pretty-printed).",
            json!({
                "url": {"type": "string"},
                "max_chars": {"type": "integer", "description": "Truncate output to this many characters"}
            }),
            vec!["url"],
        ),
        tool_def(
            "download_url",
            "Download a public http(s) URL to a file.",
            json!({
                "url": {"type": "string"},
                "save_path": {"type": "string"}
            }),
            vec!["url", "save_path"],
        ),

        // ====== POLICY ======
        tool_def(
            "list_allowed_directories",
            "List the directories this server may access.",
            json!({}),
            vec![],
        ),
        tool_def(
            "check_path",
            "Validate a path for read, write or create without touching it. Returns the resolved path or the failure kind.",
            json!({
                "path": {"type": "string"},
                "intent": {"type": "string", "enum": ["read", "write", "create"]}
            }),
            vec!["path", "intent"],
        ),
    ]
}

// ============================================================================
// LOGGING
// ============================================================================

/// Summarize tool params for logging (truncate large values)
fn param_summary(name: &str, args: &Value) -> String {
    let short = |s: &str, max: usize| -> String {
        if s.chars().count() > max {
            format!("{}…", s.chars().take(max).collect::<String>())
        } else {
            s.to_string()
        }
    };
    let join_strings = |v: &Value| -> String {
        v.as_array()
            .map(|a| a.iter().filter_map(|s| s.as_str()).collect::<Vec<_>>().join(","))
            .unwrap_or_else(|| "?".to_string())
    };

    match name {
        "write_files" => {
            let items = args["files"].as_array().map(|a| a.as_slice()).unwrap_or(&[]);
            let parts: Vec<String> = items
                .iter()
                .map(|f| {
                    let len = f["content"].as_str().map(str::len).unwrap_or(0);
                    format!("{}({}b)", f["path"].as_str().unwrap_or("?"), len)
                })
                .collect();
            format!("files={}", short(&parts.join(","), 200))
        }
        "move_paths" => {
            let items = args["moves"].as_array().map(|a| a.as_slice()).unwrap_or(&[]);
            let parts: Vec<String> = items
                .iter()
                .map(|m| format!("{}->{}", m["source"].as_str().unwrap_or("?"), m["destination"].as_str().unwrap_or("?")))
                .collect();
            format!("moves={}", short(&parts.join(","), 200))
        }
        "fetch_url" | "download_url" => {
            format!("url={}", short(args["url"].as_str().unwrap_or("?"), 200))
        }
        "archive_create" => format!(
            "sources={} dest={}",
            short(&join_strings(&args["sources"]), 150),
            args["destination"].as_str().unwrap_or("?")
        ),
        _ if args.get("paths").is_some() => format!("paths={}", short(&join_strings(&args["paths"]), 200)),
        _ => {
            let path = args["path"].as_str().or_else(|| args["archive"].as_str());
            match (path, args["pattern"].as_str()) {
                (Some(p), Some(pat)) => format!("path={} pattern={}", p, pat),
                (Some(p), None) => format!("path={}", p),
                _ => short(&args.to_string(), 300),
            }
        }
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Everything a tool call needs. Immutable after construction.
pub struct Gateway {
    validator: PathValidator,
    web: WebClient,
    max_read_bytes: u64,
    max_find_results: usize,
    max_fetch_chars: usize,
    audit_log: Option<PathBuf>,
}

impl Gateway {
    pub fn new(validator: PathValidator, config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            validator,
            web: WebClient::new(config.fetch_timeout_secs)?,
            max_read_bytes: config.max_read_bytes,
            max_find_results: config.max_find_results,
            max_fetch_chars: config.max_fetch_chars,
            audit_log: config.audit_log.clone(),
        })
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    /// Persistent call log, one line per call and per failure
    fn audit(&self, msg: &str) {
        let Some(path) = &self.audit_log else {
            return;
        };
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut f) => {
                let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
                if let Err(e) = writeln!(f, "[{}] {}", ts, msg) {
                    log::warn!("audit log {:?} write failed: {}", path, e);
                }
            }
            Err(e) => log::warn!("audit log {:?} unavailable: {}", path, e),
        }
    }

    /// Handle one parsed JSON-RPC message. `None` for notifications.
    pub fn handle_message(&self, msg: &Value) -> Option<Value> {
        let method = msg["method"].as_str().unwrap_or("");
        let id = &msg["id"];
        let params = &msg["params"];

        log::debug!("Received: {}", method);

        let result = match method {
            "initialize" => json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION,
                }
            }),

            "notifications/initialized" => return None,

            "tools/list" => json!({ "tools": tool_definitions() }),

            "tools/call" => {
                let name = params["name"].as_str().unwrap_or("");
                let args = params.get("arguments").cloned().unwrap_or(json!({}));
                self.call_tool(name, &args)
            }

            "ping" => json!({}),

            _ => {
                if id.is_null() {
                    return None;
                }
                return Some(error_response(id, METHOD_NOT_FOUND, &format!("Unknown method: {}", method)));
            }
        };

        if id.is_null() {
            return None;
        }
        Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    /// Execute one tool and wrap its text as an MCP tool result.
    pub fn call_tool(&self, name: &str, args: &Value) -> Value {
        self.audit(&format!("CALL {} | {}", name, param_summary(name, args)));

        let output = self.dispatch(name, args);

        if output.is_error {
            let snippet: String = output.text.chars().take(200).collect();
            self.audit(&format!("FAIL {} | {}", name, snippet));
            log::warn!("{} failed: {}", name, snippet);
        }

        output.into_result()
    }

    fn dispatch(&self, name: &str, args: &Value) -> ToolOutput {
        let result = match name {
            "read_files" => parse_args(args).map(|a| self.read_files(a)),
            "write_files" => parse_args(args).map(|a| self.write_files(a)),
            "list_directory" => parse_args(args).map(|a| self.list_directory(a)),
            "find_files" => parse_args(args).map(|a| self.find_files(a)),
            "file_info" => parse_args(args).map(|a| self.file_info(a)),
            "create_directory" => parse_args(args).map(|a| self.create_directory(a)),
            "move_paths" => parse_args(args).map(|a| self.move_paths(a)),
            "delete_paths" => parse_args(args).map(|a| self.delete_paths(a)),
            "archive_create" => parse_args(args).map(|a| self.archive_create(a)),
            "archive_extract" => parse_args(args).map(|a| self.archive_extract(a)),
            "fetch_url" => parse_args(args).map(|a| self.fetch_url(a)),
            "download_url" => parse_args(args).map(|a| self.download_url(a)),
            "list_allowed_directories" => Ok(self.list_allowed_directories()),
            "check_path" => parse_args(args).map(|a| self.check_path(a)),
            _ => Err(ToolOutput::error(format!("Unknown tool: {}", name))),
        };
        result.unwrap_or_else(|invalid| invalid)
    }

    // ====== FILE OPERATIONS ======

    fn read_files(&self, args: ReadArgs) -> ToolOutput {
        let opts = ReadOptions { offset: args.offset, limit: args.limit, max_bytes: self.max_read_bytes };
        batch(&args.paths, "IO_ERROR", |raw| {
            let file = fs::read_file(&self.validator, raw, opts)?;
            Ok(format!(
                "=== {} (lines {}-{} of {}, {}) ===\n{}",
                file.path.display(),
                file.start_line,
                file.end_line,
                file.total_lines,
                fs::human_size(file.size),
                file.content
            ))
        })
    }

    fn write_files(&self, args: WriteArgs) -> ToolOutput {
        batch(&args.files, "IO_ERROR", |item| {
            let out = fs::write_file(&self.validator, &item.path, &item.content, item.append)?;
            let verb = if out.appended { "Appended" } else if out.created { "Created" } else { "Wrote" };
            Ok(format!("{} {} bytes: {}", verb, out.bytes, out.path.display()))
        })
    }

    fn list_directory(&self, args: ListArgs) -> ToolOutput {
        single(
            fs::list_directory(&self.validator, &args.path, args.depth).map(|entries| {
                if entries.is_empty() {
                    return format!("{} is empty", args.path);
                }
                entries
                    .iter()
                    .map(|e| match e.kind {
                        EntryKind::File => format!("[file] {} ({})", e.path, fs::human_size(e.size)),
                        kind => format!("[{}] {}", kind.as_str(), e.path),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
            "IO_ERROR",
        )
    }

    fn find_files(&self, args: FindArgs) -> ToolOutput {
        let max = args.max_results.unwrap_or(self.max_find_results).min(self.max_find_results);
        single(
            fs::find_files(&self.validator, &args.path, &args.pattern, max).map(|found| {
                let mut text = format!("{} match(es) for '{}' under {}", found.matches.len(), args.pattern, found.root.display());
                for m in &found.matches {
                    text.push('\n');
                    text.push_str(m);
                }
                if found.truncated {
                    text.push_str(&format!("\n[truncated at {} results]", max));
                }
                text
            }),
            "IO_ERROR",
        )
    }

    fn file_info(&self, args: InfoArgs) -> ToolOutput {
        batch(&args.paths, "IO_ERROR", |raw| {
            let info = fs::file_info(&self.validator, raw, args.checksum)?;
            Ok(serde_json::to_string_pretty(&info)?)
        })
    }

    fn create_directory(&self, args: PathsArgs) -> ToolOutput {
        batch(&args.paths, "IO_ERROR", |raw| {
            let path = fs::create_directory(&self.validator, raw)?;
            Ok(format!("Created directory: {}", path.display()))
        })
    }

    fn move_paths(&self, args: MoveArgs) -> ToolOutput {
        batch(&args.moves, "IO_ERROR", |m| {
            let (from, to) = fs::move_path(&self.validator, &m.source, &m.destination)?;
            Ok(format!("Moved {} -> {}", from.display(), to.display()))
        })
    }

    fn delete_paths(&self, args: DeleteArgs) -> ToolOutput {
        batch(&args.paths, "IO_ERROR", |raw| {
            let path = fs::delete_path(&self.validator, raw, args.recursive)?;
            Ok(format!("Deleted: {}", path.display()))
        })
    }

    // ====== ARCHIVES ======

    fn archive_create(&self, args: ArchiveCreateArgs) -> ToolOutput {
        single(
            archive::create_archive(&self.validator, &args.sources, &args.destination).map(|s| {
                format!(
                    "Created {} ({} files, {} directories, {} uncompressed)",
                    s.archive.display(),
                    s.files,
                    s.directories,
                    fs::human_size(s.bytes)
                )
            }),
            "IO_ERROR",
        )
    }

    fn archive_extract(&self, args: ArchiveExtractArgs) -> ToolOutput {
        single(
            archive::extract_archive(&self.validator, &args.archive, &args.destination).map(|s| {
                let mut text = format!(
                    "Extracted {} files, {} directories ({}) into {}",
                    s.files,
                    s.directories,
                    fs::human_size(s.bytes),
                    s.destination.display()
                );
                if !s.skipped.is_empty() {
                    text.push_str(&format!("\nSkipped unsafe entries: {}", s.skipped.join(", ")));
                }
                text
            }),
            "IO_ERROR",
        )
    }

    // ====== WEB ======

    fn fetch_url(&self, args: FetchArgs) -> ToolOutput {
        let max = args.max_chars.unwrap_or(self.max_fetch_chars);
        single(
            self.web.fetch(&args.url, max).map(|page| {
                let mut text = format!("{} [{}]\n\n{}", page.url, page.content_type, page.content);
                if page.truncated {
                    text.push_str(&format!("\n\n[truncated at {} characters]", max));
                }
                text
            }),
            "FETCH_ERROR",
        )
    }

    fn download_url(&self, args: DownloadArgs) -> ToolOutput {
        single(
            self.web.download(&self.validator, &args.url, &args.save_path).map(|d| {
                format!("Downloaded {} ({}, {}) to {}", args.url, fs::human_size(d.bytes as u64), d.content_type, d.path.display())
            }),
            "FETCH_ERROR",
        )
    }

    // ====== POLICY ======

    fn list_allowed_directories(&self) -> ToolOutput {
        let entries: Vec<String> = self.validator.allowed().entries().iter().map(|p| p.display().to_string()).collect();
        ToolOutput::ok(format!("Allowed directories:\n{}", entries.join("\n")))
    }

    fn check_path(&self, args: CheckArgs) -> ToolOutput {
        let intent = Intent::from(args.intent);
        match self.validator.validate(&args.path, intent) {
            Ok(path) => ToolOutput::ok(
                json!({"input": args.path, "intent": intent, "allowed": true, "path": path}).to_string(),
            ),
            Err(e) => ToolOutput::error(format!("[{}] {}", e.kind().code(), e)),
        }
    }

    // ====== TRANSPORT ======

    /// Serve line-delimited JSON-RPC on stdin/stdout until EOF.
    pub fn run(&self) {
        log::info!("Starting {} v{}", SERVER_NAME, SERVER_VERSION);

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    log::error!("stdin read error: {}", e);
                    continue;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let msg: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("JSON parse error: {}", e);
                    continue;
                }
            };

            if let Some(response) = self.handle_message(&msg) {
                write_message(&response);
            }
        }

        log::info!("stdin closed, shutting down");
    }
}

fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// One JSON document per line on stdout.
fn write_message(msg: &Value) {
    let text = match serde_json::to_string(msg) {
        Ok(t) => t,
        Err(e) => {
            log::error!("Failed to serialize response: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = out.write_all(text.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::AllowedPaths;
    use crate::paths::Resolver;
    use std::fs as stdfs;
    use tempfile::{tempdir, TempDir};

    fn gateway() -> (TempDir, PathBuf, Gateway) {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let root = base.join("root");
        stdfs::create_dir_all(&root).unwrap();
        stdfs::create_dir_all(base.join("outside")).unwrap();
        stdfs::write(root.join("hello.txt"), "hello\nworld\n").unwrap();
        stdfs::write(base.join("outside/secret.txt"), "secret").unwrap();

        let validator = PathValidator::new(AllowedPaths::from_entries([&root]), Resolver::new(&root, None, true));
        let config = GatewayConfig {
            audit_log: Some(base.join("audit.log")),
            ..GatewayConfig::default()
        };
        let gw = Gateway::new(validator, &config).unwrap();
        (dir, base, gw)
    }

    fn call(gw: &Gateway, name: &str, args: Value) -> (String, bool) {
        let result = gw.call_tool(name, &args);
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        (text, result["isError"].as_bool().unwrap())
    }

    #[test]
    fn initialize_and_list() {
        let (_dir, _base, gw) = gateway();
        let init = gw
            .handle_message(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .unwrap();
        assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["result"]["serverInfo"]["name"], SERVER_NAME);

        let list = gw.handle_message(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).unwrap();
        let names: Vec<&str> = list["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 14);
        assert!(names.contains(&"check_path"));
    }

    #[test]
    fn notifications_and_unknown_methods() {
        let (_dir, _base, gw) = gateway();
        assert!(gw.handle_message(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).is_none());
        assert!(gw.handle_message(&json!({"jsonrpc": "2.0", "method": "bogus"})).is_none());

        let err = gw.handle_message(&json!({"jsonrpc": "2.0", "id": 7, "method": "bogus"})).unwrap();
        assert_eq!(err["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(err["id"], 7);

        let pong = gw.handle_message(&json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})).unwrap();
        assert_eq!(pong["result"], json!({}));
    }

    #[test]
    fn partial_batch_is_not_an_error() {
        let (_dir, _base, gw) = gateway();
        let (text, is_error) = call(&gw, "read_files", json!({"paths": ["hello.txt", "../outside/secret.txt"]}));
        assert!(!is_error);
        assert!(text.contains("hello\nworld"));
        assert!(text.contains("[PERMISSION_DENIED]"));
        assert!(!text.contains("secret\n"));
    }

    #[test]
    fn all_failed_batch_is_an_error() {
        let (_dir, _base, gw) = gateway();
        let (text, is_error) = call(&gw, "read_files", json!({"paths": ["missing.txt", ""]}));
        assert!(is_error);
        assert!(text.contains("[NOT_FOUND]"));
        assert!(text.contains("[INVALID_PATH]"));
    }

    #[test]
    fn write_then_read_back() {
        let (_dir, base, gw) = gateway();
        let (text, is_error) = call(
            &gw,
            "write_files",
            json!({"files": [{"path": "sub/new.txt", "content": "abc"}, {"path": "sub/new.txt", "content": "def", "append": true}]}),
        );
        assert!(!is_error, "{}", text);
        assert_eq!(stdfs::read_to_string(base.join("root/sub/new.txt")).unwrap(), "abcdef");

        let (listing, _) = call(&gw, "list_directory", json!({"path": ".", "depth": 2}));
        assert!(listing.contains("[dir] sub"));
        assert!(listing.contains("[file] hello.txt"));
    }

    #[test]
    fn io_failures_fall_back_to_io_error() {
        let (_dir, _base, gw) = gateway();
        let (text, is_error) = call(&gw, "delete_paths", json!({"paths": ["."]}));
        assert!(is_error);
        assert!(text.starts_with("[IO_ERROR]"), "{}", text);
    }

    #[test]
    fn bad_arguments_are_reported() {
        let (_dir, _base, gw) = gateway();
        let (text, is_error) = call(&gw, "read_files", json!({"path": "hello.txt"}));
        assert!(is_error);
        assert!(text.starts_with("[INVALID_ARGUMENTS]"));

        let (text, is_error) = call(&gw, "no_such_tool", json!({}));
        assert!(is_error);
        assert!(text.contains("Unknown tool"));
    }

    #[test]
    fn check_path_accepts_only_boundary_intents() {
        let (_dir, base, gw) = gateway();
        let (text, is_error) = call(&gw, "check_path", json!({"path": "new/file.txt", "intent": "write"}));
        assert!(!is_error);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["path"], json!(base.join("root/new/file.txt")));

        let (text, is_error) = call(&gw, "check_path", json!({"path": "/etc/passwd", "intent": "unchecked"}));
        assert!(is_error);
        assert!(text.starts_with("[INVALID_ARGUMENTS]"));

        let (text, is_error) = call(&gw, "check_path", json!({"path": "../outside", "intent": "read"}));
        assert!(is_error);
        assert!(text.starts_with("[PERMISSION_DENIED]"));
    }

    #[test]
    fn allowed_directories_listed() {
        let (_dir, base, gw) = gateway();
        let (text, _) = call(&gw, "list_allowed_directories", json!({}));
        assert!(text.contains(&base.join("root").display().to_string()));
    }

    #[test]
    fn web_guards_run_before_network() {
        let (_dir, base, gw) = gateway();
        let (text, is_error) = call(&gw, "fetch_url", json!({"url": "http://127.0.0.1:9/"}));
        assert!(is_error);
        assert!(text.starts_with("[FETCH_ERROR]"));

        let target = base.join("outside/dl.bin");
        let (text, is_error) = call(
            &gw,
            "download_url",
            json!({"url": "https://example.com/file", "save_path": target.to_str().unwrap()}),
        );
        assert!(is_error);
        assert!(text.starts_with("[PERMISSION_DENIED]"));
        assert!(!target.exists());
    }

    #[test]
    fn calls_are_audited() {
        let (_dir, base, gw) = gateway();
        call(&gw, "read_files", json!({"paths": ["missing.txt"]}));
        let log = stdfs::read_to_string(base.join("audit.log")).unwrap();
        assert!(log.contains("CALL read_files | paths=missing.txt"));
        assert!(log.contains("FAIL read_files | [NOT_FOUND]"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failing_audit_log_does_not_break_calls() {
        let (_dir, _base, mut gw) = gateway();
        gw.audit_log = Some(PathBuf::from("/dev/full"));
        let (text, is_error) = call(&gw, "read_files", json!({"paths": ["hello.txt"]}));
        assert!(!is_error);
        assert!(text.contains("hello"));
    }

    #[test]
    fn param_summary_truncates() {
        let long = "x".repeat(500);
        let summary = param_summary("fetch_url", &json!({"url": long}));
        assert!(summary.ends_with('…'));
        assert!(summary.chars().count() < 220);
    }
}
