// Path Gate - Web Fetch
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Fetch a URL as readable text, or download it to a validated path.
// Every URL (and every redirect hop) passes check_url() first; download
// targets pass the path validator with Write intent before any request
// is sent.

use crate::validate::PathValidator;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::redirect;
use reqwest::Url;
use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::time::Duration;

const MAX_REDIRECTS: usize = 5;
const TEXT_WIDTH: usize = 120;

#[derive(Debug, Clone, Serialize)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: String,
    /// Body size before conversion
    pub raw_bytes: usize,
    pub content: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Download {
    pub path: PathBuf,
    pub bytes: usize,
    pub content_type: String,
}

// ============================================================================
// URL GUARD
// ============================================================================

/// Refuse anything that is not plain http(s) to a public host.
///
/// The host is taken from the same parser the HTTP client uses, so
/// userinfo, backslashes and numeric host spellings (`0x7f.1`) are seen
/// exactly as the connection will see them.
pub fn check_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| anyhow!("blocked: unparseable URL {}: {}", url, e))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("blocked: only http/https URLs are allowed: {}", url);
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow!("blocked: URL has no host: {}", url))?
        .to_ascii_lowercase();
    // IPv6 literals come back bracketed
    let host = host.trim_start_matches('[').trim_end_matches(']').trim_end_matches('.');

    if host == "localhost" || host.ends_with(".localhost") {
        bail!("blocked: loopback host: {}", host);
    }

    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        if let Some(reason) = blocked_v4(addr) {
            bail!("blocked: {} address: {}", reason, host);
        }
    }

    if let Ok(addr) = host.parse::<Ipv6Addr>() {
        if addr.is_loopback() || addr.is_unspecified() {
            bail!("blocked: IPv6 loopback: {}", host);
        }
        if let Some(mapped) = addr.to_ipv4_mapped() {
            if let Some(reason) = blocked_v4(mapped) {
                bail!("blocked: IPv4-mapped {} address: {}", reason, host);
            }
        }
        let first = addr.segments()[0];
        if first & 0xffc0 == 0xfe80 {
            bail!("blocked: IPv6 link-local: {}", host);
        }
        if first & 0xfe00 == 0xfc00 {
            bail!("blocked: IPv6 unique-local: {}", host);
        }
    }

    Ok(())
}

fn blocked_v4(addr: Ipv4Addr) -> Option<&'static str> {
    if addr.is_loopback() {
        Some("loopback")
    } else if addr.is_unspecified() || addr.is_broadcast() {
        Some("unroutable")
    } else if addr.is_private() {
        Some("private network")
    } else if addr.is_link_local() {
        // 169.254.0.0/16, includes the common metadata endpoint
        Some("link-local")
    } else if addr == Ipv4Addr::new(100, 100, 100, 200) {
        Some("cloud metadata")
    } else {
        None
    }
}

// ============================================================================
// CONTENT SHAPING
// ============================================================================

/// JSON pretty-printed, HTML converted to text, anything else as-is.
pub fn shape_body(content_type: &str, body: String) -> String {
    if content_type.contains("json") {
        return match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(parsed) => serde_json::to_string_pretty(&parsed).unwrap_or(body),
            Err(_) => body,
        };
    }

    if content_type.contains("html") || body.trim_start().starts_with('<') {
        return html2text::from_read(body.as_bytes(), TEXT_WIDTH);
    }

    body
}

/// Keep at most `max_chars` characters, cutting on a char boundary.
pub fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text, false),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct WebClient {
    client: Client,
}

impl WebClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        // Redirects are re-checked hop by hop; a public URL must not bounce
        // the request onto an internal address.
        let policy = redirect::Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if let Err(e) = check_url(attempt.url().as_str()) {
                attempt.error(e.to_string())
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .user_agent(concat!("path-gate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(policy)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch `url` and return readable text, at most `max_chars` characters.
    pub fn fetch(&self, url: &str, max_chars: usize) -> Result<FetchedPage> {
        check_url(url)?;

        let resp = self.client.get(url).send().with_context(|| format!("Fetch failed: {}", url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {}: {}", status.as_u16(), url);
        }

        let content_type = header_content_type(&resp, "");
        let body = resp.text().context("Failed to read response body")?;
        let raw_bytes = body.len();

        let (content, truncated) = truncate_chars(shape_body(&content_type, body), max_chars);
        log::debug!("fetched {} ({} bytes, truncated: {})", url, raw_bytes, truncated);

        Ok(FetchedPage { url: url.to_string(), content_type, raw_bytes, content, truncated })
    }

    /// Download `url` to `save_path`. The path is validated before the request.
    pub fn download(&self, validator: &PathValidator, url: &str, save_path: &str) -> Result<Download> {
        check_url(url)?;
        let path = validator.validate_write(save_path)?;

        let resp = self.client.get(url).send().with_context(|| format!("Download failed: {}", url))?;
        if !resp.status().is_success() {
            bail!("HTTP {}: {}", resp.status().as_u16(), url);
        }

        let content_type = header_content_type(&resp, "unknown");
        let bytes = resp.bytes().context("Failed to read response body")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create parent for {}", save_path))?;
        }
        std::fs::write(&path, &bytes).with_context(|| format!("Failed to write {}", save_path))?;

        log::info!("downloaded {} -> {} ({} bytes)", url, path.display(), bytes.len());
        Ok(Download { path, bytes: bytes.len(), content_type })
    }
}

fn header_content_type(resp: &reqwest::blocking::Response, fallback: &str) -> String {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback)
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================
