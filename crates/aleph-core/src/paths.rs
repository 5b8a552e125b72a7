//! Path and content-type helpers shared by the locator, the gateway and
//! the HMR channel.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Source extensions tried, in order, when compiling a module on demand
pub const MODULE_EXTS: &[&str] = &["tsx", "jsx", "ts", "js", "mjs"];

/// Collapse `.`, `..` and empty segments. The result always starts with `/`
/// and never climbs above the root.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(seg),
        }
    }
    format!("/{}", segments.join("/"))
}

pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect()
}

pub fn trim_prefix<'a>(s: &'a str, prefix: &str) -> &'a str {
    s.strip_prefix(prefix).unwrap_or(s)
}

pub fn trim_suffix<'a>(s: &'a str, suffix: &str) -> &'a str {
    s.strip_suffix(suffix).unwrap_or(s)
}

pub fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("https://") || specifier.starts_with("http://")
}

pub fn module_ext(specifier: &str) -> Option<&'static str> {
    let (_, ext) = specifier.rsplit_once('.')?;
    MODULE_EXTS.iter().copied().find(|known| *known == ext)
}

/// `/pages/index.tsx` -> `/pages/index`; non-module specifiers are unchanged.
pub fn trim_module_ext(specifier: &str) -> &str {
    match module_ext(specifier) {
        Some(ext) => &specifier[..specifier.len() - ext.len() - 1],
        None => specifier,
    }
}

/// Build-relative JS path of a module (`/pages/index.tsx` -> `/pages/index.js`)
pub fn js_file_of(specifier: &str) -> String {
    clean_path(&format!("{}.js", trim_module_ext(specifier)))
}

/// Join a URL-style path below `root`. The path is cleaned first so the
/// result cannot escape `root`.
pub fn resolve_under(root: &Path, url_path: &str) -> PathBuf {
    let cleaned = clean_path(url_path);
    let rel = cleaned.trim_start_matches('/');
    if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

pub fn decode_base64_url(encoded: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

pub fn encode_base64_url(raw: &str) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}

/// IMF-fixdate, as used by `Last-Modified` and `If-Modified-Since`
pub fn http_date(time: SystemTime) -> String {
    let time: chrono::DateTime<chrono::Utc> = time.into();
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Content type for a file, with a UTF-8 charset on textual types
pub fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let essence = mime.essence_str();
    let textual = mime.type_() == mime_guess::mime::TEXT
        || matches!(
            essence,
            "application/javascript" | "application/json" | "image/svg+xml"
        );
    if textual {
        format!("{essence}; charset=utf-8")
    } else {
        essence.to_string()
    }
}
