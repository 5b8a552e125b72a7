//! Resource Locator: normalizes the request URL and decides which part of
//! the server answers it.

use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

use crate::paths::{clean_path, resolve_under, trim_prefix};
use crate::routing::{fill_pattern, match_path};

pub const HMR_PATH: &str = "/_hmr";
pub const BUILD_PREFIX: &str = "/_aleph/";
pub const DATA_PREFIX: &str = "/_aleph/data/";
pub const MAIN_BUNDLE: &str = "/main.js";
pub const API_PREFIX: &str = "/api/";

/// Request URL after base-path stripping and rewrites
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// Decoded pathname
    pub pathname: String,
    pub query: Vec<(String, String)>,
    /// `query` serialized back to `a=1&b=2` form
    pub search: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Hmr,
    BuildAsset(BuildAsset),
    Static(PathBuf),
    Api,
    Page,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildAsset {
    /// `/_aleph/data/<base64url pathname>.json`
    SsrData { encoded: String },
    /// `/_aleph/main.js`
    MainBundle,
    /// Any other path below `/_aleph`, without that prefix
    Artifact { rel_path: String },
}

pub fn normalize(
    raw: &str,
    base_path: &str,
    rewrites: &IndexMap<String, String>,
) -> NormalizedUrl {
    let (raw_path, raw_query) = raw.split_once('?').unwrap_or((raw, ""));

    let mut pathname = percent_decode_str(raw_path).decode_utf8_lossy().into_owned();
    if base_path != "/" {
        pathname = trim_prefix(&pathname, base_path).to_string();
    }
    pathname = clean_path(&pathname);

    for (from, to) in rewrites {
        if let Some(params) = match_path(from, &pathname) {
            pathname = fill_pattern(to, &params);
            break;
        }
    }

    let query: Vec<(String, String)> = serde_urlencoded::from_str(raw_query).unwrap_or_default();
    let search = serde_urlencoded::to_string(&query).unwrap_or_default();

    NormalizedUrl {
        pathname,
        query,
        search,
    }
}

pub async fn classify(url: &NormalizedUrl, public_root: &Path) -> Resource {
    let pathname = url.pathname.as_str();

    if pathname == HMR_PATH {
        return Resource::Hmr;
    }

    if pathname.starts_with(BUILD_PREFIX) {
        return Resource::BuildAsset(classify_build_asset(pathname));
    }

    if pathname != "/" {
        let file = resolve_under(public_root, pathname);
        if let Ok(meta) = tokio::fs::metadata(&file).await {
            if meta.is_file() {
                return Resource::Static(file);
            }
        }
    }

    if pathname.starts_with(API_PREFIX) {
        return Resource::Api;
    }

    Resource::Page
}

fn classify_build_asset(pathname: &str) -> BuildAsset {
    if let Some(encoded) = pathname
        .strip_prefix(DATA_PREFIX)
        .and_then(|rest| rest.strip_suffix(".json"))
    {
        return BuildAsset::SsrData {
            encoded: encoded.to_string(),
        };
    }

    let rel_path = trim_prefix(pathname, "/_aleph");
    if rel_path == MAIN_BUNDLE {
        return BuildAsset::MainBundle;
    }
    BuildAsset::Artifact {
        rel_path: rel_path.to_string(),
    }
}
