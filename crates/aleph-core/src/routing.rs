//! Route patterns and the route tables for pages and API modules.
//!
//! Patterns use `[name]` (or `$name`) for a single dynamic segment and
//! `[...name]` for a trailing catch-all.

use indexmap::IndexMap;
use parking_lot::RwLock;
use percent_encoding::percent_decode_str;

use crate::paths::{clean_path, split_path, trim_module_ext};

pub type Params = IndexMap<String, String>;

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().into_owned()
}

/// Match `path` against a route `pattern`, returning the bound params.
pub fn match_path(pattern: &str, path: &str) -> Option<Params> {
    let route_segs = split_path(pattern);
    let loc_segs = split_path(path);
    let depth = route_segs.len().max(loc_segs.len());
    let mut params = Params::new();

    for i in 0..depth {
        let (Some(route_seg), Some(loc_seg)) = (route_segs.get(i), loc_segs.get(i)) else {
            return None;
        };

        if let Some(name) = catch_all_name(route_seg) {
            if i == route_segs.len() - 1 {
                let rest: Vec<String> = loc_segs[i..].iter().map(|s| decode(s)).collect();
                params.insert(name.to_string(), rest.join("/"));
                break;
            }
        }

        if let Some(name) = param_name(route_seg) {
            params.insert(name.to_string(), decode(loc_seg));
        } else if route_seg != loc_seg {
            return None;
        }
    }

    Some(params)
}

fn catch_all_name(seg: &str) -> Option<&str> {
    seg.strip_prefix("[...")
        .and_then(|s| s.strip_suffix(']'))
        .filter(|name| !name.is_empty())
}

fn param_name(seg: &str) -> Option<&str> {
    if let Some(name) = seg.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return (!name.is_empty()).then_some(name);
    }
    seg.strip_prefix('$').filter(|name| !name.is_empty())
}

/// Substitute bound params into a rewrite target. Unbound names are left
/// in place.
pub fn fill_pattern(target: &str, params: &Params) -> String {
    let filled: Vec<String> = target
        .split('/')
        .map(|seg| {
            let name = catch_all_name(seg).or_else(|| param_name(seg));
            match name.and_then(|name| params.get(name)) {
                Some(value) => value.clone(),
                None => seg.to_string(),
            }
        })
        .collect();
    clean_path(&filled.join("/"))
}

/// Route pattern served by a page or API module.
///
/// `/pages/blog/[slug].tsx` -> `/blog/[slug]`, `/pages/index.tsx` -> `/`,
/// `/api/users/[id].ts` -> `/api/users/[id]`.
pub fn route_pattern(specifier: &str, dir: &str) -> Option<String> {
    let rest = specifier.strip_prefix(dir)?.strip_prefix('/')?;
    let rest = trim_module_ext(rest);
    let rest = rest.strip_suffix("/index").unwrap_or(rest);
    let rest = if rest == "index" { "" } else { rest };
    let prefix = if dir == "/pages" { "" } else { dir };
    Some(clean_path(&format!("{prefix}/{rest}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pattern: String,
    pub specifier: String,
}

impl Route {
    /// Static routes sort before dynamic ones, catch-alls last.
    fn rank(&self) -> (usize, usize) {
        let segs = split_path(&self.pattern);
        let catch_all = segs.iter().filter(|s| catch_all_name(s).is_some()).count();
        let dynamic = segs.iter().filter(|s| param_name(s).is_some()).count();
        (catch_all, dynamic)
    }
}

/// Routes for one module directory (`/pages` or `/api`)
#[derive(Debug)]
pub struct RouteTable {
    dir: &'static str,
    routes: RwLock<Vec<Route>>,
}

impl RouteTable {
    pub fn new(dir: &'static str) -> Self {
        Self {
            dir,
            routes: RwLock::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &'static str {
        self.dir
    }

    pub fn owns(&self, specifier: &str) -> bool {
        route_pattern(specifier, self.dir).is_some() && trim_module_ext(specifier) != specifier
    }

    /// Register the route for `specifier`. Returns the pattern, or `None`
    /// when the module is not inside this table's directory.
    pub fn add(&self, specifier: &str) -> Option<String> {
        if !self.owns(specifier) {
            return None;
        }
        let pattern = route_pattern(specifier, self.dir)?;
        let mut routes = self.routes.write();
        routes.retain(|r| r.specifier != specifier && r.pattern != pattern);
        routes.push(Route {
            pattern: pattern.clone(),
            specifier: specifier.to_string(),
        });
        routes.sort_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| a.pattern.cmp(&b.pattern)));
        Some(pattern)
    }

    pub fn remove(&self, specifier: &str) -> bool {
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|r| r.specifier != specifier);
        routes.len() != before
    }

    /// Whether `specifier` already has a route
    pub fn contains(&self, specifier: &str) -> bool {
        self.routes.read().iter().any(|r| r.specifier == specifier)
    }

    pub fn find(&self, pathname: &str) -> Option<(Params, Route)> {
        let routes = self.routes.read();
        routes.iter().find_map(|route| {
            match_path(&route.pattern, pathname).map(|params| (params, route.clone()))
        })
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}
