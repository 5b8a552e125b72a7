//! The `/_aleph/main.js` entry module.

use serde_json::json;

use crate::paths::{clean_path, js_file_of};
use crate::routing::RouteTable;

/// Entry module: imports the client bootstrap and calls it with the base
/// path, the dev flag and the page routes in matching order.
pub fn main_js(base_path: &str, dev: bool, pages: &RouteTable) -> String {
    let routes: Vec<_> = pages
        .routes()
        .into_iter()
        .map(|route| {
            json!({
                "path": route.pattern,
                "module": clean_path(&format!("{}/_aleph{}", base_path, js_file_of(&route.specifier))),
            })
        })
        .collect();
    let config = json!({
        "basePath": base_path,
        "dev": dev,
        "routes": routes,
    });

    [
        format!(
            "import bootstrap from \"{}\";",
            clean_path(&format!("{base_path}/_aleph/bootstrap.js"))
        ),
        String::new(),
        format!("bootstrap({config});"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_js_lists_routes() {
        let pages = RouteTable::new("/pages");
        pages.add("/pages/blog/[slug].tsx");
        pages.add("/pages/index.tsx");

        let code = main_js("/", true, &pages);
        assert!(code.starts_with("import bootstrap from \"/_aleph/bootstrap.js\";"));
        assert!(code.contains(r#"{"module":"/_aleph/pages/index.js","path":"/"}"#));
        let index = code.find(r#""path":"/""#).unwrap();
        let blog = code.find(r#""path":"/blog/[slug]""#).unwrap();
        assert!(index < blog);
        assert!(code.trim_end().ends_with(");"));
    }
}
