use aleph_core::config::ServerConfig;
use aleph_core::variant::InjectPhase;
use aleph_core::App;
use aleph_test_helpers::{body_string, get, get_with, send, FakeCompiler, FakeRenderer, TestProject};
use axum::http::header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::StatusCode;
use indoc::indoc;
use std::sync::Arc;

const PLAIN_PAGE: &str = indoc! {"
    import React from 'react'
    export default function About() { return null }
"};

const SSR_PAGE: &str = indoc! {"
    import React from 'react'
    export const ssr = { props: async () => ({ secret: Deno.env.get('KEY') }) }
    export default function Home() { return null }
"};

fn project() -> TestProject {
    TestProject::new()
        .file("pages/index.tsx", SSR_PAGE)
        .file("pages/about.tsx", PLAIN_PAGE)
        .file("lib/util.ts", "export const x = 1")
}

fn build(config: ServerConfig, compiler: &Arc<FakeCompiler>) -> Arc<App> {
    App::builder(config, compiler.clone())
        .renderer(Arc::new(FakeRenderer::new()))
        .build()
}

#[tokio::test]
async fn test_etag_round_trip_and_version_bump() {
    let project = project();
    let compiler = Arc::new(FakeCompiler::new());
    let app = build(project.config(true), &compiler);

    let response = send(&app, get("/_aleph/pages/about.js")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/javascript; charset=utf-8"
    );
    let etag = response.headers()[ETAG].to_str().unwrap().to_string();

    let response = send(&app, get_with("/_aleph/pages/about.js", IF_NONE_MATCH, &etag)).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_string(response).await.is_empty());
    assert_eq!(compiler.compile_count(), 1);

    let mut bumped = project.config(true);
    bumped.build_version = "999.0.0".to_string();
    let app = build(bumped, &compiler);
    let response = send(&app, get_with("/_aleph/pages/about.js", IF_NONE_MATCH, &etag)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(response.headers()[ETAG].to_str().unwrap(), etag);
}

#[tokio::test]
async fn test_module_without_hooks_is_served_verbatim() {
    let project = project();
    let compiler = Arc::new(FakeCompiler::new());
    let app = build(project.config(true), &compiler);

    let response = send(&app, get("/_aleph/pages/about.js")).await;
    let code = body_string(response).await;
    assert_eq!(code, FakeCompiler::compiled("/pages/about.tsx", PLAIN_PAGE));
    assert!(!code.contains("$createHotContext"));
    assert_eq!(compiler.strip_count(), 0);
}

#[tokio::test]
async fn test_module_with_hooks_gets_client_variant() {
    let project = project();
    let compiler = Arc::new(FakeCompiler::new());
    let app = build(project.config(true), &compiler);

    let first = body_string(send(&app, get("/_aleph/pages/index.js")).await).await;
    assert!(!first.contains("export const ssr"));
    assert!(!first.contains("Deno.env"));
    assert!(first.starts_with("import.meta.hot = $createHotContext(\"/pages/index.tsx\");"));
    assert!(first.ends_with("import.meta.hot.accept();"));
    assert!(first.contains("export default function Home()"));

    let second = body_string(send(&app, get("/_aleph/pages/index.js")).await).await;
    assert_eq!(first, second);
    assert_eq!(compiler.strip_count(), 1);
    assert_eq!(compiler.compile_count(), 1);
}

#[tokio::test]
async fn test_recompile_invalidates_variant() {
    let project = project();
    let compiler = Arc::new(FakeCompiler::new());
    let app = build(project.config(true), &compiler);

    let before = body_string(send(&app, get("/_aleph/pages/index.js")).await).await;
    project.write("pages/index.tsx", &SSR_PAGE.replace("Home", "Landing"));
    app.gateway().compile("/pages/index.tsx").await.unwrap();

    let after = body_string(send(&app, get("/_aleph/pages/index.js")).await).await;
    assert_ne!(before, after);
    assert!(after.contains("function Landing()"));
    assert_eq!(compiler.strip_count(), 2);
    assert_eq!(app.variants().cache().len(), 1);
}

#[tokio::test]
async fn test_hmr_injects_run_before_wrapper() {
    let project = project();
    let compiler = Arc::new(FakeCompiler::new());
    let app = App::builder(project.config(true), compiler.clone())
        .renderer(Arc::new(FakeRenderer::new()))
        .inject(
            InjectPhase::Hmr,
            Some(glob::Pattern::new("/pages/*").unwrap()),
            Arc::new(|specifier: &str, code: String| format!("{code}\n// refresh {specifier}")),
        )
        .build();

    let code = body_string(send(&app, get("/_aleph/pages/index.js")).await).await;
    assert!(code.contains("// refresh /pages/index.tsx\n\nimport.meta.hot.accept();"));
}

#[tokio::test]
async fn test_ineligible_module_is_not_wrapped() {
    let project = project().file("lib/data.ts", "export const ssr = 1");
    let compiler = Arc::new(FakeCompiler::new());
    let app = build(project.config(true), &compiler);

    let code = body_string(send(&app, get("/_aleph/lib/data.js")).await).await;
    assert_eq!(code, FakeCompiler::compiled("/lib/data.ts", "export const ssr = 1"));
}

#[tokio::test]
async fn test_production_serves_plain_code_and_never_compiles() {
    let project = project();
    let compiler = Arc::new(FakeCompiler::new());
    let app = build(project.config(false), &compiler);

    let response = send(&app, get("/_aleph/pages/index.js")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(compiler.compile_count(), 0);

    app.gateway().compile("/pages/index.tsx").await.unwrap();
    let code = body_string(send(&app, get("/_aleph/pages/index.js")).await).await;
    assert_eq!(code, FakeCompiler::compiled("/pages/index.tsx", SSR_PAGE));
}

#[tokio::test]
async fn test_extension_priority_and_missing_source() {
    let project = project()
        .file("components/nav.jsx", "export default 'jsx'")
        .file("components/nav.ts", "export default 'ts'");
    let compiler = Arc::new(FakeCompiler::new());
    let app = build(project.config(true), &compiler);

    let code = body_string(send(&app, get("/_aleph/components/nav.js")).await).await;
    assert!(code.contains("'jsx'"));
    assert!(app.store().contains("/components/nav.jsx"));

    let response = send(&app, get("/_aleph/components/ghost.js")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_compile_error_is_a_server_fault() {
    let project = project();
    let compiler = Arc::new(FakeCompiler::new());
    compiler.fail_on("/pages/about.tsx");
    let app = build(project.config(true), &compiler);

    let response = send(&app, get("/_aleph/pages/about.js")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("unexpected token"));

    let response = send(&app, get("/_aleph/lib/util.js")).await;
    assert_eq!(response.status(), StatusCode::OK);
}
