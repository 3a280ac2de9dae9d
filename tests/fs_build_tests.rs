//! Planning against a real project tree on disk.

use std::fs;
use std::path::Path;

use astro_build_pages::bundle::module_file_name;
use astro_build_pages::{
    plan_build, FsResolver, OutputMode, PageMetadata, PageRegistry, PagesConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn create_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pages = dir.path().join("src/pages");
    fs::create_dir_all(pages.join("blog")).unwrap();
    fs::write(pages.join("index.astro"), "---\n---\n<h1>Home</h1>").unwrap();
    fs::write(pages.join("blog/index.md"), "# Blog").unwrap();
    fs::write(pages.join("about.astro"), "<p>About</p>").unwrap();
    dir
}

fn project_registry() -> PageRegistry {
    PageRegistry::from_pages([
        ("/", PageMetadata::new("./src/pages/index.astro")),
        ("/blog", PageMetadata::new("./src/pages/blog")),
        ("/about", PageMetadata::new("./src/pages/about")),
        ("/draft", PageMetadata::new("./src/pages/draft.astro")),
    ])
    .unwrap()
}

// ===========================================================================
// Planning
// ===========================================================================

#[tokio::test]
async fn plan_resolves_pages_on_disk() {
    let project = create_project();
    let report = plan_build(
        project_registry(),
        PagesConfig::default(),
        FsResolver::new(project.path()),
    )
    .await
    .unwrap();

    assert_eq!(report.output, OutputMode::Static);
    assert_eq!(report.entries.len(), 4);

    let paths: Vec<&str> = report.modules.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, vec!["/", "/about", "/blog"]);

    let warnings: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.message.contains("./src/pages/draft.astro"))
        .collect();
    assert_eq!(warnings.len(), 1);
}

#[tokio::test]
async fn write_report_to_disk() {
    let project = create_project();
    let out = tempfile::tempdir().unwrap();

    let report = plan_build(
        project_registry(),
        PagesConfig::default().with_middleware(true),
        FsResolver::new(project.path()),
    )
    .await
    .unwrap();
    let written = report.write_to_disk(out.path()).await.unwrap();

    // Three modules plus the manifest.
    assert_eq!(written.len(), 4);

    let about = report.modules.iter().find(|m| m.path.as_str() == "/about").unwrap();
    let about_file = out.path().join("pages").join(module_file_name(&about.path));
    let code = fs::read_to_string(&about_file).unwrap();
    assert_eq!(code, about.code);
    assert!(code.contains("export const middleware = _middleware;"));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["output"], "static");
    assert_eq!(manifest["entries"].as_array().unwrap().len(), 4);
    assert_eq!(manifest["modules"][0]["entry"], "@astro-page:/");
    assert_eq!(manifest["modules"][0]["resolvedId"], "\u{0}@astro-page:/");
}

#[tokio::test]
async fn server_output_writes_only_manifest() {
    let project = create_project();
    let out = tempfile::tempdir().unwrap();

    let report = plan_build(
        project_registry(),
        PagesConfig::default().with_output(OutputMode::Server),
        FsResolver::new(project.path()),
    )
    .await
    .unwrap();
    let written = report.write_to_disk(out.path()).await.unwrap();

    assert_eq!(written.len(), 1);
    assert!(Path::new(&written[0]).ends_with("manifest.json"));
}
