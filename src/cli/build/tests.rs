use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use super::*;
use crate::core::CancelToken;
use crate::emit::Manifest;
use crate::scheduler::BuildError;
use crate::utils::path::normalize_path;
use crate::watch::{ChangeEvent, ChangeKind};

/// ```text
/// index.js ─┬─▶ a.js ──▶ shared.js
///           └─▶ b.js
/// ```
const FILES: &[(&str, &str)] = &[
    ("src/index.js", "import './a.js';\nimport './b.js';\n"),
    ("src/a.js", "import './shared.js';\nexport const a = 1;\n"),
    ("src/b.js", "export const b = 2;\n"),
    ("src/shared.js", "export const s = 0;\n"),
];

struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        let project = Self { _dir: dir, root };
        for (rel, content) in files {
            project.write(rel, content);
        }
        project
    }

    fn write(&self, rel: &str, content: impl AsRef<[u8]>) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn config(&self, toml: &str) -> KilnConfig {
        KilnConfig::from_str(toml, &self.root).unwrap()
    }

    fn session(&self, toml: &str) -> Session {
        Session::new(self.config(toml), BuildMode::Development)
            .unwrap()
            .quiet(true)
    }

    fn modified(&self, rel: &str) -> Vec<ChangeEvent> {
        vec![ChangeEvent::new(self.path(rel), ChangeKind::Modified)]
    }

    fn manifest(&self) -> Manifest {
        Manifest::read(&self.path("dist/manifest.json")).unwrap()
    }
}

fn build_error(err: &anyhow::Error) -> &BuildError {
    err.downcast_ref::<BuildError>().expect("a BuildError")
}

#[test]
fn test_build_writes_outputs_and_manifest() {
    let project = Project::new(FILES);
    let summary = project.session("").build().unwrap();

    assert_eq!(summary.assets, 4);
    assert_eq!(summary.stats.transformed, 4);
    assert!(!summary.scoped);

    let manifest = project.manifest();
    assert_eq!(manifest.get("src/index.js"), Some("bundle.js"));
    assert_eq!(manifest.get("src/shared.js"), Some("shared.js"));
    let bundle = fs::read_to_string(project.path("dist/bundle.js")).unwrap();
    assert!(bundle.contains("import '/a.js';"));
}

#[test]
fn test_warm_run_transforms_nothing() {
    let project = Project::new(FILES);
    project.session("").build().unwrap();
    let first = fs::read_to_string(project.path("dist/manifest.json")).unwrap();

    // A new session starts from the persisted cache
    let mut session = project.session("");
    assert_eq!(session.cache().len(), 4);
    let summary = session.build().unwrap();

    assert_eq!(summary.stats.transformed, 0);
    assert_eq!(summary.stats.cached, 4);
    assert_eq!(summary.written, 0);
    let second = fs::read_to_string(project.path("dist/manifest.json")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_leaf_change_reruns_its_dependents() {
    let project = Project::new(FILES);
    let mut session = project.session("");
    session.build().unwrap();

    project.write("src/shared.js", "export const s = 42;\n");
    let summary = session
        .rebuild(&project.modified("src/shared.js"))
        .unwrap()
        .expect("a rebuild");

    assert!(summary.scoped);
    // a.js reruns; its output is unchanged so index.js is a cache hit
    assert_eq!(summary.stats.transformed, 2);
    assert_eq!(summary.stats.cached, 1);
    assert_eq!(summary.stats.reused, 1);
    let shared = fs::read_to_string(project.path("dist/shared.js")).unwrap();
    assert!(shared.contains("42"));
    assert_eq!(project.manifest().len(), 4);
}

#[test]
fn test_save_without_edits_is_no_rebuild() {
    let project = Project::new(FILES);
    let mut session = project.session("");
    session.build().unwrap();

    assert!(session.rebuild(&project.modified("src/b.js")).unwrap().is_none());
    assert!(session.rebuild(&project.modified("README.md")).unwrap().is_none());
}

#[test]
fn test_failures_are_aggregated_and_retried() {
    let mut files = FILES.to_vec();
    files[1] = ("src/a.js", "import './broken.js';\n");
    let project = Project::new(&files);
    project.write("src/broken.js", [0xff, 0xfe, 0x00]);

    let mut session = project.session("");
    let err = session.build().unwrap_err();
    let build = build_error(&err);

    assert!(!build.cancelled);
    let failed: Vec<_> = build.failed().map(|f| f.asset.clone()).collect();
    assert_eq!(failed, vec![project.path("src/broken.js")]);
    assert_eq!(build.skipped().count(), 2);
    // The independent subtree is still emitted
    assert!(project.path("dist/b.js").exists());
    assert!(!project.path("dist/manifest.json").exists());

    project.write("src/broken.js", "export const fixed = true;\n");
    let summary = session
        .rebuild(&project.modified("src/broken.js"))
        .unwrap()
        .expect("a rebuild");
    assert_eq!(summary.stats.transformed, 3);
    assert_eq!(project.manifest().get("src/broken.js"), Some("broken.js"));
}

#[test]
fn test_removed_asset_rebuilds_graph() {
    let project = Project::new(FILES);
    let mut session = project.session("");
    session.build().unwrap();

    fs::remove_file(project.path("src/b.js")).unwrap();
    let events = [ChangeEvent::new(project.path("src/b.js"), ChangeKind::Removed)];
    let err = session.rebuild(&events).unwrap_err();
    assert!(err.to_string().contains("cannot resolve `./b.js`"));

    // Discovery failed: the next change triggers a full build
    project.write("src/index.js", "import './a.js';\n");
    let summary = session
        .rebuild(&project.modified("src/index.js"))
        .unwrap()
        .expect("a rebuild");
    assert!(!summary.scoped);
    assert_eq!(summary.assets, 3);
    assert_eq!(project.manifest().get("src/b.js"), None);
}

#[test]
fn test_cancelled_build_writes_no_manifest() {
    let project = Project::new(FILES);
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = project.session("").with_cancel(cancel).build().unwrap_err();
    assert!(build_error(&err).cancelled);
    assert!(!project.path("dist/manifest.json").exists());
}

#[test]
fn test_html_plugin_page_and_template_change() {
    let project = Project::new(FILES);
    project.write(
        "src/page.html",
        "<html><head><title>{{ title }}</title></head><body></body></html>",
    );
    let toml = "plugins = [\"html\"]\n[html]\ntemplate = \"src/page.html\"\ntitle = \"Demo\"";
    let mut session = project.session(toml);
    session.build().unwrap();

    let page = fs::read_to_string(project.path("dist/index.html")).unwrap();
    assert!(page.contains("<title>Demo</title>"));
    assert!(page.contains("<script src=\"/bundle.js\"></script></body>"));
    assert_eq!(project.manifest().get("src/page.html"), Some("index.html"));

    project.write(
        "src/page.html",
        "<html><head><title>v2 {{ title }}</title></head><body></body></html>",
    );
    let summary = session
        .rebuild(&project.modified("src/page.html"))
        .unwrap()
        .expect("a rebuild");
    assert_eq!(summary.stats.reused, 4);
    let page = fs::read_to_string(project.path("dist/index.html")).unwrap();
    assert!(page.contains("<title>v2 Demo</title>"));
}

#[test]
fn test_template_assets_are_built_and_linked() {
    let project = Project::new(FILES);
    project.write("src/img/logo.png", "PNG");
    project.write("src/favicon.ico", "ICO");
    project.write(
        "src/page.html",
        r#"<html><head><link rel="icon" href="./favicon.ico"></head>
<body><img src="./img/logo.png"><a href="about/">About</a></body></html>"#,
    );
    let toml = r#"plugins = ["html"]
[html]
template = "src/page.html"
[[transforms]]
match = ["png"]
filename = "[name][ext]"
output_path = "assets/images/"
"#;
    let mut session = project.session(toml);
    let summary = session.build().unwrap();
    assert_eq!(summary.assets, 6);

    let manifest = project.manifest();
    assert_eq!(manifest.get("src/img/logo.png"), Some("assets/images/logo.png"));
    assert_eq!(manifest.get("src/favicon.ico"), Some("favicon.ico"));
    assert_eq!(fs::read(project.path("dist/assets/images/logo.png")).unwrap(), b"PNG");

    let page = fs::read_to_string(project.path("dist/index.html")).unwrap();
    assert!(page.contains(r#"<img src="/assets/images/logo.png">"#));
    assert!(page.contains(r#"<link rel="icon" href="/favicon.ico">"#));
    assert!(page.contains(r#"<a href="about/">About</a>"#));

    // A new template reference extends the graph
    project.write("src/img/hero.png", "HERO");
    project.write(
        "src/page.html",
        r#"<html><body><img src="./img/hero.png"><img src="./img/logo.png"></body></html>"#,
    );
    let summary = session
        .rebuild(&project.modified("src/page.html"))
        .unwrap()
        .expect("a rebuild");
    assert!(!summary.scoped);
    assert_eq!(project.manifest().get("src/img/hero.png"), Some("assets/images/hero.png"));
    let page = fs::read_to_string(project.path("dist/index.html")).unwrap();
    assert!(page.contains(r#"<img src="/assets/images/hero.png">"#));
}

#[test]
fn test_clean_plugin_runs_on_full_builds_only() {
    let project = Project::new(FILES);
    project.write("dist/stale.js", "old");
    let mut session = project.session("plugins = [\"clean\"]");
    session.build().unwrap();
    assert!(!project.path("dist/stale.js").exists());

    project.write("dist/kept.js", "x");
    project.write("src/b.js", "export const b = 3;\n");
    session.rebuild(&project.modified("src/b.js")).unwrap();
    assert!(project.path("dist/kept.js").exists());
}

#[test]
fn test_clean_flag_clears_output_and_cache() {
    let project = Project::new(FILES);
    project.session("").build().unwrap();
    project.write("dist/stale.js", "old");

    let mut config = project.config("");
    config.build.clean = true;
    let mut session = Session::new(config, BuildMode::Development).unwrap().quiet(true);
    assert!(session.cache().is_empty());
    assert!(!project.path("dist").exists());

    let summary = session.build().unwrap();
    assert_eq!(summary.stats.transformed, 4);
    assert!(!project.path("dist/stale.js").exists());
}

#[test]
fn test_prod_build_hashes_asset_names() {
    let project = Project::new(FILES);
    let config = project.config("");
    let mut session = Session::new(config, BuildMode::Production).unwrap().quiet(true);
    session.build().unwrap();

    let manifest = project.manifest();
    assert_eq!(manifest.get("src/index.js"), Some("bundle.js"));
    let shared = manifest.get("src/shared.js").unwrap();
    assert!(shared.starts_with("shared.") && shared.ends_with(".js"));
    assert_ne!(shared, "shared.js");
    // References point at the hashed names
    let bundle = fs::read_to_string(project.path("dist/bundle.js")).unwrap();
    assert!(bundle.contains(&format!("/{}", manifest.get("src/a.js").unwrap())));
}

#[test]
fn test_discovery_error_is_reported_with_its_chain() {
    let project = Project::new(&[("src/index.js", "import './missing.js';\n")]);
    let err = project.session("").build().unwrap_err();
    let (summary, detail) = failure_report(&err, &project.root);
    assert_eq!(summary, "build failed");
    assert!(detail.contains("./missing.js"));
}
