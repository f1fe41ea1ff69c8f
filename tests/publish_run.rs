use std::fs;
use std::path::{Path, PathBuf};

use cdn_rewriter::{
  LocalMirrorPublisher, PublishConfig, PublishOrchestrator, SlicedPublisher, load_build_manifest,
};
use serde_json::json;
use tempfile::{TempDir, tempdir};

const ENTRY: &str = r#"var __loader__={};__loader__.p="/";
function loadCss(chunkId){var href="static/css/"+({}[chunkId]||chunkId)+"."+{"1":"abcd"}[chunkId]+".css";var fullhref=__loader__.p+href;return fullhref;}
function load(e){return __loader__.p+"static/js/"+{1:"abcd"}[e]+".js";}
"#;

struct Build {
  dir: TempDir,
}

impl Build {
  fn new() -> Self {
    let dir = tempdir().unwrap();
    let build = Self { dir };
    build.write("static/img/a.png", "png");
    build.write("static/css/app.css", "body{background:url(../img/a.png)}");
    build.write("static/css/1.abcd.css", ".about{color:red}");
    build.write("static/js/app.js", ENTRY);
    build.write(
      "static/js/1.abcd.js",
      "(window.jsonp=window.jsonp||[]).push([[1],{}]);",
    );
    build.write(
      "index.html",
      r#"<link href="static/css/app.css"><script src="static/js/app.js"></script>"#,
    );
    build
  }

  fn output(&self) -> PathBuf {
    self.dir.path().join("build")
  }

  fn write(&self, name: &str, content: &str) {
    let path = self.output().join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  fn manifest_path(&self) -> PathBuf {
    let names = [
      "static/img/a.png",
      "static/css/app.css",
      "static/css/1.abcd.css",
      "static/js/app.js",
      "static/js/1.abcd.js",
      "index.html",
    ];
    let assets: serde_json::Map<String, serde_json::Value> = names
      .iter()
      .map(|name| {
        (
          name.to_string(),
          json!({ "existsAt": self.output().join(name) }),
        )
      })
      .collect();
    let manifest = json!({
      "hash": "f00dfeedf00dfeed",
      "chunks": [
        { "id": 0, "name": "app", "renderedHash": "00000000" },
        { "id": 1, "renderedHash": "abcd0123", "contentHash": { "javascript": "abcd9999" } }
      ],
      "assets": assets,
      "output": {
        "path": self.output(),
        "filename": "static/js/[name].js",
        "chunkFilename": "static/js/[id].[chunkhash:4].js",
        "publicPath": "/"
      }
    });

    let path = self.dir.path().join("stats.json");
    fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
    path
  }

  fn mirror(&self) -> PathBuf {
    self.dir.path().join("mirror")
  }

  fn site(&self) -> PathBuf {
    self.dir.path().join("site")
  }

  fn config(&self) -> PublishConfig {
    PublishConfig {
      dist: Some(self.site()),
      async_css: true,
      dirty_check: true,
      slice_limit: 2,
      ..PublishConfig::default()
    }
  }

  fn orchestrator(&self) -> PublishOrchestrator<SlicedPublisher<LocalMirrorPublisher>> {
    let publisher = SlicedPublisher::new(LocalMirrorPublisher::new(
      self.output(),
      self.mirror(),
      "https://cdn.test",
    ));
    PublishOrchestrator::new(publisher, self.config())
  }
}

fn read(path: &Path) -> String {
  fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn later_phases_see_urls_from_earlier_phases() {
  let build = Build::new();
  let manifest = load_build_manifest(&build.manifest_path()).unwrap();

  let report = build.orchestrator().publish(&manifest).await.unwrap();

  let stylesheet = read(&build.mirror().join("static/css/app.css"));
  assert_eq!(
    stylesheet,
    "body{background:url(https://cdn.test/static/img/a.png)}"
  );

  let entry = read(&build.mirror().join("static/js/app.js"));
  assert!(entry.contains(r#"return ({"1":"https://cdn.test/static/js/1.abcd.js"})[e];"#));
  assert!(entry.contains(
    r#"var fullhref={"1":"https://cdn.test/static/css/1.abcd.css"}[chunkId];"#
  ));
  assert!(entry.starts_with(r#"var __loader__={};__loader__.p="/";"#));

  assert_eq!(
    read(&build.site().join("index.html")),
    r#"<link href="https://cdn.test/static/css/app.css"><script src="https://cdn.test/static/js/app.js"></script>"#
  );

  assert_eq!(report.uploaded.len(), 5);
  assert_eq!(
    report.chunk_cdn_map.get("1").map(String::as_str),
    Some("https://cdn.test/static/js/1.abcd.js")
  );
}

#[tokio::test]
async fn second_run_with_dirty_check_only_rewrites_templates() {
  let build = Build::new();
  let manifest = load_build_manifest(&build.manifest_path()).unwrap();

  build.orchestrator().publish(&manifest).await.unwrap();
  let entry_after_first_run = read(&build.output().join("static/js/app.js"));

  let report = build.orchestrator().publish(&manifest).await.unwrap();

  assert_eq!(report.rewritten, vec![build.site().join("index.html")]);
  assert_eq!(
    read(&build.output().join("static/js/app.js")),
    entry_after_first_run
  );
}

#[tokio::test]
async fn bare_build_hash_is_rejected() {
  let build = Build::new();
  let mut manifest = load_build_manifest(&build.manifest_path()).unwrap();
  manifest.output.chunk_filename = Some("static/js/[id].[hash:8].js".into());

  let err = build.orchestrator().publish(&manifest).await.unwrap_err();

  assert!(err.to_string().contains("configuration error"));
  assert!(!build.mirror().exists());
}
