//! Loading the manifest a compiler writes when a build completes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PublishError, PublishResult};
use crate::models::ChunkId;

/// Chunk filename template used when the build options name none.
pub const DEFAULT_CHUNK_FILENAME: &str = "[id].js";

/// Deserialised representation of one completed build.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
  /// Build-wide hash, identical for every chunk.
  #[serde(default)]
  pub hash: Option<String>,
  /// Chunks produced by the build.
  #[serde(default)]
  pub chunks: Vec<ChunkRecord>,
  /// Emitted assets keyed by their output name.
  #[serde(default)]
  pub assets: BTreeMap<String, EmittedAsset>,
  /// Output options the build ran with.
  #[serde(default)]
  pub output: OutputOptions,
}

/// Chunk metadata needed to reproduce its rendered filename.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
  /// Stable chunk id.
  pub id: ChunkId,
  /// Optional chunk name.
  #[serde(default)]
  pub name: Option<String>,
  /// Per-chunk hash.
  pub rendered_hash: String,
  /// Content hash, either a single value or one per content type.
  #[serde(default)]
  pub content_hash: Option<ContentHash>,
}

/// Content hash as reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ContentHash {
  /// One hash for the whole chunk.
  Single(String),
  /// Hashes keyed by content type (`javascript`, `css/mini-extract`, ...).
  ByType(BTreeMap<String, String>),
}

impl ContentHash {
  /// Hash of the chunk's script output.
  pub fn javascript(&self) -> Option<&str> {
    match self {
      Self::Single(hash) => Some(hash),
      Self::ByType(hashes) => hashes.get("javascript").map(String::as_str),
    }
  }
}

/// Location of an emitted asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedAsset {
  /// Absolute path the asset was written to.
  pub exists_at: PathBuf,
}

/// Output options relevant to the publish run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
  /// Output directory of the build.
  #[serde(default)]
  pub path: Option<PathBuf>,
  /// Filename template for entry scripts.
  #[serde(default)]
  pub filename: Option<String>,
  /// Filename template for chunk scripts.
  #[serde(default)]
  pub chunk_filename: Option<String>,
  /// Prefix the runtime loader puts in front of chunk filenames.
  #[serde(default)]
  pub public_path: Option<String>,
}

impl OutputOptions {
  /// Template used to render chunk filenames.
  pub fn chunk_filename_template(&self) -> &str {
    self
      .chunk_filename
      .as_deref()
      .or(self.filename.as_deref())
      .unwrap_or(DEFAULT_CHUNK_FILENAME)
  }
}

impl BuildManifest {
  /// Absolute paths of every emitted asset, in output-name order.
  pub fn emitted_paths(&self) -> Vec<PathBuf> {
    self
      .assets
      .values()
      .map(|asset| asset.exists_at.clone())
      .collect()
  }
}

/// Load a build manifest from disk.
pub fn load_build_manifest(path: &Path) -> PublishResult<BuildManifest> {
  let content = fs::read_to_string(path).map_err(|err| PublishError::io(path, err))?;
  serde_json::from_str(&content).map_err(|source| PublishError::Manifest {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  const MANIFEST: &str = r#"{
    "hash": "0011223344",
    "chunks": [
      { "id": 0, "name": "app", "renderedHash": "aaaa1111" },
      { "id": "vendors", "renderedHash": "bbbb2222",
        "contentHash": { "javascript": "cccc3333", "css/mini-extract": "dddd4444" } }
    ],
    "assets": {
      "app.js": { "existsAt": "/out/app.js" },
      "index.html": { "existsAt": "/out/index.html" }
    },
    "output": { "path": "/out", "chunkFilename": "js/[name].[chunkhash:8].js", "publicPath": "/" }
  }"#;

  #[test]
  fn parses_chunks_assets_and_output_options() {
    let manifest: BuildManifest = serde_json::from_str(MANIFEST).unwrap();

    assert_eq!(manifest.chunks.len(), 2);
    assert_eq!(manifest.chunks[0].id, ChunkId::Number(0));
    assert_eq!(manifest.chunks[1].name, None);
    assert_eq!(
      manifest.chunks[1]
        .content_hash
        .as_ref()
        .and_then(ContentHash::javascript),
      Some("cccc3333")
    );
    assert_eq!(
      manifest.emitted_paths(),
      vec![PathBuf::from("/out/app.js"), PathBuf::from("/out/index.html")]
    );
    assert_eq!(manifest.output.chunk_filename_template(), "js/[name].[chunkhash:8].js");
    assert_eq!(manifest.output.public_path.as_deref(), Some("/"));
  }

  #[test]
  fn chunk_template_falls_back_to_filename_then_default() {
    let mut output = OutputOptions {
      filename: Some("[name].js".into()),
      ..OutputOptions::default()
    };
    assert_eq!(output.chunk_filename_template(), "[name].js");
    output.filename = None;
    assert_eq!(output.chunk_filename_template(), DEFAULT_CHUNK_FILENAME);
  }

  #[test]
  fn load_reports_parse_errors_with_path() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("stats.json");
    fs::write(&path, "{ not json").unwrap();

    let err = load_build_manifest(&path).unwrap_err();
    assert!(matches!(err, PublishError::Manifest { .. }));
    assert!(err.to_string().contains("stats.json"));
  }
}
