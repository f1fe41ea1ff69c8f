//! Data structures shared by the classification, rewriting and publish phases.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Mapping of absolute local path to the remote URL it was published under.
pub type UrlMap = BTreeMap<PathBuf, String>;

/// Mapping of chunk id to the remote URL of its script.
pub type ChunkCdnMap = BTreeMap<String, String>;

/// Role of a build output, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetRole {
  /// Raster or vector image.
  Image,
  /// Web font.
  Font,
  /// Stylesheet.
  Stylesheet,
  /// Script, further split by [`ScriptRole`].
  Script,
  /// Markup template whose references should be rewritten.
  Template,
  /// Anything the publish run ignores.
  Other,
}

/// Finer split of script assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScriptRole {
  /// Contains the runtime chunk loader.
  Entry,
  /// Chunk payload produced by the bundler.
  Chunk,
  /// Script that is neither an entry nor a known chunk.
  Plain,
}

/// One classified build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
  /// Absolute location on disk.
  pub local_path: PathBuf,
  /// Role assigned by extension.
  pub role: AssetRole,
  /// Set for scripts only.
  pub script_role: Option<ScriptRole>,
}

impl Asset {
  /// Create an asset without a script role.
  pub fn new(local_path: impl Into<PathBuf>, role: AssetRole) -> Self {
    Self {
      local_path: local_path.into(),
      role,
      script_role: None,
    }
  }

  /// Create a script asset with its role already known.
  pub fn script(local_path: impl Into<PathBuf>, script_role: ScriptRole) -> Self {
    Self {
      local_path: local_path.into(),
      role: AssetRole::Script,
      script_role: Some(script_role),
    }
  }

  /// Path as a borrowed [`Path`].
  pub fn path(&self) -> &Path {
    &self.local_path
  }

  /// True for scripts carrying the runtime chunk loader.
  pub fn is_entry_script(&self) -> bool {
    self.script_role == Some(ScriptRole::Entry)
  }
}

/// Chunk identifier as emitted by the bundler, either numeric or named.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChunkId {
  /// Numeric id.
  Number(u64),
  /// String id.
  Name(String),
}

impl fmt::Display for ChunkId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Number(value) => write!(f, "{value}"),
      Self::Name(value) => f.write_str(value),
    }
  }
}

impl From<u64> for ChunkId {
  fn from(value: u64) -> Self {
    Self::Number(value)
  }
}

impl From<&str> for ChunkId {
  fn from(value: &str) -> Self {
    Self::Name(value.to_string())
  }
}

/// A chunk id paired with the filename the bundler rendered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
  /// Chunk id.
  pub id: ChunkId,
  /// Filename produced from the chunk filename template.
  pub rendered_name: String,
}

impl ChunkDescriptor {
  /// True when the given path ends with the rendered filename at a segment boundary.
  pub fn matches_path(&self, path: &Path) -> bool {
    let path = normalise_separators(path);
    let name = self.rendered_name.replace('\\', "/");
    let name = name.trim_start_matches("./").trim_start_matches('/');
    !name.is_empty() && (path == name || path.ends_with(&format!("/{name}")))
  }
}

/// A hook returned something other than a string.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformWarning {
  /// Hook name, `url_cb` or `replace_fn`.
  pub hook: &'static str,
  /// File the hook was invoked for.
  pub path: PathBuf,
  /// Value the hook produced.
  pub value: serde_json::Value,
}

impl fmt::Display for TransformWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} returned a non-string value for {}: {}",
      self.hook,
      self.path.display(),
      self.value
    )
  }
}

/// Render a path with forward slashes regardless of platform.
pub fn normalise_separators(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chunk_ids_render_without_quotes() {
    assert_eq!(ChunkId::from(3).to_string(), "3");
    assert_eq!(ChunkId::from("vendor").to_string(), "vendor");
  }

  #[test]
  fn chunk_ids_deserialize_from_numbers_and_strings() {
    let ids: Vec<ChunkId> = serde_json::from_str(r#"[1, "app"]"#).unwrap();
    assert_eq!(ids, vec![ChunkId::Number(1), ChunkId::Name("app".into())]);
  }

  #[test]
  fn descriptor_matches_rendered_name_inside_path() {
    let descriptor = ChunkDescriptor {
      id: ChunkId::from(1),
      rendered_name: "static/js/1.abcdef12.js".into(),
    };
    assert!(descriptor.matches_path(Path::new("/out/static/js/1.abcdef12.js")));
    assert!(!descriptor.matches_path(Path::new("/out/static/js/2.abcdef12.js")));
  }

  #[test]
  fn descriptor_match_starts_at_a_segment_boundary() {
    let descriptor = ChunkDescriptor {
      id: ChunkId::from(1),
      rendered_name: "1.js".into(),
    };
    assert!(descriptor.matches_path(Path::new("/out/static/js/1.js")));
    assert!(descriptor.matches_path(Path::new("1.js")));
    assert!(!descriptor.matches_path(Path::new("/out/lib/polyfill1.js")));
    assert!(!descriptor.matches_path(Path::new("/out/lib/1.js.map")));
  }
}
