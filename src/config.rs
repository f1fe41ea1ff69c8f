//! Publish configuration loaded from JSON or YAML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{PublishError, PublishResult};
use crate::publisher::UploadOptions;

const CONFIG_FILES: &[&str] = &["cdn-rewriter.config.json", "cdn-rewriter.config.yaml"];

/// One directory or a list of directories.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StaticDir {
  /// A single directory.
  One(PathBuf),
  /// Several directories, scanned in order.
  Many(Vec<PathBuf>),
}

impl StaticDir {
  /// Every configured directory.
  pub fn dirs(&self) -> Vec<&Path> {
    match self {
      Self::One(dir) => vec![dir.as_path()],
      Self::Many(dirs) => dirs.iter().map(PathBuf::as_path).collect(),
    }
  }
}

/// Options recognised by a publish run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublishConfig {
  /// Source tree templates are read from. Emitted templates are used when unset.
  pub src: Option<PathBuf>,
  /// Destination tree rewritten templates are written to, mirroring `src`.
  pub dist: Option<PathBuf>,
  /// Template extensions to rewrite.
  pub resolve: Vec<String>,
  /// Directories scanned for assets instead of the build's emitted list.
  pub static_dir: Option<StaticDir>,
  /// Skip writing assets whose content did not change.
  pub dirty_check: bool,
  /// Always write templates, even under `dirty_check`.
  pub force_copy_template: bool,
  /// Patch the asynchronous stylesheet loader in entry scripts.
  #[serde(rename = "asyncCSS")]
  pub async_css: bool,
  /// Forwarded to the publisher.
  pub enable_cache: bool,
  /// Forwarded to the publisher.
  pub cache_location: Option<PathBuf>,
  /// Forwarded to the publisher.
  pub slice_limit: usize,
  /// Overrides the public path recorded in the build manifest.
  pub public_path: Option<String>,
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      src: None,
      dist: None,
      resolve: vec!["html".into()],
      static_dir: None,
      dirty_check: false,
      force_copy_template: false,
      async_css: false,
      enable_cache: false,
      cache_location: None,
      slice_limit: 10,
      public_path: None,
    }
  }
}

impl PublishConfig {
  /// Load the first configuration file found in `dir`, falling back to defaults.
  ///
  /// A file that exists but fails to parse is reported and skipped.
  pub fn discover(dir: &Path) -> Self {
    for name in CONFIG_FILES {
      let candidate = dir.join(name);
      if !candidate.is_file() {
        continue;
      }
      match Self::from_path(&candidate) {
        Ok(config) => {
          debug!("loaded configuration from {}", candidate.display());
          return config;
        }
        Err(err) => warn!("ignoring {}: {}", candidate.display(), err),
      }
    }
    Self::default()
  }

  /// Read configuration from a JSON or YAML file, chosen by extension.
  pub fn from_path(path: &Path) -> PublishResult<Self> {
    let content = fs::read_to_string(path).map_err(|err| PublishError::io(path, err))?;
    let is_yaml = path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let parsed = if is_yaml {
      serde_yaml::from_str(&content).map_err(|err| err.to_string())
    } else {
      serde_json::from_str(&content).map_err(|err| err.to_string())
    };

    parsed.map_err(|message| PublishError::Config {
      path: path.to_path_buf(),
      message,
    })
  }

  /// Publisher options carried by this configuration, without hooks.
  pub fn upload_options(&self) -> UploadOptions {
    UploadOptions {
      before_upload: None,
      enable_cache: self.enable_cache,
      cache_location: self.cache_location.clone(),
      slice_limit: self.slice_limit,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn defaults_apply_without_a_file() {
    let dir = tempdir().unwrap();
    let config = PublishConfig::discover(dir.path());
    assert_eq!(config, PublishConfig::default());
    assert_eq!(config.resolve, vec!["html".to_string()]);
    assert_eq!(config.slice_limit, 10);
  }

  #[test]
  fn reads_json_with_camel_case_keys() {
    let dir = tempdir().unwrap();
    fs::write(
      dir.path().join("cdn-rewriter.config.json"),
      r#"{"src":"web","dist":"out","staticDir":["a","b"],"asyncCSS":true,"dirtyCheck":true,"sliceLimit":3}"#,
    )
    .unwrap();

    let config = PublishConfig::discover(dir.path());
    assert_eq!(config.src, Some(PathBuf::from("web")));
    assert!(config.async_css);
    assert!(config.dirty_check);
    assert_eq!(config.resolve, vec!["html".to_string()]);
    assert_eq!(
      config.static_dir.as_ref().map(StaticDir::dirs),
      Some(vec![Path::new("a"), Path::new("b")])
    );
    assert_eq!(config.upload_options().slice_limit, 3);
  }

  #[test]
  fn reads_yaml_with_single_static_dir() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cdn-rewriter.config.yaml");
    fs::write(
      &path,
      "resolve:\n  - html\n  - ejs\nstaticDir: public\npublicPath: /static/\n",
    )
    .unwrap();

    let config = PublishConfig::from_path(&path).unwrap();
    assert_eq!(config.resolve, vec!["html".to_string(), "ejs".to_string()]);
    assert_eq!(config.static_dir, Some(StaticDir::One(PathBuf::from("public"))));
    assert_eq!(config.public_path.as_deref(), Some("/static/"));
  }

  #[test]
  fn malformed_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    let err = PublishConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, PublishError::Config { .. }));

    fs::write(dir.path().join("cdn-rewriter.config.json"), "{ not json").unwrap();
    assert_eq!(PublishConfig::discover(dir.path()), PublishConfig::default());
  }
}
