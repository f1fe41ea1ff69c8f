//! Bucket build outputs into the roles the publish phases work with.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::asset_paths::{
  FONT_EXTENSIONS, IMAGE_EXTENSIONS, SCRIPT_EXTENSIONS, STYLESHEET_EXTENSIONS, has_extension,
};
use crate::error::{PublishError, PublishResult};
use crate::models::{Asset, AssetRole, ChunkDescriptor, ScriptRole};
use crate::rewrite::is_loader_script;

/// Build outputs grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedAssets {
  /// Images.
  pub images: Vec<Asset>,
  /// Fonts.
  pub fonts: Vec<Asset>,
  /// Stylesheets.
  pub stylesheets: Vec<Asset>,
  /// Scripts, each with its [`ScriptRole`].
  pub scripts: Vec<Asset>,
  /// Templates to rewrite.
  pub templates: Vec<Asset>,
}

impl ClassifiedAssets {
  /// Scripts with the given role.
  pub fn scripts_with_role(&self, role: ScriptRole) -> impl Iterator<Item = &Asset> {
    self
      .scripts
      .iter()
      .filter(move |asset| asset.script_role == Some(role))
  }

  /// Scripts that do not carry the chunk loader.
  pub fn non_entry_scripts(&self) -> impl Iterator<Item = &Asset> {
    self.scripts.iter().filter(|asset| !asset.is_entry_script())
  }
}

/// Classifies build outputs by extension and, for scripts, by content.
#[derive(Debug, Clone)]
pub struct AssetClassifier<'a> {
  template_extensions: &'a [String],
}

impl<'a> AssetClassifier<'a> {
  /// Create a classifier treating `template_extensions` as templates.
  pub fn new(template_extensions: &'a [String]) -> Self {
    Self {
      template_extensions,
    }
  }

  /// Role decided by extension alone.
  pub fn role_of(&self, path: &Path) -> AssetRole {
    if has_extension(path, IMAGE_EXTENSIONS) {
      AssetRole::Image
    } else if has_extension(path, FONT_EXTENSIONS) {
      AssetRole::Font
    } else if has_extension(path, STYLESHEET_EXTENSIONS) {
      AssetRole::Stylesheet
    } else if has_extension(path, SCRIPT_EXTENSIONS) {
      AssetRole::Script
    } else if has_extension(path, self.template_extensions) {
      AssetRole::Template
    } else {
      AssetRole::Other
    }
  }

  /// Determine whether the script at `path` carries the runtime chunk loader.
  pub fn is_entry_script(path: &Path) -> PublishResult<bool> {
    let content = fs::read_to_string(path).map_err(|err| PublishError::io(path, err))?;
    Ok(is_loader_script(&content))
  }

  /// Classify every entry. Script content is only read for files with a script extension.
  pub fn classify(
    &self,
    entries: &[PathBuf],
    descriptors: &[ChunkDescriptor],
  ) -> PublishResult<ClassifiedAssets> {
    let mut assets = ClassifiedAssets::default();

    for path in entries {
      match self.role_of(path) {
        AssetRole::Image => assets.images.push(Asset::new(path, AssetRole::Image)),
        AssetRole::Font => assets.fonts.push(Asset::new(path, AssetRole::Font)),
        AssetRole::Stylesheet => assets
          .stylesheets
          .push(Asset::new(path, AssetRole::Stylesheet)),
        AssetRole::Script => {
          let role = if Self::is_entry_script(path)? {
            ScriptRole::Entry
          } else if descriptors.iter().any(|chunk| chunk.matches_path(path)) {
            ScriptRole::Chunk
          } else {
            ScriptRole::Plain
          };
          debug!("classified {} as {:?} script", path.display(), role);
          assets.scripts.push(Asset::script(path, role));
        }
        AssetRole::Template => assets
          .templates
          .push(Asset::new(path, AssetRole::Template)),
        AssetRole::Other => debug!("ignoring {}", path.display()),
      }
    }

    Ok(assets)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::ChunkId;
  use tempfile::tempdir;

  const LOADER: &str = r#"n.p="/";function s(e){return n.p+""+{1:"aa"}[e]+".js"}"#;

  fn templates() -> Vec<String> {
    vec!["html".to_string()]
  }

  #[test]
  fn assigns_roles_by_extension() {
    let templates = templates();
    let classifier = AssetClassifier::new(&templates);
    assert_eq!(classifier.role_of(Path::new("a/logo.SVG")), AssetRole::Image);
    assert_eq!(classifier.role_of(Path::new("a/icons.woff2")), AssetRole::Font);
    assert_eq!(classifier.role_of(Path::new("a/app.css")), AssetRole::Stylesheet);
    assert_eq!(classifier.role_of(Path::new("a/app.js")), AssetRole::Script);
    assert_eq!(classifier.role_of(Path::new("a/index.html")), AssetRole::Template);
    assert_eq!(classifier.role_of(Path::new("a/app.js.map")), AssetRole::Other);
  }

  #[test]
  fn splits_scripts_into_entry_chunk_and_plain() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let entry = root.join("app.js");
    let chunk = root.join("1.aa.js");
    let plain = root.join("polyfill.js");
    fs::write(&entry, LOADER).unwrap();
    fs::write(&chunk, "(window.jsonp=window.jsonp||[]).push([[1],{}]);").unwrap();
    fs::write(&plain, "window.x=1;").unwrap();
    fs::write(root.join("index.html"), "<html></html>").unwrap();
    fs::write(root.join("a.png"), "png").unwrap();

    let descriptors = vec![ChunkDescriptor {
      id: ChunkId::from(1),
      rendered_name: "1.aa.js".into(),
    }];
    let templates = templates();
    let entries = vec![
      entry.clone(),
      chunk.clone(),
      plain.clone(),
      root.join("index.html"),
      root.join("a.png"),
      root.join("notes.txt"),
    ];
    let assets = AssetClassifier::new(&templates)
      .classify(&entries, &descriptors)
      .unwrap();

    assert_eq!(assets.scripts, vec![
      Asset::script(&entry, ScriptRole::Entry),
      Asset::script(&chunk, ScriptRole::Chunk),
      Asset::script(&plain, ScriptRole::Plain),
    ]);
    assert_eq!(assets.templates.len(), 1);
    assert_eq!(assets.images.len(), 1);
    assert_eq!(assets.non_entry_scripts().count(), 2);
    assert_eq!(assets.scripts_with_role(ScriptRole::Chunk).count(), 1);
  }

  #[test]
  fn unreadable_script_is_an_error() {
    let templates = templates();
    let classifier = AssetClassifier::new(&templates);
    let err = classifier
      .classify(&[PathBuf::from("/definitely/missing/app.js")], &[])
      .unwrap_err();
    assert!(matches!(err, PublishError::Io { .. }));
  }
}
