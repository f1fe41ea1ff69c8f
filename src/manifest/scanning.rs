//! Directory scanning used when assets or templates come from a source tree.

use std::fs;
use std::path::{Path, PathBuf};

use crate::asset_paths::has_extension;
use crate::error::{PublishError, PublishResult};

/// Walk `dir` collecting every regular file, skipping hidden entries.
///
/// Results are sorted so repeated runs visit files in the same order.
pub fn collect_files_recursively(dir: &Path) -> PublishResult<Vec<PathBuf>> {
  let mut files = Vec::new();
  visit_dir(dir, &mut files)?;
  files.sort();
  Ok(files)
}

/// Collect files under `dir` whose extension is one of `extensions`.
pub fn collect_files_with_extensions<S: AsRef<str>>(
  dir: &Path,
  extensions: &[S],
) -> PublishResult<Vec<PathBuf>> {
  Ok(
    collect_files_recursively(dir)?
      .into_iter()
      .filter(|path| has_extension(path, extensions))
      .collect(),
  )
}

fn visit_dir(dir: &Path, files: &mut Vec<PathBuf>) -> PublishResult<()> {
  let entries = fs::read_dir(dir).map_err(|err| PublishError::io(dir, err))?;

  for entry in entries {
    let entry = entry.map_err(|err| PublishError::io(dir, err))?;
    let file_name = entry.file_name();
    if file_name.to_string_lossy().starts_with('.') {
      continue;
    }

    let path = entry.path();
    let file_type = entry
      .file_type()
      .map_err(|err| PublishError::io(&path, err))?;
    if file_type.is_dir() {
      visit_dir(&path, files)?;
    } else if file_type.is_file() {
      files.push(path);
    }
  }

  Ok(())
}

/// Location a template from `source_root` should be written to under `dest_root`.
///
/// Paths outside `source_root` keep only their file name.
pub fn mirror_destination(path: &Path, source_root: &Path, dest_root: &Path) -> PathBuf {
  match path.strip_prefix(source_root) {
    Ok(relative) => dest_root.join(relative),
    Err(_) => dest_root.join(path.file_name().unwrap_or(path.as_os_str())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn collects_nested_files_and_skips_hidden_entries() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("static/img")).unwrap();
    fs::create_dir_all(root.join(".cache")).unwrap();
    fs::write(root.join("index.html"), "<html>").unwrap();
    fs::write(root.join("static/img/a.png"), "png").unwrap();
    fs::write(root.join(".cache/skip.js"), "x").unwrap();
    fs::write(root.join(".hidden"), "x").unwrap();

    let files = collect_files_recursively(root).unwrap();
    assert_eq!(files, vec![root.join("index.html"), root.join("static/img/a.png")]);
  }

  #[test]
  fn filters_by_extension() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("index.html"), "").unwrap();
    fs::write(root.join("page.tpl"), "").unwrap();
    fs::write(root.join("app.js"), "").unwrap();

    let files = collect_files_with_extensions(root, &["html", "tpl"]).unwrap();
    assert_eq!(files, vec![root.join("index.html"), root.join("page.tpl")]);
  }

  #[test]
  fn missing_directory_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = collect_files_recursively(&dir.path().join("missing")).unwrap_err();
    assert!(matches!(err, PublishError::Io { .. }));
  }

  #[test]
  fn mirrors_relative_structure() {
    let dest = mirror_destination(
      Path::new("/src/views/admin/index.html"),
      Path::new("/src/views"),
      Path::new("/dist/views"),
    );
    assert_eq!(dest, PathBuf::from("/dist/views/admin/index.html"));
  }
}
