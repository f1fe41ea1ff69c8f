//! Textual substitution of local asset references inside a single file.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::async_css::patch_async_css;
use super::chunk_table::patch_chunk_table;
use crate::asset_paths::{PathPattern, has_extension};
use crate::error::{PublishError, PublishResult};
use crate::models::{ChunkCdnMap, UrlMap};

/// Content pre-pass applied before reference substitution.
pub type ContentTransform<'a> = &'a dyn Fn(&str, &Path) -> String;

/// Knobs for one [`ReferenceRewriter::apply`] call.
#[derive(Clone, Copy, Default)]
pub struct RewriteOptions<'a> {
  /// Pre-pass run once before substitution, for files matching `transform_extensions`.
  pub transform: Option<ContentTransform<'a>>,
  /// Extensions the pre-pass applies to.
  pub transform_extensions: &'a [String],
  /// Chunk id to URL table patched into the runtime loader.
  pub chunk_urls: Option<&'a ChunkCdnMap>,
  /// Uploaded stylesheets used to patch the asynchronous stylesheet loader.
  pub stylesheet_urls: Option<&'a UrlMap>,
  /// Write even when nothing changed.
  pub force_write: bool,
}

/// Whether [`ReferenceRewriter::apply`] wrote the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
  /// The destination was written.
  Written,
  /// Content was unchanged and the destination already existed.
  Skipped,
}

/// Replace every reference to the keys of `pairs` with their values.
///
/// Each pair is matched with a pattern built from its own local path, in map order.
pub fn rewrite_references(content: &str, pairs: &UrlMap) -> PublishResult<String> {
  let mut rewritten = content.to_string();
  for (local_path, replacement) in pairs {
    rewritten = PathPattern::build(local_path)?.find_and_replace(&rewritten, replacement);
  }
  Ok(rewritten)
}

/// Applies URL maps and loader patches to files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceRewriter;

impl ReferenceRewriter {
  /// Rewrite `file_path` into `output_path`.
  ///
  /// The destination is written when it does not exist yet, when `force_write` is set, or
  /// when the content changed.
  pub fn apply(
    file_path: &Path,
    output_path: &Path,
    pairs: &UrlMap,
    options: RewriteOptions<'_>,
  ) -> PublishResult<RewriteOutcome> {
    let original =
      fs::read_to_string(file_path).map_err(|err| PublishError::io(file_path, err))?;

    let mut content = match options.transform {
      Some(transform) if has_extension(file_path, options.transform_extensions) => {
        transform(&original, file_path)
      }
      _ => original.clone(),
    };

    content = rewrite_references(&content, pairs)?;

    if let Some(chunk_urls) = options.chunk_urls {
      content = patch_chunk_table(&content, chunk_urls).into_owned();
    }
    if let Some(stylesheet_urls) = options.stylesheet_urls {
      content = patch_async_css(&content, stylesheet_urls)?.into_owned();
    }

    let changed = content != original;
    if !changed && !options.force_write && output_path.exists() {
      debug!("{} unchanged, skipping write", output_path.display());
      return Ok(RewriteOutcome::Skipped);
    }

    if let Some(parent) = output_path.parent() {
      fs::create_dir_all(parent).map_err(|err| PublishError::io(parent, err))?;
    }
    fs::write(output_path, content).map_err(|err| PublishError::io(output_path, err))?;
    debug!("rewrote {} -> {}", file_path.display(), output_path.display());

    Ok(RewriteOutcome::Written)
  }
}
