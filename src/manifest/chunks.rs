//! Reconstruct the bundler's chunk id to filename map from the filename template.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::{PublishError, PublishResult};
use crate::manifest::loading::ChunkRecord;
use crate::models::{ChunkCdnMap, ChunkDescriptor, UrlMap};

fn placeholder_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"\[(name|id|chunkhash|contenthash|hash)(?::(\d+))?\]")
      .expect("invalid placeholder regex")
  })
}

/// Renders one [`ChunkDescriptor`] per chunk from a filename template.
///
/// Supported placeholders are `[name]` (falling back to the id for unnamed chunks),
/// `[id]`, `[chunkhash]` and `[contenthash]`, the hashes optionally truncated with `:N`.
/// Unknown placeholders are copied verbatim.
#[derive(Debug, Clone)]
pub struct ChunkMapBuilder<'a> {
  template: &'a str,
}

impl<'a> ChunkMapBuilder<'a> {
  /// Prepare a builder for the template, refusing the build-wide `[hash]`.
  ///
  /// The build hash is shared by every chunk, so a template using it cannot tell chunks
  /// apart by content and the resulting map would be wrong.
  pub fn new(template: &'a str) -> PublishResult<Self> {
    let uses_build_hash = placeholder_pattern()
      .captures_iter(template)
      .any(|caps| &caps[1] == "hash");
    if uses_build_hash {
      return Err(PublishError::configuration(format!(
        "chunk filename template {template:?} uses the build-wide [hash]; \
         use [chunkhash] or [contenthash] so each chunk gets its own name"
      )));
    }

    Ok(Self { template })
  }

  /// Render the filename of every chunk.
  pub fn build(&self, chunks: &[ChunkRecord]) -> Vec<ChunkDescriptor> {
    chunks
      .iter()
      .map(|chunk| ChunkDescriptor {
        id: chunk.id.clone(),
        rendered_name: self.render(chunk),
      })
      .collect()
  }

  fn render(&self, chunk: &ChunkRecord) -> String {
    placeholder_pattern()
      .replace_all(self.template, |caps: &Captures<'_>| {
        let length = caps
          .get(2)
          .and_then(|value| value.as_str().parse::<usize>().ok());
        match &caps[1] {
          "name" => chunk
            .name
            .clone()
            .unwrap_or_else(|| chunk.id.to_string()),
          "id" => chunk.id.to_string(),
          "chunkhash" => truncate(&chunk.rendered_hash, length),
          "contenthash" => {
            let hash = chunk
              .content_hash
              .as_ref()
              .and_then(|hash| hash.javascript())
              .unwrap_or(&chunk.rendered_hash);
            truncate(hash, length)
          }
          _ => caps[0].to_string(),
        }
      })
      .into_owned()
  }
}

/// Build the chunk filename map in one call.
pub fn build_chunk_map(
  chunks: &[ChunkRecord],
  template: &str,
) -> PublishResult<Vec<ChunkDescriptor>> {
  Ok(ChunkMapBuilder::new(template)?.build(chunks))
}

/// Resolve each chunk to the remote URL of the uploaded file containing its filename.
///
/// Chunks whose file was not part of `urls` are left out.
pub fn resolve_chunk_urls(descriptors: &[ChunkDescriptor], urls: &UrlMap) -> ChunkCdnMap {
  let mut resolved = ChunkCdnMap::new();
  for descriptor in descriptors {
    if let Some((_, url)) = urls
      .iter()
      .find(|(path, _)| descriptor.matches_path(path))
    {
      resolved.insert(descriptor.id.to_string(), url.clone());
    }
  }
  resolved
}

fn truncate(hash: &str, length: Option<usize>) -> String {
  match length {
    Some(length) => hash.chars().take(length).collect(),
    None => hash.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::path::PathBuf;

  use super::*;
  use crate::manifest::loading::{ContentHash, DEFAULT_CHUNK_FILENAME};
  use crate::models::ChunkId;

  fn chunk(id: u64, name: Option<&str>, hash: &str) -> ChunkRecord {
    ChunkRecord {
      id: ChunkId::from(id),
      name: name.map(str::to_string),
      rendered_hash: hash.into(),
      content_hash: None,
    }
  }

  #[test]
  fn renders_name_and_truncated_chunkhash() {
    let map = build_chunk_map(
      &[chunk(1, Some("app"), "abcdef1234")],
      "app.[name].[chunkhash:8].js",
    )
    .unwrap();
    assert_eq!(map, vec![ChunkDescriptor {
      id: ChunkId::from(1),
      rendered_name: "app.app.abcdef12.js".into(),
    }]);
  }

  #[test]
  fn unnamed_chunks_fall_back_to_id() {
    let map = build_chunk_map(&[chunk(7, None, "ffff")], "js/[name]-[id].[chunkhash].js").unwrap();
    assert_eq!(map[0].rendered_name, "js/7-7.ffff.js");
  }

  #[test]
  fn contenthash_prefers_javascript_hash() {
    let mut with_content = chunk(2, Some("lazy"), "0000000000");
    with_content.content_hash = Some(ContentHash::ByType(BTreeMap::from([(
      "javascript".to_string(),
      "123456789a".to_string(),
    )])));
    let map = build_chunk_map(&[with_content], "[name].[contenthash:6].js").unwrap();
    assert_eq!(map[0].rendered_name, "lazy.123456.js");
  }

  #[test]
  fn truncation_yields_exact_length() {
    let map = build_chunk_map(&[chunk(3, None, "9876543210abcdef")], "[chunkhash:6]").unwrap();
    assert_eq!(map[0].rendered_name.len(), 6);
  }

  #[test]
  fn rendering_is_deterministic() {
    let chunks = [chunk(1, Some("a"), "aaaa"), chunk(2, None, "bbbb")];
    let first = build_chunk_map(&chunks, "[name].[chunkhash:2].js").unwrap();
    let second = build_chunk_map(&chunks, "[name].[chunkhash:2].js").unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn refuses_build_wide_hash() {
    for template in ["[name].[hash].js", "[id].[hash:8].js"] {
      let err = build_chunk_map(&[chunk(1, None, "aa")], template).unwrap_err();
      assert!(matches!(err, PublishError::Configuration(_)), "{template}");
    }
  }

  #[test]
  fn leaves_unknown_placeholders_alone() {
    let map = build_chunk_map(&[chunk(1, None, "aa")], "[id].[ext]").unwrap();
    assert_eq!(map[0].rendered_name, "1.[ext]");
  }

  #[test]
  fn resolves_chunk_urls_by_rendered_name() {
    let descriptors = vec![
      ChunkDescriptor {
        id: ChunkId::from(1),
        rendered_name: "js/1.aa.js".into(),
      },
      ChunkDescriptor {
        id: ChunkId::from(2),
        rendered_name: "js/2.bb.js".into(),
      },
    ];
    let urls = UrlMap::from([(
      PathBuf::from("/out/js/1.aa.js"),
      "https://cdn/1.aa.js".to_string(),
    )]);

    let resolved = resolve_chunk_urls(&descriptors, &urls);
    assert_eq!(resolved, ChunkCdnMap::from([(
      "1".to_string(),
      "https://cdn/1.aa.js".to_string()
    )]));
  }

  #[test]
  fn default_template_does_not_match_longer_filenames() {
    let descriptors = build_chunk_map(&[chunk(1, None, "aa")], DEFAULT_CHUNK_FILENAME).unwrap();
    let urls = UrlMap::from([
      (
        PathBuf::from("/out/lib/polyfill1.js"),
        "https://cdn/polyfill1.js".to_string(),
      ),
      (
        PathBuf::from("/out/static/js/1.js"),
        "https://cdn/1.js".to_string(),
      ),
    ]);

    let resolved = resolve_chunk_urls(&descriptors, &urls);
    assert_eq!(resolved, ChunkCdnMap::from([(
      "1".to_string(),
      "https://cdn/1.js".to_string()
    )]));
  }
}
