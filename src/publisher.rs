//! The upload seam between the publish run and whatever hosts the files.
//!
//! The run only ever issues one [`Publisher::upload`] call per phase. Batching, caching
//! and transfer concerns belong to implementations of the trait.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use same_file::is_same_file;
use tracing::{debug, warn};

use crate::error::{PublishError, PublishResult};
use crate::models::{UrlMap, normalise_separators};

/// Hook applied to text content right before it is handed to the host.
pub type BeforeUpload = Arc<dyn Fn(&str, &Path) -> String + Send + Sync>;

/// Options forwarded untouched from the publish configuration to the publisher.
#[derive(Clone, Default)]
pub struct UploadOptions {
  /// Content hook for text files.
  pub before_upload: Option<BeforeUpload>,
  /// Skip transfers the host already has.
  pub enable_cache: bool,
  /// File recording what was already transferred, consulted when `enable_cache` is set.
  pub cache_location: Option<PathBuf>,
  /// Upper bound on paths per host call; `0` means unbounded.
  pub slice_limit: usize,
}

impl fmt::Debug for UploadOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("UploadOptions")
      .field("before_upload", &self.before_upload.is_some())
      .field("enable_cache", &self.enable_cache)
      .field("cache_location", &self.cache_location)
      .field("slice_limit", &self.slice_limit)
      .finish()
  }
}

/// Uploads local files and reports the remote URL of each.
#[async_trait]
pub trait Publisher: Send + Sync {
  /// Upload `paths`, resolving with exactly one entry per input path.
  async fn upload(&self, paths: &[PathBuf], options: &UploadOptions) -> PublishResult<UrlMap>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
  async fn upload(&self, paths: &[PathBuf], options: &UploadOptions) -> PublishResult<UrlMap> {
    self.as_ref().upload(paths, options).await
  }
}

/// Fail unless `urls` holds an entry for every path in `paths`.
pub fn ensure_complete(paths: &[PathBuf], urls: &UrlMap) -> PublishResult<()> {
  let missing: Vec<String> = paths
    .iter()
    .filter(|path| !urls.contains_key(*path))
    .map(|path| path.display().to_string())
    .collect();

  if missing.is_empty() {
    Ok(())
  } else {
    Err(PublishError::upload(format!(
      "publisher returned no URL for {}",
      missing.join(", ")
    )))
  }
}

/// Splits every upload into sequential calls of at most `slice_limit` paths.
#[derive(Debug, Clone)]
pub struct SlicedPublisher<P> {
  inner: P,
}

impl<P> SlicedPublisher<P> {
  /// Wrap `inner`.
  pub fn new(inner: P) -> Self {
    Self { inner }
  }

  /// The wrapped publisher.
  pub fn inner(&self) -> &P {
    &self.inner
  }
}

#[async_trait]
impl<P: Publisher> Publisher for SlicedPublisher<P> {
  async fn upload(&self, paths: &[PathBuf], options: &UploadOptions) -> PublishResult<UrlMap> {
    let limit = match options.slice_limit {
      0 => paths.len().max(1),
      limit => limit,
    };

    let mut merged = UrlMap::new();
    for slice in paths.chunks(limit) {
      let urls = self.inner.upload(slice, options).await?;
      ensure_complete(slice, &urls)?;
      merged.extend(urls);
    }
    Ok(merged)
  }
}

/// Mirrored path to payload fingerprint, persisted as JSON at `cache_location`.
type UploadCache = BTreeMap<String, String>;

fn fingerprint(payload: &[u8]) -> String {
  let mut hasher = DefaultHasher::new();
  payload.hash(&mut hasher);
  format!("{:016x}-{}", hasher.finish(), payload.len())
}

async fn load_cache(location: &Path) -> UploadCache {
  let Ok(content) = tokio::fs::read_to_string(location).await else {
    return UploadCache::new();
  };
  serde_json::from_str(&content).unwrap_or_else(|err| {
    warn!("ignoring upload cache {}: {}", location.display(), err);
    UploadCache::new()
  })
}

async fn save_cache(location: &Path, cache: &UploadCache) -> PublishResult<()> {
  if let Some(parent) = location.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .map_err(|err| PublishError::io(parent, err))?;
  }
  let content = serde_json::to_string_pretty(cache)
    .map_err(|err| PublishError::upload(format!("cannot encode upload cache: {err}")))?;
  tokio::fs::write(location, content)
    .await
    .map_err(|err| PublishError::io(location, err))
}

/// Publishes by copying files into a local directory served under `base_url`.
///
/// With `enable_cache` set, a file whose payload matches the cache file at
/// `cache_location` is not copied again. Without a cache file the mirrored copy itself
/// is compared.
#[derive(Debug, Clone)]
pub struct LocalMirrorPublisher {
  source_root: PathBuf,
  mirror_root: PathBuf,
  base_url: String,
}

impl LocalMirrorPublisher {
  /// Mirror files below `source_root` into `mirror_root`.
  pub fn new(
    source_root: impl Into<PathBuf>,
    mirror_root: impl Into<PathBuf>,
    base_url: impl Into<String>,
  ) -> Self {
    Self {
      source_root: source_root.into(),
      mirror_root: mirror_root.into(),
      base_url: base_url.into(),
    }
  }

  fn relative<'a>(&self, path: &'a Path) -> PublishResult<&'a Path> {
    path.strip_prefix(&self.source_root).map_err(|_| {
      PublishError::upload(format!(
        "{} is outside the mirrored directory {}",
        path.display(),
        self.source_root.display()
      ))
    })
  }

  fn url_for(&self, relative: &Path) -> String {
    format!(
      "{}/{}",
      self.base_url.trim_end_matches('/'),
      normalise_separators(relative)
    )
  }

  async fn publish_one(
    &self,
    path: &Path,
    options: &UploadOptions,
    cache: Option<&mut UploadCache>,
  ) -> PublishResult<String> {
    let relative = self.relative(path)?;
    let destination = self.mirror_root.join(relative);

    if let Some(parent) = destination.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|err| PublishError::io(parent, err))?;
    }

    let bytes = tokio::fs::read(path)
      .await
      .map_err(|err| PublishError::io(path, err))?;

    let payload = match (&options.before_upload, String::from_utf8(bytes)) {
      (Some(hook), Ok(text)) => hook(&text, path).into_bytes(),
      (_, Ok(text)) => text.into_bytes(),
      (_, Err(err)) => err.into_bytes(),
    };

    if is_same_file(path, &destination).unwrap_or(false) {
      // Mirroring onto itself; only a hook can change anything.
      if options.before_upload.is_some() {
        tokio::fs::write(&destination, payload)
          .await
          .map_err(|err| PublishError::io(&destination, err))?;
      }
      return Ok(self.url_for(relative));
    }

    let key = normalise_separators(relative);
    let print = fingerprint(&payload);
    let already_mirrored = match &cache {
      _ if !options.enable_cache => false,
      Some(cache) => {
        cache.get(&key) == Some(&print)
          && tokio::fs::try_exists(&destination).await.unwrap_or(false)
      }
      None => tokio::fs::read(&destination)
        .await
        .is_ok_and(|existing| existing == payload),
    };
    if already_mirrored {
      debug!("{} already mirrored", relative.display());
      return Ok(self.url_for(relative));
    }

    tokio::fs::write(&destination, payload)
      .await
      .map_err(|err| PublishError::io(&destination, err))?;
    debug!("mirrored {} -> {}", path.display(), destination.display());
    if let Some(cache) = cache {
      cache.insert(key, print);
    }

    Ok(self.url_for(relative))
  }
}

#[async_trait]
impl Publisher for LocalMirrorPublisher {
  async fn upload(&self, paths: &[PathBuf], options: &UploadOptions) -> PublishResult<UrlMap> {
    let cache_location = options
      .cache_location
      .as_deref()
      .filter(|_| options.enable_cache);
    let mut cache = match cache_location {
      Some(location) => Some(load_cache(location).await),
      None => None,
    };

    let mut urls = UrlMap::new();
    for path in paths {
      let url = self.publish_one(path, options, cache.as_mut()).await?;
      urls.insert(path.clone(), url);
    }

    if let (Some(location), Some(cache)) = (cache_location, &cache) {
      save_cache(location, cache).await?;
    }
    ensure_complete(paths, &urls)?;
    Ok(urls)
  }
}
