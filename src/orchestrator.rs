//! Phased publish run: upload assets in dependency order and rewrite every reference.
//!
//! Each phase consumes the [`RunContext`] produced by the previous one and returns it
//! augmented with the URL map it produced. A phase never reads a map that a later phase
//! fills in, so the phase order below is also the data dependency order:
//!
//! 1. classify the build outputs and render chunk filenames
//! 2. upload images and fonts
//! 3. rewrite image and font references in scripts and stylesheets
//! 4. upload chunk scripts and resolve the chunk id to URL table
//! 5. upload stylesheets, optionally patching the asynchronous stylesheet loader
//! 6. patch and upload entry scripts
//! 7. patch and upload the remaining scripts
//! 8. rewrite templates with every URL collected so far
//!
//! [`PublishOrchestrator::publish`] then reports the outcome to the finish or error hook.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::asset_paths::{PublicPathStripper, STYLESHEET_EXTENSIONS};
use crate::classify::{AssetClassifier, ClassifiedAssets};
use crate::config::PublishConfig;
use crate::error::{PublishError, PublishResult};
use crate::manifest::{
  BuildManifest, build_chunk_map, collect_files_recursively, collect_files_with_extensions,
  mirror_destination, resolve_chunk_urls,
};
use crate::models::{Asset, ChunkCdnMap, ChunkDescriptor, ScriptRole, TransformWarning, UrlMap};
use crate::publisher::{Publisher, UploadOptions, ensure_complete};
use crate::rewrite::{ReferenceRewriter, RewriteOptions, RewriteOutcome};

/// `url_cb(remote_url, local_path)`; a non-string result is reported and stringified.
pub type UrlCallback = Arc<dyn Fn(&str, &Path) -> Value + Send + Sync>;
/// `replace_fn(content, path)`; a non-string result is reported and stringified.
pub type ReplaceFn = Arc<dyn Fn(&str, &Path) -> Value + Send + Sync>;
/// Called once with the report of a completed run.
pub type FinishCallback = Arc<dyn Fn(&RunReport) + Send + Sync>;
/// Called once with the error that aborted a run.
pub type ErrorCallback = Arc<dyn Fn(&PublishError) + Send + Sync>;
/// Future returned by the `wait_for` hook.
pub type WaitFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
/// Awaited once before the first phase.
pub type WaitFor = Arc<dyn Fn() -> WaitFuture + Send + Sync>;

/// Caller-supplied callbacks for a publish run.
#[derive(Clone, Default)]
pub struct PublishHooks {
  /// Transform applied to every URL a publisher returns.
  pub url_cb: Option<UrlCallback>,
  /// Completion hook.
  pub on_finish: Option<FinishCallback>,
  /// Failure hook.
  pub on_error: Option<ErrorCallback>,
  /// Extra content transform for stylesheets and templates.
  pub replace_fn: Option<ReplaceFn>,
  /// Forwarded to the publisher.
  pub before_upload: Option<crate::publisher::BeforeUpload>,
  /// Prerequisite awaited before the run starts.
  pub wait_for: Option<WaitFor>,
}

impl PublishHooks {
  /// Set the URL transform.
  pub fn with_url_cb(mut self, hook: impl Fn(&str, &Path) -> Value + Send + Sync + 'static) -> Self {
    self.url_cb = Some(Arc::new(hook));
    self
  }

  /// Set the completion hook.
  pub fn with_on_finish(mut self, hook: impl Fn(&RunReport) + Send + Sync + 'static) -> Self {
    self.on_finish = Some(Arc::new(hook));
    self
  }

  /// Set the failure hook.
  pub fn with_on_error(mut self, hook: impl Fn(&PublishError) + Send + Sync + 'static) -> Self {
    self.on_error = Some(Arc::new(hook));
    self
  }

  /// Set the extra content transform.
  pub fn with_replace_fn(
    mut self,
    hook: impl Fn(&str, &Path) -> Value + Send + Sync + 'static,
  ) -> Self {
    self.replace_fn = Some(Arc::new(hook));
    self
  }

  /// Set the hook forwarded to the publisher.
  pub fn with_before_upload(
    mut self,
    hook: impl Fn(&str, &Path) -> String + Send + Sync + 'static,
  ) -> Self {
    self.before_upload = Some(Arc::new(hook));
    self
  }

  /// Set the prerequisite awaited before the run.
  pub fn with_wait_for<F, Fut>(mut self, hook: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
  {
    self.wait_for = Some(Arc::new(move || Box::pin(hook()) as WaitFuture));
    self
  }
}

impl fmt::Debug for PublishHooks {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PublishHooks")
      .field("url_cb", &self.url_cb.is_some())
      .field("on_finish", &self.on_finish.is_some())
      .field("on_error", &self.on_error.is_some())
      .field("replace_fn", &self.replace_fn.is_some())
      .field("before_upload", &self.before_upload.is_some())
      .field("wait_for", &self.wait_for.is_some())
      .finish()
  }
}

/// State threaded through the phases of one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
  /// Classified build outputs.
  pub assets: ClassifiedAssets,
  /// Rendered chunk filenames.
  pub descriptors: Vec<ChunkDescriptor>,
  /// Public path stripped from stylesheets and templates.
  pub public_path: String,
  /// URLs of images and fonts.
  pub img_font_map: UrlMap,
  /// URLs of chunk scripts before their chunk tables were patched.
  pub chunk_map: UrlMap,
  /// Chunk id to URL table patched into scripts.
  pub chunk_cdn_map: ChunkCdnMap,
  /// URLs of stylesheets.
  pub css_map: UrlMap,
  /// URLs of entry scripts.
  pub common_map: UrlMap,
  /// URLs of every non-entry script after patching.
  pub js_map: UrlMap,
  /// Files written so far.
  pub rewritten: Vec<PathBuf>,
  /// Hook results that were not strings.
  pub warnings: Vec<TransformWarning>,
}

impl RunContext {
  fn with_rewritten(mut self, paths: Vec<PathBuf>) -> Self {
    self.rewritten.extend(paths);
    self
  }

  fn with_warnings(mut self, warnings: Vec<TransformWarning>) -> Self {
    self.warnings.extend(warnings);
    self
  }

  /// Every URL that templates may reference.
  pub fn combined_urls(&self) -> UrlMap {
    let mut combined = UrlMap::new();
    for urls in [&self.js_map, &self.css_map, &self.img_font_map, &self.common_map] {
      merge_url_maps(&mut combined, urls);
    }
    combined
  }

  fn into_report(self) -> RunReport {
    RunReport {
      uploaded: self.combined_urls(),
      chunk_cdn_map: self.chunk_cdn_map,
      rewritten: self.rewritten,
      transform_warnings: self.warnings,
    }
  }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
  /// Every uploaded path with its final URL.
  pub uploaded: UrlMap,
  /// Chunk table patched into scripts.
  pub chunk_cdn_map: ChunkCdnMap,
  /// Files written during the run, in write order.
  pub rewritten: Vec<PathBuf>,
  /// Hook results that were not strings.
  pub transform_warnings: Vec<TransformWarning>,
}

/// Merge `source` into `target`, keeping the first URL seen for each path.
pub fn merge_url_maps(target: &mut UrlMap, source: &UrlMap) {
  for (path, url) in source {
    match target.get(path) {
      Some(existing) if existing != url => warn!(
        "{} already maps to {}; ignoring {}",
        path.display(),
        existing,
        url
      ),
      Some(_) => {}
      None => {
        target.insert(path.clone(), url.clone());
      }
    }
  }
}

fn hook_output(
  hook: &'static str,
  value: Value,
  path: &Path,
  warnings: &mut Vec<TransformWarning>,
) -> String {
  match value {
    Value::String(text) => text,
    other => {
      let warning = TransformWarning {
        hook,
        path: path.to_path_buf(),
        value: other.clone(),
      };
      warn!("{}", warning);
      warnings.push(warning);
      other.to_string()
    }
  }
}

fn paths_of<'a>(assets: impl IntoIterator<Item = &'a Asset>) -> Vec<PathBuf> {
  assets
    .into_iter()
    .map(|asset| asset.path().to_path_buf())
    .collect()
}

/// Drives one publish run per completed build.
pub struct PublishOrchestrator<P> {
  publisher: P,
  config: PublishConfig,
  hooks: PublishHooks,
}

impl<P: Publisher> PublishOrchestrator<P> {
  /// Create an orchestrator without hooks.
  pub fn new(publisher: P, config: PublishConfig) -> Self {
    Self {
      publisher,
      config,
      hooks: PublishHooks::default(),
    }
  }

  /// Replace the hooks.
  pub fn with_hooks(mut self, hooks: PublishHooks) -> Self {
    self.hooks = hooks;
    self
  }

  /// Active configuration.
  pub fn config(&self) -> &PublishConfig {
    &self.config
  }

  /// Run every phase and report the outcome to the finish or error hook.
  ///
  /// Nothing is rolled back on failure; files uploaded or written before the failing
  /// phase stay as they are.
  pub async fn publish(&self, manifest: &BuildManifest) -> PublishResult<RunReport> {
    match self.run(manifest).await {
      Ok(report) => {
        info!(
          "publish finished: {} uploads, {} files written",
          report.uploaded.len(),
          report.rewritten.len()
        );
        if let Some(on_finish) = &self.hooks.on_finish {
          on_finish(&report);
        }
        Ok(report)
      }
      Err(err) => {
        error!("publish aborted: {}", err);
        if let Some(on_error) = &self.hooks.on_error {
          on_error(&err);
        }
        Err(err)
      }
    }
  }

  /// Run every phase in order without invoking the finish or error hooks.
  pub async fn run(&self, manifest: &BuildManifest) -> PublishResult<RunReport> {
    if let Some(wait_for) = &self.hooks.wait_for {
      wait_for().await.map_err(PublishError::Hook)?;
    }

    let context = self.classify(manifest)?;
    let context = self.upload_images_and_fonts(context).await?;
    let context = self.rewrite_asset_references(context)?;
    let context = self.upload_chunks(context).await?;
    let context = self.upload_stylesheets(context).await?;
    let context = self.publish_entry_scripts(context).await?;
    let context = self.publish_remaining_scripts(context).await?;
    let context = self.rewrite_templates(context, manifest)?;

    Ok(context.into_report())
  }

  fn upload_options(&self) -> UploadOptions {
    UploadOptions {
      before_upload: self.hooks.before_upload.clone(),
      ..self.config.upload_options()
    }
  }

  async fn upload(
    &self,
    phase: &str,
    paths: Vec<PathBuf>,
  ) -> PublishResult<(UrlMap, Vec<TransformWarning>)> {
    if paths.is_empty() {
      debug!("{}: nothing to upload", phase);
      return Ok((UrlMap::new(), Vec::new()));
    }

    info!("{}: uploading {} files", phase, paths.len());
    let urls = self.publisher.upload(&paths, &self.upload_options()).await?;
    ensure_complete(&paths, &urls)?;

    let Some(url_cb) = &self.hooks.url_cb else {
      return Ok((urls, Vec::new()));
    };

    let mut warnings = Vec::new();
    let urls: UrlMap = urls
      .into_iter()
      .map(|(path, url)| {
        let url = hook_output("url_cb", url_cb(&url, &path), &path, &mut warnings);
        (path, url)
      })
      .collect();
    Ok((urls, warnings))
  }

  fn content_transform<'a>(
    &'a self,
    stripper: &'a PublicPathStripper,
    warnings: &'a RefCell<Vec<TransformWarning>>,
  ) -> impl Fn(&str, &Path) -> String + 'a {
    move |content: &str, path: &Path| {
      let stripped = stripper.strip(content);
      match &self.hooks.replace_fn {
        Some(replace_fn) => hook_output(
          "replace_fn",
          replace_fn(&stripped, path),
          path,
          &mut warnings.borrow_mut(),
        ),
        None => stripped,
      }
    }
  }

  fn rewrite_in_place(
    &self,
    paths: &[PathBuf],
    pairs: &UrlMap,
    options: RewriteOptions<'_>,
  ) -> PublishResult<Vec<PathBuf>> {
    let mut written = Vec::new();
    for path in paths {
      if ReferenceRewriter::apply(path, path, pairs, options)? == RewriteOutcome::Written {
        written.push(path.clone());
      }
    }
    Ok(written)
  }

  fn collect_entries(&self, manifest: &BuildManifest) -> PublishResult<Vec<PathBuf>> {
    match &self.config.static_dir {
      Some(static_dir) => {
        let mut entries = Vec::new();
        for dir in static_dir.dirs() {
          entries.extend(collect_files_recursively(dir)?);
        }
        Ok(entries)
      }
      None => Ok(manifest.emitted_paths()),
    }
  }

  fn classify(&self, manifest: &BuildManifest) -> PublishResult<RunContext> {
    let descriptors = build_chunk_map(
      &manifest.chunks,
      manifest.output.chunk_filename_template(),
    )?;
    let entries = self.collect_entries(manifest)?;
    let assets = AssetClassifier::new(&self.config.resolve).classify(&entries, &descriptors)?;

    info!(
      "classified {} images, {} fonts, {} stylesheets, {} scripts and {} templates",
      assets.images.len(),
      assets.fonts.len(),
      assets.stylesheets.len(),
      assets.scripts.len(),
      assets.templates.len()
    );

    let public_path = self
      .config
      .public_path
      .clone()
      .or_else(|| manifest.output.public_path.clone())
      .unwrap_or_default();

    Ok(RunContext {
      assets,
      descriptors,
      public_path,
      ..RunContext::default()
    })
  }

  async fn upload_images_and_fonts(&self, context: RunContext) -> PublishResult<RunContext> {
    let paths = paths_of(context.assets.images.iter().chain(&context.assets.fonts));
    let (img_font_map, warnings) = self.upload("images and fonts", paths).await?;
    Ok(RunContext {
      img_font_map,
      ..context
    }
    .with_warnings(warnings))
  }

  fn rewrite_asset_references(&self, context: RunContext) -> PublishResult<RunContext> {
    let paths = paths_of(context.assets.scripts.iter().chain(&context.assets.stylesheets));
    info!("rewriting image and font references in {} files", paths.len());

    let stripper = PublicPathStripper::build(&context.public_path)?;
    let extensions: Vec<String> = STYLESHEET_EXTENSIONS.iter().map(|ext| ext.to_string()).collect();
    let warnings = RefCell::new(Vec::new());

    let written = {
      let transform = self.content_transform(&stripper, &warnings);
      self.rewrite_in_place(&paths, &context.img_font_map, RewriteOptions {
        transform: Some(&transform),
        transform_extensions: &extensions,
        force_write: !self.config.dirty_check,
        ..RewriteOptions::default()
      })?
    };

    Ok(
      context
        .with_rewritten(written)
        .with_warnings(warnings.into_inner()),
    )
  }

  async fn upload_chunks(&self, context: RunContext) -> PublishResult<RunContext> {
    let paths = paths_of(context.assets.scripts_with_role(ScriptRole::Chunk));
    let (chunk_map, warnings) = self.upload("chunk scripts", paths).await?;
    let chunk_cdn_map = resolve_chunk_urls(&context.descriptors, &chunk_map);
    debug!("resolved {} chunk URLs", chunk_cdn_map.len());

    Ok(RunContext {
      chunk_map,
      chunk_cdn_map,
      ..context
    }
    .with_warnings(warnings))
  }

  async fn upload_stylesheets(&self, context: RunContext) -> PublishResult<RunContext> {
    let paths = paths_of(&context.assets.stylesheets);
    let (css_map, warnings) = self.upload("stylesheets", paths).await?;

    let written = if self.config.async_css {
      let entries = paths_of(context.assets.scripts_with_role(ScriptRole::Entry));
      self.rewrite_in_place(&entries, &UrlMap::new(), RewriteOptions {
        stylesheet_urls: Some(&css_map),
        ..RewriteOptions::default()
      })?
    } else {
      Vec::new()
    };

    Ok(
      RunContext { css_map, ..context }
        .with_rewritten(written)
        .with_warnings(warnings),
    )
  }

  async fn publish_entry_scripts(&self, context: RunContext) -> PublishResult<RunContext> {
    let entries = paths_of(context.assets.scripts_with_role(ScriptRole::Entry));
    if entries.is_empty() {
      return Ok(context);
    }

    let written = self.rewrite_in_place(&entries, &UrlMap::new(), RewriteOptions {
      chunk_urls: Some(&context.chunk_cdn_map),
      force_write: !self.config.dirty_check,
      ..RewriteOptions::default()
    })?;
    let (common_map, warnings) = self.upload("entry scripts", entries).await?;

    let mut chunk_cdn_map = context.chunk_cdn_map.clone();
    for (id, url) in resolve_chunk_urls(&context.descriptors, &common_map) {
      chunk_cdn_map.entry(id).or_insert(url);
    }

    Ok(
      RunContext {
        common_map,
        chunk_cdn_map,
        ..context
      }
      .with_rewritten(written)
      .with_warnings(warnings),
    )
  }

  async fn publish_remaining_scripts(&self, context: RunContext) -> PublishResult<RunContext> {
    let chunks = paths_of(context.assets.scripts_with_role(ScriptRole::Chunk));
    let written = self.rewrite_in_place(&chunks, &UrlMap::new(), RewriteOptions {
      chunk_urls: Some(&context.chunk_cdn_map),
      force_write: !self.config.dirty_check,
      ..RewriteOptions::default()
    })?;

    let paths = paths_of(context.assets.non_entry_scripts());
    let (js_map, warnings) = self.upload("remaining scripts", paths).await?;

    Ok(
      RunContext { js_map, ..context }
        .with_rewritten(written)
        .with_warnings(warnings),
    )
  }

  fn template_root(&self, template: &Path, manifest: &BuildManifest) -> Option<PathBuf> {
    if let Some(src) = &self.config.src {
      return Some(src.clone());
    }
    let static_root = self.config.static_dir.as_ref().and_then(|static_dir| {
      static_dir
        .dirs()
        .into_iter()
        .filter(|dir| template.starts_with(dir))
        .max_by_key(|dir| dir.components().count())
        .map(Path::to_path_buf)
    });
    static_root.or_else(|| manifest.output.path.clone())
  }

  fn template_destinations(
    &self,
    templates: Vec<PathBuf>,
    manifest: &BuildManifest,
  ) -> PublishResult<Vec<(PathBuf, PathBuf)>> {
    let mut claimed: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
    let mut pairs = Vec::with_capacity(templates.len());

    for template in templates {
      let source_root = self.template_root(&template, manifest);
      let destination = match (&source_root, self.config.dist.as_ref().or(source_root.as_ref())) {
        (Some(source_root), Some(dest_root)) => {
          mirror_destination(&template, source_root, dest_root)
        }
        (None, Some(dest_root)) => match template.file_name() {
          Some(name) => dest_root.join(name),
          None => template.clone(),
        },
        _ => template.clone(),
      };

      if let Some(previous) = claimed.insert(destination.clone(), template.clone()) {
        return Err(PublishError::configuration(format!(
          "templates {} and {} both map to {}",
          previous.display(),
          template.display(),
          destination.display()
        )));
      }
      pairs.push((template, destination));
    }

    Ok(pairs)
  }

  fn rewrite_templates(
    &self,
    context: RunContext,
    manifest: &BuildManifest,
  ) -> PublishResult<RunContext> {
    let templates = match &self.config.src {
      Some(src) => collect_files_with_extensions(src, &self.config.resolve)?,
      None => paths_of(&context.assets.templates),
    };
    let pairs = self.template_destinations(templates, manifest)?;
    info!("rewriting {} templates", pairs.len());

    let combined = context.combined_urls();
    let stripper = PublicPathStripper::build(&context.public_path)?;
    let warnings = RefCell::new(Vec::new());

    let mut written = Vec::new();
    {
      let transform = self.content_transform(&stripper, &warnings);
      let options = RewriteOptions {
        transform: Some(&transform),
        transform_extensions: &self.config.resolve,
        force_write: self.config.force_copy_template || !self.config.dirty_check,
        ..RewriteOptions::default()
      };

      for (template, destination) in pairs {
        if ReferenceRewriter::apply(&template, &destination, &combined, options)?
          == RewriteOutcome::Written
        {
          written.push(destination);
        }
      }
    }

    Ok(
      context
        .with_rewritten(written)
        .with_warnings(warnings.into_inner()),
    )
  }
}
