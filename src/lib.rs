#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod asset_paths;
pub mod classify;
pub mod config;
pub mod error;
pub mod manifest;
pub mod models;
pub mod orchestrator;
pub mod publisher;
pub mod rewrite;

pub use asset_paths::{PathPattern, PublicPathStripper};
pub use classify::{AssetClassifier, ClassifiedAssets};
pub use config::{PublishConfig, StaticDir};
pub use error::{PublishError, PublishResult};
pub use manifest::{BuildManifest, ChunkMapBuilder, load_build_manifest};
pub use models::{
  Asset, AssetRole, ChunkCdnMap, ChunkDescriptor, ChunkId, ScriptRole, TransformWarning, UrlMap,
};
pub use orchestrator::{PublishHooks, PublishOrchestrator, RunContext, RunReport};
pub use publisher::{LocalMirrorPublisher, Publisher, SlicedPublisher, UploadOptions};
pub use rewrite::{ReferenceRewriter, RewriteOptions, RewriteOutcome};
