//! Build manifest handling broken into focused submodules for easier testing.

mod chunks;
mod loading;
mod scanning;

pub use chunks::{ChunkMapBuilder, build_chunk_map, resolve_chunk_urls};
pub use loading::{
  BuildManifest, ChunkRecord, ContentHash, DEFAULT_CHUNK_FILENAME, EmittedAsset, OutputOptions,
  load_build_manifest,
};
pub use scanning::{collect_files_recursively, collect_files_with_extensions, mirror_destination};
