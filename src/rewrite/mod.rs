//! Content rewriting applied to build outputs between upload phases.
//!
//! `references` swaps local asset references for remote URLs, `chunk_table` and
//! `async_css` patch the runtime loader embedded in entry scripts, and `expr` interprets
//! the small expression language the stylesheet loader builds its hrefs with.

mod async_css;
mod chunk_table;
pub mod expr;
mod references;

pub use async_css::patch_async_css;
pub use chunk_table::{is_loader_script, patch_chunk_table};
pub use references::{
  ContentTransform, ReferenceRewriter, RewriteOptions, RewriteOutcome, rewrite_references,
};
