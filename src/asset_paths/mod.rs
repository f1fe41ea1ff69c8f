//! Helpers for locating local asset paths inside arbitrary source text.
//!
//! The responsibilities are split into focused submodules so that extension filtering,
//! reference matching and public-path stripping can be tested independently. Every
//! rewrite in the publish run is built on top of these three pieces.

mod filters;
mod pattern;
mod public_path;

pub use filters::{
  FONT_EXTENSIONS, IMAGE_EXTENSIONS, SCRIPT_EXTENSIONS, STYLESHEET_EXTENSIONS, extension_of,
  has_extension,
};
pub use pattern::PathPattern;
pub use public_path::PublicPathStripper;

/// Capturing alternation for the syntax that precedes a resource reference.
///
/// Matches an assignment, call or concatenation operator optionally followed by an
/// opening quote, or a bare opening quote.
pub(crate) const REFERENCE_PREFIX: &str = r#"([=(+]\s*['"`]?|['"`])"#;
