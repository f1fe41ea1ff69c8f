use std::path::Path;

/// Extensions published in the image phase.
pub const IMAGE_EXTENSIONS: &[&str] = &[
  "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "avif",
];

/// Extensions published alongside images in the font phase.
pub const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "eot", "otf"];

/// Stylesheet extensions.
pub const STYLESHEET_EXTENSIONS: &[&str] = &["css"];

/// Script extensions.
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs"];

/// Lower-cased extension of a path, without the leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| ext.to_ascii_lowercase())
}

/// Determine whether the path carries one of the given extensions.
///
/// Entries in `extensions` may be written with or without a leading dot.
pub fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
  let Some(ext) = extension_of(path) else {
    return false;
  };

  extensions
    .iter()
    .any(|candidate| candidate.as_ref().trim_start_matches('.').eq_ignore_ascii_case(&ext))
}
