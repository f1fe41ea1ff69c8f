use std::path::Path;

use regex::{Captures, Regex};

use super::REFERENCE_PREFIX;
use crate::error::{PublishError, PublishResult};
use crate::models::normalise_separators;

/// A plain, escaped (`\/`) or Windows-style separator.
const SEPARATOR: &str = r"(?:\\?/|\\{1,2})";

/// Characters that cannot continue a filename; keeps `a.png` from matching `a.png.map`.
const TERMINATOR: &str = r"([^\w.\-]|$)";

/// Tolerant matcher for references to one local asset.
///
/// Every directory segment of the path is optional, so `./img/a.png`, `img/a.png`,
/// `/static/img/a.png` and `a.png` all match the asset `/out/static/img/a.png`. The
/// filename itself is always required verbatim and must directly follow a reference
/// prefix (see [`REFERENCE_PREFIX`]).
#[derive(Debug, Clone)]
pub struct PathPattern {
  regex: Regex,
}

impl PathPattern {
  /// Build the matcher for a local path.
  pub fn build(local_path: impl AsRef<Path>) -> PublishResult<Self> {
    let local_path = local_path.as_ref();
    let normalised = normalise_separators(local_path);
    let segments: Vec<&str> = normalised
      .split('/')
      .filter(|segment| !segment.is_empty())
      .collect();

    let Some((file_name, directories)) = segments.split_last() else {
      return Err(PublishError::configuration(format!(
        "cannot build a reference pattern for empty path {:?}",
        local_path
      )));
    };

    let mut source = format!(r"{REFERENCE_PREFIX}(?:\.{{1,2}}{SEPARATOR})*{SEPARATOR}?");
    for directory in directories {
      source.push_str(&format!("(?:{}{SEPARATOR})?", regex::escape(directory)));
    }
    source.push_str(&regex::escape(file_name));
    source.push_str(TERMINATOR);

    Ok(Self {
      regex: Regex::new(&source)?,
    })
  }

  /// True when the text still references the asset.
  pub fn is_match(&self, text: &str) -> bool {
    self.regex.is_match(text)
  }

  /// Replace every reference with `replacement`, keeping the syntax around it.
  pub fn find_and_replace(&self, text: &str, replacement: &str) -> String {
    self
      .regex
      .replace_all(text, |caps: &Captures<'_>| {
        format!("{}{}{}", &caps[1], replacement, &caps[2])
      })
      .into_owned()
  }
}
