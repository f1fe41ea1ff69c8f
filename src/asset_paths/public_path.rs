use regex::{Captures, Regex};

use super::REFERENCE_PREFIX;
use crate::error::PublishResult;

/// Removes the configured public path from references in stylesheets and templates.
///
/// The public path is redundant once references point at absolute remote URLs, and it
/// would corrupt them if left in front. Only the path is removed; the assignment or
/// attribute token before it stays in place.
#[derive(Debug, Clone)]
pub struct PublicPathStripper {
  regex: Option<Regex>,
}

impl PublicPathStripper {
  /// Build a stripper for the given public path. Paths without segments (`""`, `"/"`,
  /// `"./"`) produce a stripper that never changes anything.
  pub fn build(public_path: &str) -> PublishResult<Self> {
    let segments: Vec<String> = public_path
      .split(['/', '\\'])
      .filter(|segment| !segment.is_empty() && *segment != ".")
      .map(regex::escape)
      .collect();

    if segments.is_empty() {
      return Ok(Self { regex: None });
    }

    let source = format!(r"{REFERENCE_PREFIX}/*{}/+", segments.join("/+"));
    Ok(Self {
      regex: Some(Regex::new(&source)?),
    })
  }

  /// True when stripping can never change the content.
  pub fn is_noop(&self) -> bool {
    self.regex.is_none()
  }

  /// Remove every occurrence of the public path that follows a reference prefix.
  pub fn strip(&self, content: &str) -> String {
    match &self.regex {
      Some(regex) => regex
        .replace_all(content, |caps: &Captures<'_>| caps[1].to_string())
        .into_owned(),
      None => content.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_absolute_public_path_from_attribute() {
    let stripper = PublicPathStripper::build("/static/").unwrap();
    assert_eq!(stripper.strip(r#"<img src="/static/a.png">"#), r#"<img src="a.png">"#);
  }

  #[test]
  fn strips_inside_stylesheet_urls() {
    let stripper = PublicPathStripper::build("/static/").unwrap();
    assert_eq!(
      stripper.strip("a{background:url(/static/img/b.png)}"),
      "a{background:url(img/b.png)}"
    );
  }

  #[test]
  fn escapes_dots_in_host_segments() {
    let stripper = PublicPathStripper::build("//assets.example.com/v2/").unwrap();
    let content = r#"<link href="//assets.example.com/v2/app.css"><a href="//assetsXexampleXcom/v2/x">"#;
    assert_eq!(
      stripper.strip(content),
      r#"<link href="app.css"><a href="//assetsXexampleXcom/v2/x">"#
    );
  }

  #[test]
  fn requires_segment_boundary() {
    let stripper = PublicPathStripper::build("/static/").unwrap();
    let content = r#"<img src="/staticfiles/a.png">"#;
    assert_eq!(stripper.strip(content), content);
  }

  #[test]
  fn root_public_path_is_a_noop() {
    let stripper = PublicPathStripper::build("/").unwrap();
    assert!(stripper.is_noop());
    assert_eq!(stripper.strip(r#"src="/a.png""#), r#"src="/a.png""#);
  }
}
