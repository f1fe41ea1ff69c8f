//! Point the runtime's asynchronous stylesheet loader at uploaded stylesheets.
//!
//! The loader builds each stylesheet href from an inline expression and prefixes it with
//! the public path. The expression is interpreted per chunk id with [`super::expr`] to
//! recover the local href, which is then looked up among the uploaded stylesheets.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::debug;

use super::expr::{Expr, Value, parse_expression};
use crate::error::PublishResult;
use crate::models::{ChunkCdnMap, UrlMap, normalise_separators};

fn href_assignment() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"([A-Za-z_$][\w$]*)\s*=\s*["'({]"#).expect("invalid href assignment regex")
  })
}

/// The statement computing a stylesheet href from a chunk id.
#[derive(Debug)]
struct HrefStatement {
  variable: String,
  id_variable: String,
  expr: Expr,
  span: Range<usize>,
}

impl HrefStatement {
  fn render(&self, id: &str) -> Option<String> {
    let bindings = BTreeMap::from([(self.id_variable.clone(), Value::Str(id.to_string()))]);
    match self.expr.evaluate(&bindings) {
      Ok(Value::Str(href)) => Some(href),
      _ => None,
    }
  }
}

fn find_href_statement(content: &str) -> Option<HrefStatement> {
  for caps in href_assignment().captures_iter(content) {
    let (Some(whole), Some(variable)) = (caps.get(0), caps.get(1)) else {
      continue;
    };
    let start = whole.end() - 1;
    let Ok((expr, end)) = parse_expression(content, start) else {
      continue;
    };

    let identifiers = expr.free_identifiers();
    let Some(id_variable) = identifiers.first().filter(|_| identifiers.len() == 1) else {
      continue;
    };

    let statement = HrefStatement {
      variable: variable.as_str().to_string(),
      id_variable: id_variable.clone(),
      expr,
      span: start..end,
    };
    let renders_stylesheet = statement
      .expr
      .lookup_keys(id_variable)
      .first()
      .and_then(|id| statement.render(id))
      .is_some_and(|href| href.ends_with(".css"));
    if renders_stylesheet {
      return Some(statement);
    }
  }
  None
}

fn find_stylesheet_url<'a>(href: &str, stylesheet_urls: &'a UrlMap) -> Option<&'a String> {
  let relative = href.trim_start_matches("./").trim_start_matches('/');
  let suffix = format!("/{relative}");
  stylesheet_urls
    .iter()
    .find(|(path, _)| {
      let path = normalise_separators(path);
      path == relative || path.ends_with(&suffix)
    })
    .map(|(_, url)| url)
}

/// Rewrite the loader so each chunk's stylesheet href comes from a literal id to URL table.
///
/// The statement prefixing the href with the public path is replaced with a lookup in
/// the table; when no such statement exists the href expression itself is replaced. The
/// table must cover every chunk id the loader knows about, otherwise the script is left
/// unchanged.
pub fn patch_async_css<'a>(
  content: &'a str,
  stylesheet_urls: &UrlMap,
) -> PublishResult<Cow<'a, str>> {
  let Some(statement) = find_href_statement(content) else {
    return Ok(Cow::Borrowed(content));
  };

  let mut table = ChunkCdnMap::new();
  for id in statement.expr.lookup_keys(&statement.id_variable) {
    let Some(url) = statement
      .render(&id)
      .and_then(|href| find_stylesheet_url(&href, stylesheet_urls))
    else {
      debug!(
        "stylesheet for chunk {} was not uploaded; leaving async stylesheet map untouched",
        id
      );
      return Ok(Cow::Borrowed(content));
    };
    table.insert(id, url.clone());
  }

  let Ok(literal) = serde_json::to_string(&table) else {
    return Ok(Cow::Borrowed(content));
  };
  let lookup = format!("{literal}[{}]", statement.id_variable);
  if content.contains(&lookup) {
    return Ok(Cow::Borrowed(content));
  }

  let full_href = Regex::new(&format!(
    r"([A-Za-z_$][\w$]*\s*=\s*)[A-Za-z_$][\w$]*\.p\s*\+\s*{}\b",
    regex::escape(&statement.variable)
  ))?;
  if full_href.is_match(content) {
    return Ok(Cow::Owned(
      full_href
        .replace(content, |caps: &Captures<'_>| format!("{}{lookup}", &caps[1]))
        .into_owned(),
    ));
  }

  let Range { start, end } = statement.span;
  Ok(Cow::Owned(format!(
    "{}{lookup}{}",
    &content[..start],
    &content[end..]
  )))
}
