//! Mutations applied to the runtime chunk loader embedded in entry scripts.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::models::ChunkCdnMap;

/// `<namespace>.p = <expr>;`, the loader's public path assignment.
fn public_path_assignment() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"[A-Za-z_$][\w$]*\.p\s*=[^=][^;]*;").expect("invalid public path regex")
  })
}

/// `<namespace>.p + <lookup>[<id>] ... ".js"`, the loader's chunk dispatch.
fn chunk_dispatch() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(
      r#"[A-Za-z_$][\w$]*\.p\s*\+[^;\n]*?\[\s*([A-Za-z_$][\w$]*)\s*\][^;\n]*?['"]\.js['"]\s*;?"#,
    )
    .expect("invalid chunk dispatch regex")
  })
}

/// Determine whether a script carries the runtime chunk loader.
///
/// Both halves of the loader signature must be present: chunk payloads may concatenate
/// the public path for their own assets but never assign it.
pub fn is_loader_script(content: &str) -> bool {
  public_path_assignment().is_match(content) && chunk_dispatch().is_match(content)
}

/// Replace the loader's local chunk filename lookup with a literal table of remote URLs.
///
/// `n.p + "js/" + {...}[e] + ".js"` becomes `({"1":"https://..."})[e];`, keeping the
/// id expression the loader indexes with. An empty table leaves the script untouched so
/// the local lookup keeps working when nothing was uploaded.
pub fn patch_chunk_table<'a>(content: &'a str, chunk_urls: &ChunkCdnMap) -> Cow<'a, str> {
  if chunk_urls.is_empty() {
    return Cow::Borrowed(content);
  }

  let table = match serde_json::to_string(chunk_urls) {
    Ok(table) => table,
    Err(_) => return Cow::Borrowed(content),
  };

  chunk_dispatch().replace_all(content, |caps: &Captures<'_>| format!("({table})[{}];", &caps[1]))
}

#[cfg(test)]
mod tests {
  use super::*;

  const ENTRY: &str = r#"__loader__.p = "/static/";
function load(id) {
  script.src = __loader__.p + map[id] + ".js";
  document.head.appendChild(script);
}"#;

  fn urls() -> ChunkCdnMap {
    ChunkCdnMap::from([("1".to_string(), "https://cdn/chunk1.js".to_string())])
  }

  #[test]
  fn detects_loader_signature() {
    assert!(is_loader_script(ENTRY));
  }

  #[test]
  fn chunk_payload_is_not_a_loader() {
    let payload = r#"(window.jsonp=window.jsonp||[]).push([[1],{5:function(e,t,n){e.exports=n.p+"static/img/a.png"}}]);"#;
    assert!(!is_loader_script(payload));
  }

  #[test]
  fn replaces_lookup_with_literal_table() {
    let patched = patch_chunk_table(ENTRY, &urls());
    assert!(patched.contains(r#"script.src = ({"1":"https://cdn/chunk1.js"})[id];"#));
    assert!(!patched.contains("__loader__.p + map"));
    assert!(patched.contains(r#"__loader__.p = "/static/";"#));
  }

  #[test]
  fn handles_minified_lookup_with_fallback() {
    let minified = r#"function u(e){return n.p+"static/js/"+({0:"app"}[e]||e)+"."+{0:"abcd",1:"ef01"}[e]+".js"}"#;
    let patched = patch_chunk_table(minified, &urls());
    assert_eq!(
      patched,
      r#"function u(e){return ({"1":"https://cdn/chunk1.js"})[e];}"#
    );
  }

  #[test]
  fn empty_table_is_a_noop() {
    let patched = patch_chunk_table(ENTRY, &ChunkCdnMap::new());
    assert!(matches!(patched, Cow::Borrowed(_)));
    assert_eq!(patched, ENTRY);
  }
}
