//! A small interpreter for the href expressions the stylesheet loader embeds.
//!
//! Only literal string concatenation, object literal lookups, `||` fallbacks, property
//! access and `.replace(literal, literal)` are understood. Anything else is rejected, so
//! no part of the script is ever executed.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Reasons an expression could not be parsed or evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
  /// Input ended in the middle of an expression.
  #[error("unexpected end of expression")]
  UnexpectedEnd,
  /// A character that cannot start or continue an expression.
  #[error("unexpected {found:?} at offset {offset}")]
  Unexpected {
    /// Offending character.
    found: char,
    /// Byte offset within the source.
    offset: usize,
  },
  /// A construct outside the supported grammar, such as a call.
  #[error("unsupported construct at offset {0}")]
  Unsupported(usize),
  /// An identifier with no binding.
  #[error("unbound identifier {0}")]
  Unbound(String),
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  /// String literal.
  Str(String),
  /// Numeric literal.
  Num(f64),
  /// Variable reference.
  Ident(String),
  /// Object literal, keys in source order.
  Object(Vec<(String, Expr)>),
  /// `a + b + ...`
  Concat(Vec<Expr>),
  /// `a || b`
  Or(Box<Expr>, Box<Expr>),
  /// `target[index]`
  Index(Box<Expr>, Box<Expr>),
  /// `target.name`
  Member(Box<Expr>, String),
  /// `target.replace(pattern, replacement)` with a literal pattern.
  Replace(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Runtime value produced by evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  /// Missing property or empty concatenation.
  Undefined,
  /// String value.
  Str(String),
  /// Number value.
  Num(f64),
  /// Object value.
  Object(BTreeMap<String, Value>),
}

impl Value {
  fn is_truthy(&self) -> bool {
    match self {
      Self::Undefined => false,
      Self::Str(value) => !value.is_empty(),
      Self::Num(value) => *value != 0.0 && !value.is_nan(),
      Self::Object(_) => true,
    }
  }

  /// String conversion following the script runtime's rules.
  pub fn to_js_string(&self) -> String {
    match self {
      Self::Undefined => "undefined".to_string(),
      Self::Str(value) => value.clone(),
      Self::Num(value) => format_number(*value),
      Self::Object(_) => "[object Object]".to_string(),
    }
  }

  fn add(self, other: Value) -> Value {
    match (self, other) {
      (Self::Num(left), Self::Num(right)) => Self::Num(left + right),
      (left, right) => Self::Str(left.to_js_string() + &right.to_js_string()),
    }
  }

  fn property(&self, key: &str) -> Value {
    match self {
      Self::Object(entries) => entries.get(key).cloned().unwrap_or(Self::Undefined),
      _ => Self::Undefined,
    }
  }
}

fn format_number(value: f64) -> String {
  if value.fract() == 0.0 && value.abs() < 1e15 {
    format!("{}", value as i64)
  } else {
    format!("{value}")
  }
}

/// Parse one expression starting at byte offset `start`.
///
/// Returns the expression and the offset just past its last token, so callers can parse
/// an expression embedded in a larger script.
pub fn parse_expression(source: &str, start: usize) -> Result<(Expr, usize), ExprError> {
  let mut parser = Parser {
    src: source,
    pos: start,
    depth: 0,
  };
  let expr = parser.parse_or()?;
  Ok((expr, parser.pos))
}

impl Expr {
  /// Evaluate with the given variable bindings.
  pub fn evaluate(&self, bindings: &BTreeMap<String, Value>) -> Result<Value, ExprError> {
    let value = match self {
      Self::Str(value) => Value::Str(value.clone()),
      Self::Num(value) => Value::Num(*value),
      Self::Ident(name) => bindings
        .get(name)
        .cloned()
        .ok_or_else(|| ExprError::Unbound(name.clone()))?,
      Self::Object(entries) => {
        let mut object = BTreeMap::new();
        for (key, value) in entries {
          object.insert(key.clone(), value.evaluate(bindings)?);
        }
        Value::Object(object)
      }
      Self::Concat(terms) => {
        let mut result: Option<Value> = None;
        for term in terms {
          let value = term.evaluate(bindings)?;
          result = Some(match result {
            Some(previous) => previous.add(value),
            None => value,
          });
        }
        result.unwrap_or(Value::Undefined)
      }
      Self::Or(left, right) => {
        let left = left.evaluate(bindings)?;
        if left.is_truthy() {
          left
        } else {
          right.evaluate(bindings)?
        }
      }
      Self::Index(target, index) => {
        let key = index.evaluate(bindings)?.to_js_string();
        target.evaluate(bindings)?.property(&key)
      }
      Self::Member(target, name) => target.evaluate(bindings)?.property(name),
      Self::Replace(target, pattern, replacement) => {
        let target = target.evaluate(bindings)?.to_js_string();
        let pattern = pattern.evaluate(bindings)?.to_js_string();
        let replacement = replacement.evaluate(bindings)?.to_js_string();
        Value::Str(target.replacen(&pattern, &replacement, 1))
      }
    };
    Ok(value)
  }

  /// Variables the expression reads.
  pub fn free_identifiers(&self) -> BTreeSet<String> {
    let mut identifiers = BTreeSet::new();
    self.visit(&mut |expr| {
      if let Self::Ident(name) = expr {
        identifiers.insert(name.clone());
      }
    });
    identifiers
  }

  /// Keys of every object literal indexed directly by `variable`.
  pub fn lookup_keys(&self, variable: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    self.visit(&mut |expr| {
      if let Self::Index(target, index) = expr
        && let (Self::Object(entries), Self::Ident(name)) = (target.as_ref(), index.as_ref())
        && name == variable
      {
        keys.extend(entries.iter().map(|(key, _)| key.clone()));
      }
    });
    keys
  }

  fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
    f(self);
    match self {
      Self::Str(_) | Self::Num(_) | Self::Ident(_) => {}
      Self::Object(entries) => {
        for (_, value) in entries {
          value.visit(f);
        }
      }
      Self::Concat(terms) => {
        for term in terms {
          term.visit(f);
        }
      }
      Self::Or(left, right) | Self::Index(left, right) => {
        left.visit(f);
        right.visit(f);
      }
      Self::Member(target, _) => target.visit(f),
      Self::Replace(target, pattern, replacement) => {
        target.visit(f);
        pattern.visit(f);
        replacement.visit(f);
      }
    }
  }
}

fn is_identifier_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Nesting allowed before an expression is rejected as unsupported.
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
  src: &'a str,
  pos: usize,
  depth: usize,
}

impl<'a> Parser<'a> {
  fn rest(&self) -> &'a str {
    &self.src[self.pos..]
  }

  fn peek(&self) -> Option<char> {
    self.rest().chars().next()
  }

  fn skip_whitespace(&mut self) {
    let rest = self.rest();
    let trimmed = rest.trim_start();
    self.pos += rest.len() - trimmed.len();
  }

  fn unexpected(&self) -> ExprError {
    match self.peek() {
      Some(found) => ExprError::Unexpected {
        found,
        offset: self.pos,
      },
      None => ExprError::UnexpectedEnd,
    }
  }

  fn expect(&mut self, expected: char) -> Result<(), ExprError> {
    self.skip_whitespace();
    if self.peek() == Some(expected) {
      self.pos += expected.len_utf8();
      Ok(())
    } else {
      Err(self.unexpected())
    }
  }

  fn descend(&mut self) -> Result<(), ExprError> {
    self.depth += 1;
    if self.depth > MAX_DEPTH {
      return Err(ExprError::Unsupported(self.pos));
    }
    Ok(())
  }

  fn parse_or(&mut self) -> Result<Expr, ExprError> {
    let entry_depth = self.depth;
    let result = self.parse_or_chain();
    self.depth = entry_depth;
    result
  }

  fn parse_or_chain(&mut self) -> Result<Expr, ExprError> {
    self.descend()?;
    let mut left = self.parse_concat()?;
    loop {
      let checkpoint = self.pos;
      self.skip_whitespace();
      if !self.rest().starts_with("||") {
        self.pos = checkpoint;
        return Ok(left);
      }
      self.pos += 2;
      self.descend()?;
      let right = self.parse_concat()?;
      left = Expr::Or(Box::new(left), Box::new(right));
    }
  }

  fn parse_concat(&mut self) -> Result<Expr, ExprError> {
    let mut terms = vec![self.parse_postfix()?];
    loop {
      let checkpoint = self.pos;
      self.skip_whitespace();
      let rest = self.rest();
      if !rest.starts_with('+') || rest.starts_with("++") || rest.starts_with("+=") {
        self.pos = checkpoint;
        break;
      }
      self.pos += 1;
      terms.push(self.parse_postfix()?);
    }

    Ok(if terms.len() == 1 {
      terms.remove(0)
    } else {
      Expr::Concat(terms)
    })
  }

  fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
    let entry_depth = self.depth;
    let mut expr = self.parse_primary()?;
    loop {
      let checkpoint = self.pos;
      self.skip_whitespace();
      if matches!(self.peek(), Some('[' | '.')) {
        self.descend()?;
      }
      match self.peek() {
        Some('[') => {
          self.pos += 1;
          let index = self.parse_or()?;
          self.expect(']')?;
          expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        Some('.') => {
          self.pos += 1;
          self.skip_whitespace();
          let name = self.parse_identifier()?;
          if name == "replace" {
            self.expect('(')?;
            let pattern = self.parse_or()?;
            self.expect(',')?;
            let replacement = self.parse_or()?;
            self.expect(')')?;
            expr = Expr::Replace(Box::new(expr), Box::new(pattern), Box::new(replacement));
          } else {
            expr = Expr::Member(Box::new(expr), name);
          }
        }
        Some('(') => return Err(ExprError::Unsupported(self.pos)),
        _ => {
          self.pos = checkpoint;
          self.depth = entry_depth;
          return Ok(expr);
        }
      }
    }
  }

  fn parse_primary(&mut self) -> Result<Expr, ExprError> {
    self.skip_whitespace();
    match self.peek() {
      Some(quote @ ('"' | '\'')) => self.parse_string(quote).map(Expr::Str),
      Some('(') => {
        self.pos += 1;
        let inner = self.parse_or()?;
        self.expect(')')?;
        Ok(inner)
      }
      Some('{') => self.parse_object(),
      Some(c) if c.is_ascii_digit() => self.parse_number().map(Expr::Num),
      Some(c) if is_identifier_start(c) => self.parse_identifier().map(Expr::Ident),
      _ => Err(self.unexpected()),
    }
  }

  fn parse_string(&mut self, quote: char) -> Result<String, ExprError> {
    self.pos += quote.len_utf8();
    let mut value = String::new();
    let mut chars = self.rest().char_indices();
    while let Some((offset, c)) = chars.next() {
      if c == quote {
        self.pos += offset + c.len_utf8();
        return Ok(value);
      }
      if c == '\\' {
        match chars.next() {
          Some((_, 'n')) => value.push('\n'),
          Some((_, 't')) => value.push('\t'),
          Some((_, escaped)) => value.push(escaped),
          None => break,
        }
      } else {
        value.push(c);
      }
    }
    Err(ExprError::UnexpectedEnd)
  }

  fn parse_number(&mut self) -> Result<f64, ExprError> {
    let start = self.pos;
    let rest = self.rest();
    let mut len = rest
      .find(|c: char| !c.is_ascii_digit())
      .unwrap_or(rest.len());
    if rest[len..].starts_with('.') && rest[len + 1..].starts_with(|c: char| c.is_ascii_digit()) {
      let fraction = &rest[len + 1..];
      len += 1 + fraction
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(fraction.len());
    }
    let literal = &rest[..len];
    let value = literal
      .parse::<f64>()
      .map_err(|_| ExprError::Unsupported(start))?;
    self.pos += len;
    Ok(value)
  }

  fn parse_identifier(&mut self) -> Result<String, ExprError> {
    match self.peek() {
      Some(c) if is_identifier_start(c) => {}
      _ => return Err(self.unexpected()),
    }
    let rest = self.rest();
    let len = rest
      .find(|c: char| !is_identifier_part(c))
      .unwrap_or(rest.len());
    let name = rest[..len].to_string();
    self.pos += len;
    Ok(name)
  }

  fn parse_object(&mut self) -> Result<Expr, ExprError> {
    self.expect('{')?;
    let mut entries = Vec::new();
    self.skip_whitespace();
    if self.peek() == Some('}') {
      self.pos += 1;
      return Ok(Expr::Object(entries));
    }

    loop {
      self.skip_whitespace();
      let key = match self.peek() {
        Some(quote @ ('"' | '\'')) => self.parse_string(quote)?,
        Some(c) if c.is_ascii_digit() => format_number(self.parse_number()?),
        Some(c) if is_identifier_start(c) => self.parse_identifier()?,
        _ => return Err(self.unexpected()),
      };
      self.expect(':')?;
      let value = self.parse_or()?;
      entries.push((key, value));

      self.skip_whitespace();
      match self.peek() {
        Some(',') => {
          self.pos += 1;
          self.skip_whitespace();
          if self.peek() == Some('}') {
            self.pos += 1;
            break;
          }
        }
        Some('}') => {
          self.pos += 1;
          break;
        }
        _ => return Err(self.unexpected()),
      }
    }

    Ok(Expr::Object(entries))
  }
}
