//! Statement templates
//!
//! Templates carry named placeholders that are replaced textually before the
//! statement reaches the driver:
//!
//! - `$name` or `${name}` is replaced by the value registered under `name`
//! - `$$` produces a literal `$`
//! - names start with an ASCII letter or underscore, followed by ASCII
//!   letters, digits or underscores
//!
//! Substitution is plain text, not parameter binding. Values are inserted
//! verbatim, so callers escape them (see [`escape_string_literal`](crate::security::escape_string_literal)).

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{Error, Result};

/// Values substituted into a [`StatementTemplate`]
pub type TemplateValues = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed statement template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl StatementTemplate {
    /// Parse a template, rejecting a `$` that starts no valid placeholder
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let segments = parse_segments(&source)?;
        Ok(Self { source, segments })
    }

    /// The template text as given
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Distinct placeholder names in the template
    pub fn placeholders(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute every placeholder.
    ///
    /// Fails with a template error naming the first placeholder that has no
    /// value. Extra values are ignored.
    pub fn render(&self, values: &TemplateValues) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values.get(name).ok_or_else(|| {
                        Error::template(format!("no value for placeholder '{}'", name))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for StatementTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for StatementTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parse and render in one step
pub fn render(template: &str, values: &TemplateValues) -> Result<String> {
    StatementTemplate::parse(template)?.render(values)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_segments(source: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }

        let name = match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                literal.push('$');
                continue;
            }
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) if name.is_empty() && is_ident_start(c) => name.push(c),
                        Some((_, c)) if !name.is_empty() && is_ident_char(c) => name.push(c),
                        _ => return Err(invalid_placeholder(source, pos)),
                    }
                }
                if name.is_empty() {
                    return Err(invalid_placeholder(source, pos));
                }
                name
            }
            Some((_, c)) if is_ident_start(c) => {
                let mut name = String::new();
                while let Some((_, c)) = chars.peek().copied() {
                    if !is_ident_char(c) {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                name
            }
            _ => return Err(invalid_placeholder(source, pos)),
        };

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Placeholder(name));
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn invalid_placeholder(source: &str, pos: usize) -> Error {
    let before = &source[..pos];
    let line = before.matches('\n').count() + 1;
    let col = before.rfind('\n').map_or(pos, |nl| pos - nl - 1) + 1;
    Error::template(format!(
        "invalid placeholder at line {}, col {}",
        line, col
    ))
}
