//! Subject pattern parsing
//!
//! Subjects are plain strings such as `order/created` or `dev/book/1449373321`.
//! Route patterns registered against a router are split on a configurable
//! delimiter and may contain:
//!
//! ```text
//! dev/book/{book_id}      `{name}` binds one segment into a route parameter
//! files/*path             `*name` binds the remainder of the subject
//! ```
//!
//! With an empty delimiter parameters are disabled and every pattern is a
//! literal.

use crate::{Error, Result};

/// One piece of a parsed route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, delimiters included
    Literal(String),
    /// `{name}`: matches up to the next delimiter
    Param(String),
    /// `*name`: matches the rest of the subject
    CatchAll(String),
}

/// A parsed route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern using `delimiter` as the segment separator
    pub fn parse(raw: &str, delimiter: &str) -> Result<Self> {
        if delimiter.is_empty() {
            let segments = if raw.is_empty() {
                Vec::new()
            } else {
                vec![Segment::Literal(raw.to_string())]
            };
            return Ok(Self {
                raw: raw.to_string(),
                segments,
            });
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while !rest.is_empty() {
            let at_segment_start = literal.is_empty() && segments.is_empty()
                || literal.ends_with(delimiter)
                || (literal.is_empty() && ends_with_delimiter(&segments, delimiter));

            if at_segment_start && rest.starts_with('{') {
                let close = rest.find('}').ok_or_else(|| {
                    Error::InvalidPattern(format!("unclosed parameter in {:?}", raw))
                })?;
                let name = &rest[1..close];
                validate_name(name, raw)?;
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with(delimiter) {
                    return Err(Error::InvalidPattern(format!(
                        "parameter {{{}}} must be followed by {:?} in {:?}",
                        name, delimiter, raw
                    )));
                }
                flush(&mut literal, &mut segments);
                segments.push(Segment::Param(name.to_string()));
                continue;
            }

            if at_segment_start && rest.starts_with('*') {
                let name = &rest[1..];
                validate_name(name, raw)?;
                if name.contains(delimiter) {
                    return Err(Error::InvalidPattern(format!(
                        "catch-all *{} must be the last segment of {:?}",
                        name, raw
                    )));
                }
                flush(&mut literal, &mut segments);
                segments.push(Segment::CatchAll(name.to_string()));
                rest = "";
                continue;
            }

            let ch = rest.chars().next().unwrap_or_default();
            literal.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
        flush(&mut literal, &mut segments);

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Get the raw pattern string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Get the parsed segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Check if this pattern binds any route parameters
    pub fn has_params(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Literal(_)))
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn ends_with_delimiter(segments: &[Segment], delimiter: &str) -> bool {
    matches!(segments.last(), Some(Segment::Literal(s)) if s.ends_with(delimiter))
}

fn validate_name(name: &str, raw: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidPattern(format!(
            "empty parameter name in {:?}",
            raw
        )));
    }
    if name.contains(['{', '}', '*']) {
        return Err(Error::InvalidPattern(format!(
            "invalid parameter name {:?} in {:?}",
            name, raw
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        let p = Pattern::parse("order/created", "/").unwrap();
        assert_eq!(p.segments(), &[Segment::Literal("order/created".into())]);
        assert!(!p.has_params());
    }

    #[test]
    fn test_parse_param_in_middle() {
        let p = Pattern::parse("order/{id}/items", "/").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Literal("order/".into()),
                Segment::Param("id".into()),
                Segment::Literal("/items".into()),
            ]
        );
    }

    #[test]
    fn test_parse_catch_all() {
        let p = Pattern::parse("files/*path", "/").unwrap();
        assert_eq!(p.segments()[1], Segment::CatchAll("path".into()));
        assert!(Pattern::parse("files/*path/more", "/").is_err());
    }

    #[test]
    fn test_empty_delimiter_disables_params() {
        let p = Pattern::parse("order/{id}", "").unwrap();
        assert_eq!(p.segments(), &[Segment::Literal("order/{id}".into())]);
    }

    #[test]
    fn test_brace_inside_segment_is_literal() {
        let p = Pattern::parse("a{b}", "/").unwrap();
        assert_eq!(p.segments(), &[Segment::Literal("a{b}".into())]);
    }

    #[test]
    fn test_invalid_params() {
        assert!(Pattern::parse("order/{}", "/").is_err());
        assert!(Pattern::parse("order/{id", "/").is_err());
        assert!(Pattern::parse("order/{id}x", "/").is_err());
    }
}
