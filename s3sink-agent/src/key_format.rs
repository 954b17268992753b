//! Object key templates
//!
//! A template mixes placeholders with strftime text:
//!
//! - `$TAG`: the record tag
//! - `$TAG[n]`: the n-th dot-separated segment of the tag, from zero
//! - `$INDEX`: the batch index within this run
//! - `$ID`: a fresh ULID
//!
//! Everything else goes through `strftime` in UTC. Placeholder values are
//! inserted verbatim, so a `%` inside a tag is never read as a specifier.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use s3sink_core::{ObjectKey, StoreError};
use std::fmt::Write;
use thiserror::Error;
use ulid::Ulid;

#[derive(Debug, Error)]
pub enum KeyFormatError {
    #[error("invalid time specifier in key format: {0:?}")]
    InvalidTimeFormat(String),

    #[error("malformed placeholder in key format: {0:?}")]
    InvalidPlaceholder(String),

    #[error("key format uses $TAG[{index}] but tag {tag:?} has {segments} segments")]
    TagSegmentOutOfRange {
        index: usize,
        tag: String,
        segments: usize,
    },

    #[error("resolved key is invalid: {0}")]
    InvalidKey(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Time(String),
    Tag,
    TagPart(usize),
    Index,
    Id,
}

#[derive(Debug, Clone)]
pub struct KeyFormat {
    template: String,
    segments: Vec<Segment>,
}

impl KeyFormat {
    pub fn parse(template: &str) -> Result<Self, KeyFormatError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            rest = &rest[pos..];

            let (segment, len) = if let Some(after) = rest.strip_prefix("$TAG[") {
                let close = after
                    .find(']')
                    .ok_or_else(|| KeyFormatError::InvalidPlaceholder(rest.to_string()))?;
                let index = after[..close]
                    .parse::<usize>()
                    .map_err(|_| KeyFormatError::InvalidPlaceholder(rest[..close + 6].to_string()))?;
                (Some(Segment::TagPart(index)), "$TAG[".len() + close + 1)
            } else if rest.starts_with("$TAG") {
                (Some(Segment::Tag), "$TAG".len())
            } else if rest.starts_with("$INDEX") {
                (Some(Segment::Index), "$INDEX".len())
            } else if rest.starts_with("$ID") {
                (Some(Segment::Id), "$ID".len())
            } else {
                (None, 1)
            };

            match segment {
                Some(segment) => {
                    flush_literal(&mut literal, &mut segments)?;
                    segments.push(segment);
                }
                None => literal.push('$'),
            }
            rest = &rest[len..];
        }
        literal.push_str(rest);
        flush_literal(&mut literal, &mut segments)?;

        Ok(KeyFormat {
            template: template.to_string(),
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Build the key for batch `index` of `tag`, started at `now`
    pub fn resolve(&self, tag: &str, index: u64, now: DateTime<Utc>) -> Result<ObjectKey, KeyFormatError> {
        let mut key = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Time(text) => {
                    write!(key, "{}", now.format(text))
                        .map_err(|_| KeyFormatError::InvalidTimeFormat(text.clone()))?;
                }
                Segment::Tag => key.push_str(tag),
                Segment::TagPart(n) => {
                    let part = tag.split('.').nth(*n).ok_or_else(|| {
                        KeyFormatError::TagSegmentOutOfRange {
                            index: *n,
                            tag: tag.to_string(),
                            segments: tag.split('.').count(),
                        }
                    })?;
                    key.push_str(part);
                }
                Segment::Index => key.push_str(&index.to_string()),
                Segment::Id => key.push_str(&Ulid::new().to_string()),
            }
        }

        Ok(ObjectKey::new(key.trim_start_matches('/'))?)
    }
}

fn flush_literal(literal: &mut String, segments: &mut Vec<Segment>) -> Result<(), KeyFormatError> {
    if literal.is_empty() {
        return Ok(());
    }
    if StrftimeItems::new(literal).any(|item| matches!(item, Item::Error)) {
        return Err(KeyFormatError::InvalidTimeFormat(literal.clone()));
    }
    segments.push(Segment::Time(std::mem::take(literal)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    #[test]
    fn test_placeholders_and_time() {
        let format = KeyFormat::parse("logs/$TAG/%Y/%m/%d/%H%M%S-$INDEX.log").unwrap();
        let key = format.resolve("app.web", 3, at()).unwrap();
        assert_eq!(key.as_str(), "logs/app.web/2024/05/06/070809-3.log");
    }

    #[test]
    fn test_tag_segments() {
        let format = KeyFormat::parse("$TAG[1]/$TAG[0]").unwrap();
        assert_eq!(format.resolve("app.web", 0, at()).unwrap().as_str(), "web/app");

        let err = KeyFormat::parse("$TAG[2]").unwrap().resolve("app.web", 0, at()).unwrap_err();
        assert!(matches!(
            err,
            KeyFormatError::TagSegmentOutOfRange { index: 2, segments: 2, .. }
        ));
    }

    #[test]
    fn test_leading_slash_is_stripped() {
        let format = KeyFormat::parse("/$TAG/%Y").unwrap();
        assert_eq!(format.resolve("app", 0, at()).unwrap().as_str(), "app/2024");
    }

    #[test]
    fn test_id_is_a_fresh_ulid() {
        let format = KeyFormat::parse("$ID").unwrap();
        let a = format.resolve("app", 0, at()).unwrap();
        let b = format.resolve("app", 0, at()).unwrap();
        assert_eq!(a.as_str().len(), 26);
        assert!(a.as_str().parse::<Ulid>().is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_specifier_is_an_error() {
        assert!(matches!(
            KeyFormat::parse("logs/%Q/$TAG"),
            Err(KeyFormatError::InvalidTimeFormat(_))
        ));
        assert!(matches!(
            KeyFormat::parse("logs/%"),
            Err(KeyFormatError::InvalidTimeFormat(_))
        ));
        assert!(matches!(
            KeyFormat::parse("$TAG[x]"),
            Err(KeyFormatError::InvalidPlaceholder(_))
        ));
    }

    #[test]
    fn test_values_are_not_formatted() {
        let format = KeyFormat::parse("cost$5/$TAG").unwrap();
        let key = format.resolve("a%Yb", 0, at()).unwrap();
        assert_eq!(key.as_str(), "cost$5/a%Yb");
    }

    #[test]
    fn test_empty_result_is_rejected() {
        let format = KeyFormat::parse("/$TAG").unwrap();
        assert!(matches!(
            format.resolve("", 0, at()),
            Err(KeyFormatError::InvalidKey(_))
        ));
    }
}
