//! Hierarchical topics and subscription patterns
//!
//! Topics are `.`-separated segments (`t1.device.added`). Patterns may use
//! `*` to match exactly one segment and a trailing `#` to match any remaining
//! depth, including none.

use std::fmt;
use std::str::FromStr;

use crate::module::api::events::RouterError;

/// Segment delimiter
pub const TOPIC_DELIMITER: char = '.';
/// Matches exactly one segment
pub const SINGLE_WILDCARD: &str = "*";
/// Matches any remaining depth (last segment only)
pub const TRAILING_WILDCARD: &str = "#";

/// Maximum topic or pattern length in bytes
pub const MAX_TOPIC_LEN: usize = 255;

/// Validate a concrete (publishable) topic
pub fn validate_topic(topic: &str) -> Result<(), RouterError> {
    if topic.is_empty() || topic.len() > MAX_TOPIC_LEN {
        return Err(RouterError::InvalidTopic(format!(
            "topic must be 1-{} bytes",
            MAX_TOPIC_LEN
        )));
    }
    for segment in topic.split(TOPIC_DELIMITER) {
        if segment.is_empty() {
            return Err(RouterError::InvalidTopic(format!(
                "empty segment in {:?}",
                topic
            )));
        }
        if segment == SINGLE_WILDCARD || segment == TRAILING_WILDCARD {
            return Err(RouterError::InvalidTopic(format!(
                "wildcards are not allowed in published topic {:?}",
                topic
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
}

/// Compiled subscription pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing: bool,
}

impl TopicPattern {
    /// Compile a pattern
    pub fn parse(pattern: &str) -> Result<Self, RouterError> {
        if pattern.is_empty() || pattern.len() > MAX_TOPIC_LEN {
            return Err(RouterError::InvalidPattern(format!(
                "pattern must be 1-{} bytes",
                MAX_TOPIC_LEN
            )));
        }

        let parts: Vec<&str> = pattern.split(TOPIC_DELIMITER).collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());
        let mut trailing = false;

        for (i, part) in parts.iter().enumerate() {
            match *part {
                "" => {
                    return Err(RouterError::InvalidPattern(format!(
                        "empty segment in {:?}",
                        pattern
                    )))
                }
                SINGLE_WILDCARD => segments.push(Segment::Single),
                TRAILING_WILDCARD if i == last => trailing = true,
                TRAILING_WILDCARD => {
                    return Err(RouterError::InvalidPattern(format!(
                        "'#' is only allowed as the last segment in {:?}",
                        pattern
                    )))
                }
                literal => segments.push(Segment::Literal(literal.to_string())),
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            trailing,
        })
    }

    /// Whether a concrete topic matches this pattern
    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split(TOPIC_DELIMITER);
        for segment in &self.segments {
            match (segment, parts.next()) {
                (_, None) => return false,
                (Segment::Single, Some(_)) => {}
                (Segment::Literal(expected), Some(actual)) => {
                    if expected != actual {
                        return false;
                    }
                }
            }
        }
        self.trailing || parts.next().is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for TopicPattern {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, topic: &str) -> bool {
        TopicPattern::parse(pattern).unwrap().matches(topic)
    }

    #[test]
    fn test_single_wildcard_matches_exactly_one_segment() {
        assert!(matches("t1.device.*", "t1.device.added"));
        assert!(!matches("t1.device.*", "t1.device.added.detail"));
        assert!(!matches("t1.device.*", "t1.device"));
        assert!(matches("*.device.added", "t2.device.added"));
        assert!(matches("t1.*.added", "t1.link.added"));
    }

    #[test]
    fn test_trailing_wildcard_matches_any_depth() {
        assert!(matches("t1.device.#", "t1.device.added"));
        assert!(matches("t1.device.#", "t1.device.added.detail"));
        assert!(matches("t1.device.#", "t1.device"));
        assert!(!matches("t1.device.#", "t1.link.added"));
        assert!(matches("#", "anything.at.all"));
    }

    #[test]
    fn test_literal_patterns() {
        assert!(matches("t1.device.added", "t1.device.added"));
        assert!(!matches("t1.device.added", "t1.device.removed"));
        assert!(!matches("t1.device", "t1.device.added"));
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["", "a..b", ".a", "a.#.b", "#.a"] {
            assert!(TopicPattern::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_invalid_topics() {
        assert!(validate_topic("t1.device.added").is_ok());
        for bad in ["", "t1..added", "t1.*.added", "t1.#", "a."] {
            assert!(validate_topic(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
