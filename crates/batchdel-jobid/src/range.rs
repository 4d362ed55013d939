//! Subjob range lists.
//!
//! A range list is a comma separated sequence of `start`, `start-stop`
//! or `start-stop:step` terms, e.g. `1-10:2,15`.

use serde::{Deserialize, Serialize};

/// Errors produced while parsing a range list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("empty range list")]
    Empty,

    #[error("malformed range term '{0}'")]
    Malformed(String),

    #[error("range term '{0}' has a zero step")]
    ZeroStep(String),

    #[error("range term '{0}' ends before it starts")]
    Reversed(String),
}

/// One `start-stop:step` term, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: u32,
    pub stop: u32,
    pub step: u32,
}

impl IndexRange {
    /// A range holding exactly one index.
    pub fn single(index: u32) -> Self {
        Self {
            start: index,
            stop: index,
            step: 1,
        }
    }

    /// Whether `index` is produced by this term.
    pub fn contains(&self, index: u32) -> bool {
        index >= self.start && index <= self.stop && (index - self.start) % self.step == 0
    }

    /// Iterate the indices of this term in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u32> {
        let IndexRange { start, stop, step } = *self;
        (0..)
            .map(move |n: u64| start as u64 + n * step as u64)
            .take_while(move |i| *i <= stop as u64)
            .map(|i| i as u32)
    }
}

/// Parse a range list into its terms.
pub fn parse_index_ranges(spec: &str) -> Result<Vec<IndexRange>, RangeError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(RangeError::Empty);
    }

    spec.split(',').map(parse_term).collect()
}

fn parse_term(term: &str) -> Result<IndexRange, RangeError> {
    let term = term.trim();
    let malformed = || RangeError::Malformed(term.to_string());

    let (bounds, step) = match term.split_once(':') {
        Some((bounds, step)) => (bounds, Some(step)),
        None => (term, None),
    };

    let (start, stop) = match bounds.split_once('-') {
        Some((start, stop)) => (
            parse_number(start).ok_or_else(malformed)?,
            parse_number(stop).ok_or_else(malformed)?,
        ),
        None => {
            let single = parse_number(bounds).ok_or_else(malformed)?;
            // A step on a single index has nothing to step over.
            if step.is_some() {
                return Err(malformed());
            }
            (single, single)
        }
    };

    let step = match step {
        Some(text) => parse_number(text).ok_or_else(malformed)?,
        None => 1,
    };

    if step == 0 {
        return Err(RangeError::ZeroStep(term.to_string()));
    }
    if stop < start {
        return Err(RangeError::Reversed(term.to_string()));
    }

    Ok(IndexRange { start, stop, step })
}

fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_term() {
        let ranges = parse_index_ranges("5").unwrap();
        assert_eq!(ranges, vec![IndexRange::single(5)]);
    }

    #[test]
    fn test_parse_stepped_term() {
        let ranges = parse_index_ranges("1-10:3").unwrap();
        assert_eq!(
            ranges,
            vec![IndexRange {
                start: 1,
                stop: 10,
                step: 3
            }]
        );
        let indices: Vec<u32> = ranges[0].indices().collect();
        assert_eq!(indices, vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_parse_list() {
        let ranges = parse_index_ranges("1-3, 8").unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1], IndexRange::single(8));
    }

    #[test]
    fn test_contains_respects_step() {
        let range = IndexRange {
            start: 2,
            stop: 10,
            step: 4,
        };
        assert!(range.contains(2));
        assert!(range.contains(6));
        assert!(range.contains(10));
        assert!(!range.contains(4));
        assert!(!range.contains(14));
        assert!(!range.contains(1));
    }

    #[test]
    fn test_indices_near_u32_max() {
        let range = IndexRange {
            start: u32::MAX - 1,
            stop: u32::MAX,
            step: 1,
        };
        assert_eq!(range.indices().count(), 2);
    }

    #[test]
    fn test_reject_bad_terms() {
        assert_eq!(parse_index_ranges(""), Err(RangeError::Empty));
        assert!(matches!(parse_index_ranges("1-"), Err(RangeError::Malformed(_))));
        assert!(matches!(parse_index_ranges("a-b"), Err(RangeError::Malformed(_))));
        assert!(matches!(parse_index_ranges("3:2"), Err(RangeError::Malformed(_))));
        assert!(matches!(parse_index_ranges("1-5:0"), Err(RangeError::ZeroStep(_))));
        assert!(matches!(parse_index_ranges("9-2"), Err(RangeError::Reversed(_))));
        assert!(matches!(parse_index_ranges("1,,2"), Err(RangeError::Malformed(_))));
    }
}
