//! Job identifier grammar for the batch deletion control plane.
//!
//! Classifies a target identifier into one of the four deletion shapes
//! (plain job, array parent, single subjob, subjob range) and parses
//! subjob range lists.

mod parser;
mod range;

pub use parser::{IdShape, JobId, JobIdError};
pub use range::{parse_index_ranges, IndexRange, RangeError};

use serde::{Deserialize, Serialize};

/// Structured description of an identifier, as printed by `batchdel explain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// The identifier as given.
    pub input: String,

    /// Canonical form after server qualification. None when parsing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,

    /// Parsed shape. None when parsing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<IdShape>,

    /// Array parent identifier for array forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Expanded range terms for range forms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<IndexRange>,

    /// Parse error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Explanation {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Explain how an identifier would be classified.
pub fn explain(input: &str, default_server: &str) -> Explanation {
    let mut explanation = Explanation {
        input: input.to_string(),
        canonical: None,
        shape: None,
        parent: None,
        ranges: Vec::new(),
        error: None,
    };

    let id = match JobId::parse(input) {
        Ok(id) => id.qualified(default_server),
        Err(e) => {
            explanation.error = Some(e.to_string());
            return explanation;
        }
    };

    if id.shape.is_array_form() {
        explanation.parent = Some(id.parent_id());
    }
    if let IdShape::SubjobRange(spec) = &id.shape {
        // Already validated by the parser.
        explanation.ranges = parse_index_ranges(spec).unwrap_or_default();
    }
    explanation.canonical = Some(id.to_string());
    explanation.shape = Some(id.shape);
    explanation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_range() {
        let e = explain("17[1-5:2]", "svr");
        assert_eq!(e.canonical.as_deref(), Some("17[1-5:2].svr"));
        assert_eq!(e.parent.as_deref(), Some("17[].svr"));
        assert_eq!(e.ranges.len(), 1);
        assert!(e.error.is_none());
    }

    #[test]
    fn test_explain_plain_has_no_parent() {
        let e = explain("17", "svr");
        assert_eq!(e.shape, Some(IdShape::Plain));
        assert!(e.parent.is_none());
    }

    #[test]
    fn test_explain_error() {
        let e = explain("nope", "svr");
        assert!(e.canonical.is_none());
        assert!(e.error.unwrap().contains("malformed"));
    }

    #[test]
    fn test_explain_json_shape_tag() {
        let json = explain("3[4]", "svr").to_json().unwrap();
        assert!(json.contains("\"single_subjob\""));
    }
}
