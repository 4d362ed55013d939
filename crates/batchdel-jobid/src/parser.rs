//! Job identifier parser.
//!
//! Parses `<seq>[<index>].<server>` identifiers into a structured form.
//! The bracket and server parts are both optional.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::range::{parse_index_ranges, RangeError};

/// Grammar of a job identifier.
const JOB_ID_PATTERN: &str = r"^(\d+)(\[([^\[\]]*)\])?(\.([A-Za-z0-9][A-Za-z0-9._-]*))?$";

fn job_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(JOB_ID_PATTERN).expect("job id pattern is valid"))
}

/// Errors produced while parsing a job identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobIdError {
    #[error("empty job identifier")]
    Empty,

    #[error("malformed job identifier: {0}")]
    Malformed(String),

    #[error("subjob index out of range in {0}")]
    IndexOverflow(String),

    #[error("invalid subjob range in {id}: {source}")]
    Range {
        id: String,
        #[source]
        source: RangeError,
    },
}

/// The bracketed part of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IdShape {
    /// No brackets: a plain job.
    Plain,
    /// Empty brackets: an array parent as a whole.
    ArrayParent,
    /// One numeric index.
    SingleSubjob(u32),
    /// A range list such as `1-10:2,15`.
    SubjobRange(String),
}

impl IdShape {
    /// Whether the identifier names an array or a part of one.
    pub fn is_array_form(&self) -> bool {
        !matches!(self, IdShape::Plain)
    }
}

/// A parsed job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobId {
    /// Numeric sequence part.
    pub sequence: u64,

    /// Shape derived from the bracketed part.
    pub shape: IdShape,

    /// Owning server suffix, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl JobId {
    /// Parse an identifier string.
    pub fn parse(input: &str) -> Result<Self, JobIdError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(JobIdError::Empty);
        }

        let caps = job_id_regex()
            .captures(input)
            .ok_or_else(|| JobIdError::Malformed(input.to_string()))?;

        let sequence = caps[1]
            .parse::<u64>()
            .map_err(|_| JobIdError::Malformed(input.to_string()))?;

        let shape = match caps.get(3).map(|m| m.as_str()) {
            None => IdShape::Plain,
            Some("") => IdShape::ArrayParent,
            Some(text) if text.bytes().all(|b| b.is_ascii_digit()) => {
                let index = text
                    .parse::<u32>()
                    .map_err(|_| JobIdError::IndexOverflow(input.to_string()))?;
                IdShape::SingleSubjob(index)
            }
            Some(text) => {
                // Validate eagerly so a bad range never reaches the store.
                parse_index_ranges(text).map_err(|source| JobIdError::Range {
                    id: input.to_string(),
                    source,
                })?;
                IdShape::SubjobRange(text.to_string())
            }
        };

        let server = caps.get(5).map(|m| m.as_str().to_string());

        Ok(Self {
            sequence,
            shape,
            server,
        })
    }

    /// Fill in the server suffix when the caller left it out.
    pub fn qualified(mut self, default_server: &str) -> Self {
        if self.server.is_none() {
            self.server = Some(default_server.to_string());
        }
        self
    }

    /// Identifier of the array parent (`<seq>[].<server>`).
    pub fn parent_id(&self) -> String {
        self.render("[]")
    }

    /// Identifier of one subjob of this array.
    pub fn subjob_id(&self, index: u32) -> String {
        self.render(&format!("[{}]", index))
    }

    /// Identifier of a plain job with this sequence number.
    pub fn plain_id(&self) -> String {
        self.render("")
    }

    fn render(&self, bracket: &str) -> String {
        match &self.server {
            Some(server) => format!("{}{}.{}", self.sequence, bracket, server),
            None => format!("{}{}", self.sequence, bracket),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bracket = match &self.shape {
            IdShape::Plain => String::new(),
            IdShape::ArrayParent => "[]".to_string(),
            IdShape::SingleSubjob(index) => format!("[{}]", index),
            IdShape::SubjobRange(spec) => format!("[{}]", spec),
        };
        f.write_str(&self.render(&bracket))
    }
}

impl std::str::FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
