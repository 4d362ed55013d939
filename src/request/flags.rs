//! Delete extension flags.
//!
//! Callers pass free-form extension tokens; the recognised ones are
//! `deletehist`, `force` and `nomail`, alone or run together
//! (`forcenomail`) and separated by commas or whitespace.

use serde::{Deserialize, Serialize};

const PURGE_HISTORY: &str = "deletehist";
const FORCE: &str = "force";
const NO_MAIL: &str = "nomail";

/// Per-request delete options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFlags {
    /// Purge history instead of retaining it.
    #[serde(default)]
    pub purge_history: bool,
    /// Finalize server-side regardless of the agent.
    #[serde(default)]
    pub force: bool,
    /// Suppress owner mail.
    #[serde(default)]
    pub no_mail: bool,
}

impl DeleteFlags {
    /// Parse an extension string. Unrecognised tokens are ignored.
    pub fn from_extension(extension: Option<&str>) -> Self {
        let mut flags = Self::default();
        let Some(extension) = extension else {
            return flags;
        };

        for token in extension.split(|c: char| c == ',' || c.is_whitespace()) {
            let mut rest = token.trim().to_ascii_lowercase();
            while !rest.is_empty() {
                if let Some(tail) = rest.strip_prefix(PURGE_HISTORY) {
                    flags.purge_history = true;
                    rest = tail.to_string();
                } else if let Some(tail) = rest.strip_prefix(FORCE) {
                    flags.force = true;
                    rest = tail.to_string();
                } else if let Some(tail) = rest.strip_prefix(NO_MAIL) {
                    flags.no_mail = true;
                    rest = tail.to_string();
                } else {
                    break;
                }
            }
        }
        flags
    }

    /// Render back to an extension string.
    pub fn to_extension(&self) -> Option<String> {
        let tokens: Vec<&str> = [
            (self.purge_history, PURGE_HISTORY),
            (self.force, FORCE),
            (self.no_mail, NO_MAIL),
        ]
        .into_iter()
        .filter_map(|(set, token)| set.then_some(token))
        .collect();

        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(","))
        }
    }
}
