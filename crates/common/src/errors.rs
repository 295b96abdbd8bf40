use std::fmt;

use serde::Serialize;

/// Coarse classification shared by every error that can surface from ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid settings; raised before any network call.
    Configuration,
    /// Token exchange rejected by the provider.
    Authentication,
    /// Review feed request rejected or unreadable.
    Upstream,
    /// A fetched record could not be normalized.
    MalformedRecord,
    /// Database write or read failure.
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Upstream => "upstream",
            ErrorKind::MalformedRecord => "malformed_record",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Classified {
    fn kind(&self) -> ErrorKind;
}
