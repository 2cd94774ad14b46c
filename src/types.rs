#![forbid(unsafe_code)]

//! Identifier newtypes and the crate-wide error type.

use std::fmt;

use rusqlite::ffi;
use thiserror::Error;

/// Identifier of a named graph; `GraphId::DEFAULT` is the implicit default graph.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct GraphId(pub i64);
/// Identifier of an RDF property in the ontology.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PropertyId(pub i64);
/// Identifier of an RDF class in the ontology.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ClassId(pub i64);

impl GraphId {
    /// Id reserved for the default graph; never present in the graph registry.
    pub const DEFAULT: GraphId = GraphId(0);

    /// Returns true for the default graph.
    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PropertyId {
    fn from(value: i64) -> Self {
        PropertyId(value)
    }
}

impl From<i64> for ClassId {
    fn from(value: i64) -> Self {
        ClassId(value)
    }
}

/// Errors raised while planning or scanning triples.
#[derive(Debug, Error)]
pub enum RdfError {
    /// Error reported by SQLite, passed through unchanged.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// The planner was asked for an access path it does not provide.
    #[error("planning: {0}")]
    Planning(String),
    /// Stored data or the plan encoding no longer matches the catalog.
    #[error("corruption: {0}")]
    Corruption(String),
    /// Caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Configuration could not be read or parsed.
    #[error("config: {0}")]
    Config(String),
    /// I/O error.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RdfError>;

impl RdfError {
    /// Returns true for catalog/storage drift errors.
    pub fn is_corruption(&self) -> bool {
        matches!(self, RdfError::Corruption(_))
    }
}

impl From<RdfError> for rusqlite::Error {
    fn from(err: RdfError) -> Self {
        match err {
            RdfError::Sqlite(inner) => inner,
            RdfError::Corruption(msg) => rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_CORRUPT),
                Some(format!("triples: {msg}")),
            ),
            other => rusqlite::Error::ModuleError(other.to_string()),
        }
    }
}
