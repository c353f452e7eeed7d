//! Error taxonomy
//!
//! Every component returns these as explicit values; the session decides
//! whether to retry, degrade or halt. Nothing here is thrown across a
//! component boundary.

use thiserror::Error;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Why a single field could not be extracted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    /// No locator strategy matched anything in the captured document
    #[error("not found")]
    NotFound,
    /// Located, but the raw value could not be parsed
    #[error("cannot parse {raw:?}: {detail}")]
    Unparsable { raw: String, detail: String },
    /// Parsed, but rejected by a validation rule
    #[error("rejected: {detail}")]
    Invalid { detail: String },
}

/// A required field was missing or failed validation.
///
/// Recoverable: the next settled event or poll tick retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field `{field}` {reason}")]
pub struct ExtractionError {
    pub field: String,
    pub reason: ExtractionFailure,
}

impl ExtractionError {
    pub fn new(field: impl Into<String>, reason: ExtractionFailure) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }
}

// =============================================================================
// NAVIGATION WATCHER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatcherError {
    /// The designated host container never appeared. Fatal for this page load.
    #[error("host container not found after {attempts} attempts ({waited_ms} ms)")]
    HostIncompatible { attempts: u32, waited_ms: u64 },
}

// =============================================================================
// RENDERER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The overlay mount point is not available yet; retried with backoff
    #[error("overlay mount point unavailable, retrying in {retry_in_ms} ms")]
    MountUnavailable { retry_in_ms: u64 },
    /// The surface rejected an operation
    #[error("overlay surface error: {0}")]
    Surface(String),
    /// A patch addressed a node that does not exist in the mounted tree
    #[error("no overlay node at path {path:?}")]
    PatchTarget { path: Vec<usize> },
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected {found:?} at offset {offset} in selector {selector:?}")]
    Unexpected {
        selector: String,
        offset: usize,
        found: char,
    },
    #[error("unterminated attribute selector in {0:?}")]
    UnterminatedAttribute(String),
    #[error("payload locator {0:?} must look like payload:<channel>:<pointer>")]
    Payload(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid locator for `{field}`: {source}")]
    Locator {
        field: String,
        #[source]
        source: LocatorError,
    },
    #[error("Override for unknown field `{0}`")]
    UnknownField(String),
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
}
