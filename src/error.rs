//! Error taxonomy for the ingestion pipeline.
//!
//! Fatal conditions surface as [`IngestError`] and abort a run before any
//! datastore mutation. Per-label and per-row misses (unresolved categories,
//! failed identity lookups, individual insert failures) are not errors at this
//! level; they are collected in [`crate::pipeline::RunDiagnostics`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed input{}: {message}", line_suffix(.line))]
    MalformedInput { message: String, line: Option<u64> },
    #[error("Unsupported input format '{0}'")]
    UnsupportedFormat(String),
    #[error("No valid results for event '{event_id}': {reason}")]
    NoValidResults { event_id: String, reason: String },
    #[error("None of the {attempted} result(s) for event '{event_id}' could be persisted")]
    PersistFailed { event_id: String, attempted: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn line_suffix(line: &Option<u64>) -> String {
    match line {
        Some(line) => format!(" at line {line}"),
        None => String::new(),
    }
}

impl IngestError {
    pub(crate) fn malformed(message: impl Into<String>, line: Option<u64>) -> Self {
        IngestError::MalformedInput {
            message: message.into(),
            line,
        }
    }

    /// True for errors the caller may retry unchanged (datastore unavailable).
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Store(StoreError::Unavailable(_)))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Datastore unavailable: {0}")]
    Unavailable(String),
    #[error("Lookup failed: {0}")]
    Lookup(String),
    #[error("Constraint violated: {0}")]
    Constraint(String),
    /// Carries the path of the locked store.
    #[error("Store '{0}' is locked by another writer")]
    Locked(String),
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_message_includes_line_when_known() {
        let err = IngestError::malformed("unterminated quoted field", Some(4));
        assert_eq!(
            err.to_string(),
            "Malformed input at line 4: unterminated quoted field"
        );
        let err = IngestError::malformed("no header row", None);
        assert_eq!(err.to_string(), "Malformed input: no header row");
    }

    #[test]
    fn only_unavailability_is_retryable() {
        assert!(IngestError::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!IngestError::from(StoreError::Lookup("bad".into())).is_retryable());
        assert!(
            !IngestError::NoValidResults {
                event_id: "e".into(),
                reason: "empty".into()
            }
            .is_retryable()
        );
    }
}
