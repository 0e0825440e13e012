//! Error and Result types for provider requests.

use thiserror::Error;

/// A convenience `Result` type for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for tree and series requests.
///
/// Variants map one-to-one onto the categorical failure codes exposed on
/// responses, so callers can decide whether a retry is meaningful without
/// parsing free-text messages.
#[derive(Debug, Error)]
pub enum Error {
    /// The attribute store has not been initialized by the ingestion
    /// pipeline yet. Retrying with the same parameters will not help until
    /// a store is attached.
    #[error("attribute store unavailable")]
    StoreUnavailable,

    /// The batched range query failed: invalid range, or the store was
    /// torn down while the query was being consumed. The whole request
    /// fails atomically.
    #[error("range query failed: {0}")]
    QueryFailed(String),

    /// The caller signalled cancellation mid-request. No partial output is
    /// exposed; re-issuing the identical request resumes the work.
    #[error("request cancelled")]
    Cancelled,
}
