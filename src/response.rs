//! Status-tagged responses for tree and series requests.
//!
//! `Running` means the store is still growing and the caller should re-issue
//! the identical request later; it is never a partial result. Failure codes
//! are categorical rather than free text so callers can decide whether a
//! retry is meaningful.

use serde::Serialize;

use crate::catalog::TreeModel;
use crate::error::Error;
use crate::series::XyModel;

/// Outcome of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// More data may exist once ingestion progresses; retry later with the
    /// identical parameters.
    Running,
    /// The payload covers everything the request asked for.
    Completed,
    /// The caller's cancel token was signalled; no payload.
    Cancelled,
    /// The request failed atomically; see the failure code.
    Failed,
}

/// Categorical failure code attached to `Failed` and `Cancelled` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// The store is not initialized; retrying is not meaningful.
    StoreUnavailable,
    /// The range query failed; a retry may succeed if the failure was
    /// transient.
    QueryFailed,
    /// The request was cancelled by its caller.
    Cancelled,
}

impl FailureCode {
    fn from_error(error: &Error) -> Self {
        match error {
            Error::StoreUnavailable => FailureCode::StoreUnavailable,
            Error::QueryFailed(_) => FailureCode::QueryFailed,
            Error::Cancelled => FailureCode::Cancelled,
        }
    }
}

fn status_for(error: &Error) -> Status {
    match error {
        Error::Cancelled => Status::Cancelled,
        _ => Status::Failed,
    }
}

/// Response to a tree request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeResponse {
    /// Request outcome.
    pub status: Status,
    /// Failure code, for `Failed`/`Cancelled` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureCode>,
    /// The display tree, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeModel>,
}

impl TreeResponse {
    /// Tree built against a fully ingested store.
    pub fn completed(tree: TreeModel) -> Self {
        Self {
            status: Status::Completed,
            error: None,
            tree: Some(tree),
        }
    }

    /// Tree built while the store is still growing.
    pub fn running(tree: TreeModel) -> Self {
        Self {
            status: Status::Running,
            error: None,
            tree: Some(tree),
        }
    }

    /// Failed or cancelled outcome, no payload.
    pub fn from_error(error: &Error) -> Self {
        Self {
            status: status_for(error),
            error: Some(FailureCode::from_error(error)),
            tree: None,
        }
    }
}

/// Response to a series request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResponse {
    /// Request outcome.
    pub status: Status,
    /// Failure code, for `Failed`/`Cancelled` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureCode>,
    /// The computed series, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<XyModel>,
}

impl SeriesResponse {
    /// Wrap an engine result, `Running` when the model is incomplete.
    pub fn from_model(model: XyModel) -> Self {
        let status = if model.complete {
            Status::Completed
        } else {
            Status::Running
        };
        Self {
            status,
            error: None,
            model: Some(model),
        }
    }

    /// Failed or cancelled outcome, no payload.
    pub fn from_error(error: &Error) -> Self {
        Self {
            status: status_for(error),
            error: Some(FailureCode::from_error(error)),
            model: None,
        }
    }
}
