//! Rate series reconstruction over a sparse attribute interval store.
//!
//! An upstream trace-analysis pipeline builds a hierarchical store of
//! time-stamped value intervals: per entity, a cumulative counter attribute
//! (total work settled so far) plus sibling "running" attributes for
//! operations still in flight. This crate turns that sparse, possibly
//! still-growing store into dense per-sample rate series for an arbitrary
//! selection of entities and sample timestamps, in one batched store query
//! per request.
//!
//! ## Architecture
//!
//! 1. **Entry catalog** (`catalog` module) - walks the attribute hierarchy,
//!    filters out entities without a queryable metric leaf, and caches each
//!    leaf's display path so later series requests can map selected ids
//!    back to attributes.
//!
//! 2. **Series engine** (`series` module) - issues the batched interval
//!    query and reconstructs one rate array per entity, interpolating the
//!    pro-rated share of in-flight operations.
//!
//! 3. **Response assembler** (`response` module) - tags results as
//!    running/completed/cancelled/failed with categorical failure codes.
//!
//! [`RateSeriesProvider`] ties the three together behind two entry points,
//! `fetch_tree` and `fetch_series`. Both run synchronously on the caller's
//! thread and are safe to call concurrently; cancellation is cooperative
//! via a polled [`CancelToken`].
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use rate_series_provider::{
//!     CancelToken, IntervalValue, MemoryAttributeStore, NoResolver,
//!     RateSeriesProvider, SeriesRequest,
//! };
//!
//! let mut store = MemoryAttributeStore::new(0);
//! let read = store.ensure_attribute(&["TID", "42", "read"]);
//! store.insert_interval(read, 0, 99, IntervalValue::Numeric(512.0)).unwrap();
//! store.set_fully_built(true);
//!
//! let provider = RateSeriesProvider::new(Arc::new(store), NoResolver, "trace");
//! let tree = provider.fetch_tree();
//! let selected_ids = tree.tree.unwrap().entries.iter()
//!     .filter(|e| e.label == "Read").map(|e| e.id).collect();
//!
//! let request = SeriesRequest { selected_ids, times: vec![0, 50, 99] };
//! let response = provider.fetch_series(&request, &CancelToken::new());
//! assert!(response.model.is_some());
//! ```

pub mod cancel;
pub mod catalog;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod response;
pub mod series;
pub mod store;

pub use cancel::CancelToken;
pub use catalog::{Entry, EntryCatalog, TreeModel};
pub use error::{Error, Result};
pub use provider::{RateSeriesProvider, SeriesRequest, PROVIDER_ID};
pub use resolver::{NameResolver, NoResolver};
pub use response::{FailureCode, SeriesResponse, Status, TreeResponse};
pub use series::{XyModel, YSeries};
pub use store::{
    AttributeId, AttributeStore, Interval, IntervalSet, IntervalValue, MemoryAttributeStore,
    Timestamp,
};
