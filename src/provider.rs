//! The provider seam: request handling over catalog, engine and assembler.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::catalog::EntryCatalog;
use crate::error::{Error, Result};
use crate::resolver::NameResolver;
use crate::response::{SeriesResponse, TreeResponse};
use crate::series;
use crate::store::{AttributeStore, Timestamp};

/// Identifier of this provider on the wire.
pub const PROVIDER_ID: &str = "rate.series.per.entity";

/// A series request: selected display ids plus the sample timestamps the
/// caller wants values for. Times may arrive unsorted and out of range;
/// they are sorted and filtered before the engine runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRequest {
    /// Display ids picked from a previously fetched tree.
    pub selected_ids: Vec<i64>,
    /// Sample timestamps, any order.
    pub times: Vec<Timestamp>,
}

/// Tree-and-series data provider over one attribute interval store.
///
/// The store handle is attached by the ingestion pipeline once it exists;
/// requests arriving before that fail with `STORE_UNAVAILABLE`. All request
/// entry points take `&self` and may run concurrently from multiple
/// threads; the catalog's internal maps are the only shared mutable state.
pub struct RateSeriesProvider<S, R> {
    store: RwLock<Option<Arc<S>>>,
    resolver: R,
    catalog: EntryCatalog,
}

impl<S, R> RateSeriesProvider<S, R>
where
    S: AttributeStore,
    R: NameResolver,
{
    /// Provider with a store already attached.
    pub fn new(store: Arc<S>, resolver: R, session_label: impl Into<String>) -> Self {
        Self {
            store: RwLock::new(Some(store)),
            resolver,
            catalog: EntryCatalog::new(session_label),
        }
    }

    /// Provider without a store yet; requests fail with
    /// `STORE_UNAVAILABLE` until [`attach_store`](Self::attach_store).
    pub fn detached(resolver: R, session_label: impl Into<String>) -> Self {
        Self {
            store: RwLock::new(None),
            resolver,
            catalog: EntryCatalog::new(session_label),
        }
    }

    /// Attach (or replace) the store handle.
    pub fn attach_store(&self, store: Arc<S>) {
        *self.store.write().unwrap() = Some(store);
    }

    fn store(&self) -> Result<Arc<S>> {
        self.store
            .read()
            .unwrap()
            .clone()
            .ok_or(Error::StoreUnavailable)
    }

    /// Build the display tree and populate the leaf label cache.
    ///
    /// `Running` while the store is still being built, so callers can poll
    /// and re-render as entities appear.
    pub fn fetch_tree(&self) -> TreeResponse {
        let store = match self.store() {
            Ok(store) => store,
            Err(error) => return TreeResponse::from_error(&error),
        };
        let tree = self.catalog.build_tree(store.as_ref(), &self.resolver);
        if store.is_fully_built() {
            TreeResponse::completed(tree)
        } else {
            TreeResponse::running(tree)
        }
    }

    /// Compute rate series for the request's selected entries.
    pub fn fetch_series(&self, request: &SeriesRequest, token: &CancelToken) -> SeriesResponse {
        let store = match self.store() {
            Ok(store) => store,
            Err(error) => return SeriesResponse::from_error(&error),
        };
        let times = filter_times(store.as_ref(), &request.times);
        let selected = self.catalog.selected_entries(&request.selected_ids);

        match series::compute(store.as_ref(), &self.catalog, &selected, &times, token) {
            Ok(model) => SeriesResponse::from_model(model),
            Err(error) => {
                if let Error::QueryFailed(ref reason) = error {
                    tracing::warn!(%reason, "series range query failed");
                }
                SeriesResponse::from_error(&error)
            }
        }
    }
}

/// Sort the requested times ascending and drop everything outside the
/// store's committed range. Duplicates are kept; the engine's zero-duration
/// guard handles them.
fn filter_times<S>(store: &S, requested: &[Timestamp]) -> Vec<Timestamp>
where
    S: AttributeStore + ?Sized,
{
    let start = store.start_time();
    let end = store.current_end_time();
    let mut times: Vec<Timestamp> = requested
        .iter()
        .copied()
        .filter(|time| (start..=end).contains(time))
        .collect();
    times.sort_unstable();
    times
}
