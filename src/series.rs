//! Series engine: batched interval query and rate reconstruction.
//!
//! Cumulative counters only record completed work. To avoid visible freezes
//! during long-running operations, each entity carries sibling "running"
//! attributes whose intervals represent in-flight work: the engine pro-rates
//! an in-flight interval's eventual magnitude by the elapsed fraction of its
//! known duration and adds that to the settled counter before differencing.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::catalog::EntryCatalog;
use crate::error::{Error, Result};
use crate::store::{AttributeId, AttributeStore, IntervalSet, IntervalValue, Timestamp};

/// One entity's reconstructed value array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YSeries {
    /// Display id of the selected entry.
    pub id: i64,
    /// One rate value per sample timestamp, 0 where no rate is defined.
    pub values: Vec<f64>,
}

/// Engine output: the filtered sample times and one series per entity.
#[derive(Debug, Clone, Serialize)]
pub struct XyModel {
    /// Ascending sample timestamps the values are aligned to.
    pub times: Vec<Timestamp>,
    /// Per-entity value arrays, in ascending display-id order.
    pub series: Vec<YSeries>,
    /// Whether the store had committed data covering the whole request.
    pub complete: bool,
}

/// Per-entity accumulation state across the sample loop.
struct SeriesBuilder {
    id: i64,
    main: AttributeId,
    running: Vec<AttributeId>,
    values: Vec<f64>,
    /// Counter value at the previous processed sample, `None` until this
    /// entity has seen its first in-range sample.
    baseline: Option<f64>,
}

impl SeriesBuilder {
    fn new(id: i64, main: AttributeId, running: Vec<AttributeId>, len: usize) -> Self {
        Self {
            id,
            main,
            running,
            values: vec![0.0; len],
            baseline: None,
        }
    }

    /// Update slot `index` for `time`. Must be called in ascending time
    /// order; the first call for an entity only establishes its baseline,
    /// even when earlier out-of-range samples already advanced `prev_time`.
    fn update(
        &mut self,
        intervals: &FxHashMap<AttributeId, IntervalSet>,
        time: Timestamp,
        prev_time: Option<Timestamp>,
        index: usize,
    ) {
        let (Some(baseline), Some(prev)) = (self.baseline, prev_time) else {
            // First in-range sample: record the baseline, no rate yet.
            self.baseline = Some(self.value_at(intervals, time));
            return;
        };
        if time == prev {
            // Zero-duration step: reuse the previous slot, guards the
            // division below.
            if index > 0 {
                self.values[index] = self.values[index - 1];
            }
            return;
        }

        let value = self.value_at(intervals, time);
        self.values[index] = (value - baseline) / (time - prev) as f64;
        self.baseline = Some(value);
    }

    /// Settled counter value at `time` plus the interpolated share of every
    /// in-flight operation.
    fn value_at(
        &self,
        intervals: &FxHashMap<AttributeId, IntervalSet>,
        time: Timestamp,
    ) -> f64 {
        let mut value = intervals
            .get(&self.main)
            .and_then(|set| set.at(time))
            .map(|interval| interval.value.as_f64())
            .unwrap_or(0.0);

        for running in &self.running {
            let Some(interval) = intervals.get(running).and_then(|set| set.at(time)) else {
                continue;
            };
            if let IntervalValue::Numeric(magnitude) = interval.value {
                // Linear pro-ration of the eventual magnitude by the elapsed
                // fraction of the interval's known duration.
                value += (time - interval.start) as f64 * magnitude
                    / interval.duration() as f64;
            }
        }
        value
    }

    fn finish(self) -> YSeries {
        YSeries {
            id: self.id,
            values: self.values,
        }
    }
}

/// Reconstruct one rate series per selected entity.
///
/// `times` must already be sorted ascending and restricted to the store's
/// committed range; `selected` maps display ids to main attribute ids.
/// Selected entries whose attribute is not in the catalog's leaf cache are
/// silently dropped. Cancellation yields `Err(Error::Cancelled)` with no
/// partial output.
pub fn compute<S>(
    store: &S,
    catalog: &EntryCatalog,
    selected: &BTreeMap<i64, AttributeId>,
    times: &[Timestamp],
    token: &CancelToken,
) -> Result<XyModel>
where
    S: AttributeStore + ?Sized,
{
    let mut builders = Vec::new();
    let mut query_attrs: Vec<AttributeId> = Vec::new();
    for (&id, &attribute) in selected {
        if !catalog.has_leaf(attribute) {
            continue;
        }
        let running = store.children(attribute);
        query_attrs.push(attribute);
        query_attrs.extend(running.iter().copied());
        builders.push(SeriesBuilder::new(id, attribute, running, times.len()));
    }

    let current_end = store.current_end_time();
    let complete = store.is_fully_built()
        || times.last().is_none_or(|&last| last <= current_end);

    // One batched query for every attribute, bucketed per attribute into
    // start-ordered sets.
    let mut intervals: FxHashMap<AttributeId, IntervalSet> = FxHashMap::default();
    for item in store.query_range(&query_attrs, times)? {
        let interval = item?;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        intervals.entry(interval.attribute).or_default().insert(interval);
    }

    let start_time = store.start_time();
    let mut prev_time: Option<Timestamp> = None;
    for (index, &time) in times.iter().enumerate() {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if time > current_end {
            // The store has not committed this far; later slots stay 0.
            break;
        }
        if time >= start_time {
            for builder in &mut builders {
                builder.update(&intervals, time, prev_time, index);
            }
        }
        // Advance even across skipped ranges so zero-duration detection and
        // baselines stay correct.
        prev_time = Some(time);
    }

    Ok(XyModel {
        times: times.to_vec(),
        series: builders.into_iter().map(SeriesBuilder::finish).collect(),
        complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NoResolver;
    use crate::store::{IntervalIter, MemoryAttributeStore};

    /// Store wrapper that cancels a token after yielding N query results.
    struct CancelAfter {
        inner: MemoryAttributeStore,
        token: CancelToken,
        after: usize,
    }

    impl AttributeStore for CancelAfter {
        fn resolve(&self, path: &[&str]) -> Option<AttributeId> {
            self.inner.resolve(path)
        }
        fn children(&self, attribute: AttributeId) -> Vec<AttributeId> {
            self.inner.children(attribute)
        }
        fn child(&self, attribute: AttributeId, name: &str) -> Option<AttributeId> {
            self.inner.child(attribute, name)
        }
        fn attribute_name(&self, attribute: AttributeId) -> String {
            self.inner.attribute_name(attribute)
        }
        fn start_time(&self) -> Timestamp {
            self.inner.start_time()
        }
        fn current_end_time(&self) -> Timestamp {
            self.inner.current_end_time()
        }
        fn is_fully_built(&self) -> bool {
            self.inner.is_fully_built()
        }
        fn query_range(
            &self,
            attributes: &[AttributeId],
            times: &[Timestamp],
        ) -> Result<IntervalIter<'_>> {
            let token = self.token.clone();
            let after = self.after;
            Ok(Box::new(
                self.inner
                    .query_range(attributes, times)?
                    .enumerate()
                    .map(move |(n, item)| {
                        if n + 1 >= after {
                            token.cancel();
                        }
                        item
                    }),
            ))
        }
    }

    fn catalog_for(store: &MemoryAttributeStore) -> EntryCatalog {
        let catalog = EntryCatalog::new("trace");
        catalog.build_tree(store, &NoResolver);
        catalog
    }

    fn select(
        catalog: &EntryCatalog,
        store: &MemoryAttributeStore,
        path: &[&str],
    ) -> BTreeMap<i64, AttributeId> {
        let attr = store.resolve(path).unwrap();
        let mut selected = BTreeMap::new();
        selected.insert(catalog.display_id(attr), attr);
        selected
    }

    /// The concrete interpolation scenario: no cumulative intervals, one
    /// running operation [0, 99] of magnitude 100 sampled at 0, 50, 100.
    #[test]
    fn interpolates_in_flight_operations() {
        let mut store = MemoryAttributeStore::new(0);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        let running = store.ensure_attribute(&["TID", "1", "read", "running"]);
        store
            .insert_interval(running, 0, 99, IntervalValue::Numeric(100.0))
            .unwrap();
        store.set_current_end(100);
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        let model = compute(&store, &catalog, &selected, &[0, 50, 100], &CancelToken::new())
            .unwrap();

        // t=0 sets the baseline (0), t=50 sees 50 of the in-flight 100,
        // t=100 falls past the interval end and the contribution expires.
        assert_eq!(model.series.len(), 1);
        assert_eq!(model.series[0].values, vec![0.0, 1.0, -1.0]);
        assert!(model.complete);
        // The read leaf itself is selectable; `running` is queried as its
        // child, never selected directly.
        assert!(catalog.has_leaf(read));
    }

    #[test]
    fn settled_and_running_contributions_add_up() {
        let mut store = MemoryAttributeStore::new(0);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        let running = store.ensure_attribute(&["TID", "1", "read", "running"]);
        // 40 sectors settled over [0, 100]
        store
            .insert_interval(read, 0, 100, IntervalValue::Numeric(40.0))
            .unwrap();
        // An in-flight operation of 100 sectors over [50, 149]
        store
            .insert_interval(running, 50, 149, IntervalValue::Numeric(100.0))
            .unwrap();
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        let model =
            compute(&store, &catalog, &selected, &[0, 100], &CancelToken::new()).unwrap();

        // value_at(0) = 40, value_at(100) = 40 + 50*100/100 = 90
        assert_eq!(model.series[0].values, vec![0.0, 0.5]);
    }

    #[test]
    fn first_in_range_sample_never_carries_a_rate() {
        let mut store = MemoryAttributeStore::new(0);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        store
            .insert_interval(read, 0, 100, IntervalValue::Numeric(1234.0))
            .unwrap();
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        let model =
            compute(&store, &catalog, &selected, &[10, 20], &CancelToken::new()).unwrap();

        // A non-zero cumulative value exists at t=10 but only seeds the
        // baseline.
        assert_eq!(model.series[0].values[0], 0.0);
        assert_eq!(model.series[0].values[1], 0.0);
    }

    #[test]
    fn duplicate_timestamps_copy_the_previous_slot() {
        let mut store = MemoryAttributeStore::new(0);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        store
            .insert_interval(read, 0, 49, IntervalValue::Numeric(0.0))
            .unwrap();
        store
            .insert_interval(read, 50, 100, IntervalValue::Numeric(100.0))
            .unwrap();
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        let model = compute(
            &store,
            &catalog,
            &selected,
            &[0, 50, 50, 100],
            &CancelToken::new(),
        )
        .unwrap();

        let values = &model.series[0].values;
        assert_eq!(values[1], 2.0);
        // Never a division by zero: the duplicate reuses the previous slot.
        assert_eq!(values[2], values[1]);
    }

    #[test]
    fn times_past_committed_end_truncate_processing() {
        let mut store = MemoryAttributeStore::new(0);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        store
            .insert_interval(read, 0, 100, IntervalValue::Numeric(100.0))
            .unwrap();
        // Not fully built and committed only up to t=100.

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        let model = compute(
            &store,
            &catalog,
            &selected,
            &[0, 50, 150, 200],
            &CancelToken::new(),
        )
        .unwrap();

        assert!(!model.complete);
        // Slots past the committed end stay at their zero default.
        assert_eq!(model.series[0].values[2], 0.0);
        assert_eq!(model.series[0].values[3], 0.0);
    }

    #[test]
    fn times_before_store_start_are_skipped_without_resetting_baselines() {
        let mut store = MemoryAttributeStore::new(100);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        store
            .insert_interval(read, 100, 200, IntervalValue::Numeric(50.0))
            .unwrap();
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        // t=0 and t=50 precede the store start.
        let model = compute(
            &store,
            &catalog,
            &selected,
            &[0, 50, 100, 150],
            &CancelToken::new(),
        )
        .unwrap();

        let values = &model.series[0].values;
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 0.0);
        // t=100 is the first in-range sample: baseline only.
        assert_eq!(values[2], 0.0);
        // t=150: (50 - 50) / (150 - 100) = 0, but crucially computed against
        // prev_time=100, not against a pre-start time.
        assert_eq!(values[3], 0.0);
    }

    #[test]
    fn skipped_samples_do_not_fabricate_a_first_rate() {
        let mut store = MemoryAttributeStore::new(100);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        store
            .insert_interval(read, 100, 200, IntervalValue::Numeric(1234.0))
            .unwrap();
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        // t=0 precedes the store start and advances prev_time; t=100 must
        // still be baseline-only, not a delta against an unestablished 0.
        let model = compute(
            &store,
            &catalog,
            &selected,
            &[0, 100, 200],
            &CancelToken::new(),
        )
        .unwrap();

        let values = &model.series[0].values;
        assert_eq!(values[1], 0.0);
        assert_eq!(values[2], 0.0);
    }

    #[test]
    fn non_numeric_payloads_contribute_zero() {
        let mut store = MemoryAttributeStore::new(0);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        let running = store.ensure_attribute(&["TID", "1", "read", "running"]);
        store
            .insert_interval(read, 0, 100, IntervalValue::None)
            .unwrap();
        store
            .insert_interval(running, 0, 100, IntervalValue::None)
            .unwrap();
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        let model =
            compute(&store, &catalog, &selected, &[0, 50], &CancelToken::new()).unwrap();

        assert_eq!(model.series[0].values, vec![0.0, 0.0]);
    }

    #[test]
    fn selections_missing_from_the_cache_are_dropped() {
        let mut store = MemoryAttributeStore::new(0);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        store
            .insert_interval(read, 0, 100, IntervalValue::Numeric(10.0))
            .unwrap();
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        // An attribute id the tree build never saw as a leaf.
        let entity = store.resolve(&["TID", "1"]).unwrap();
        let mut selected = BTreeMap::new();
        selected.insert(catalog.display_id(entity), entity);

        let model =
            compute(&store, &catalog, &selected, &[0, 50], &CancelToken::new()).unwrap();
        assert!(model.series.is_empty());
    }

    #[test]
    fn cancellation_mid_loop_returns_cancelled() {
        let mut store = MemoryAttributeStore::new(0);
        let read = store.ensure_attribute(&["TID", "1", "read"]);
        store
            .insert_interval(read, 0, 100, IntervalValue::Numeric(10.0))
            .unwrap();
        store.set_fully_built(true);

        let catalog = catalog_for(&store);
        let selected = select(&catalog, &store, &["TID", "1", "read"]);
        let token = CancelToken::new();
        token.cancel();

        let result = compute(&store, &catalog, &selected, &[0, 50], &token);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn cancellation_mid_query_returns_cancelled() {
        let mut inner = MemoryAttributeStore::new(0);
        let read = inner.ensure_attribute(&["TID", "1", "read"]);
        for i in 0..10 {
            inner
                .insert_interval(read, i * 10, i * 10 + 9, IntervalValue::Numeric(i as f64))
                .unwrap();
        }
        inner.set_fully_built(true);

        let catalog = catalog_for(&inner);
        let selected = select(&catalog, &inner, &["TID", "1", "read"]);
        let token = CancelToken::new();
        let store = CancelAfter {
            inner,
            token: token.clone(),
            after: 3,
        };

        let result = compute(&store, &catalog, &selected, &[0, 99], &token);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn empty_time_list_is_complete_and_empty() {
        let mut store = MemoryAttributeStore::new(0);
        store.ensure_attribute(&["TID", "1", "read"]);

        let catalog = catalog_for(&store);
        let model = compute(
            &store,
            &catalog,
            &BTreeMap::new(),
            &[],
            &CancelToken::new(),
        )
        .unwrap();

        assert!(model.times.is_empty());
        assert!(model.series.is_empty());
        assert!(model.complete);
    }
}
