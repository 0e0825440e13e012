//! Attribute interval store interface and supporting types.
//!
//! The store is owned and mutated by an upstream ingestion pipeline; this
//! crate only reads it through the [`AttributeStore`] trait. Reads must
//! tolerate a store that is still growing: the `is_fully_built` probe is
//! bounded and non-blocking, never a wait.
//!
//! [`MemoryAttributeStore`] is an in-memory implementation of the trait used
//! by tests and benchmarks.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::error::Result;

/// Integer handle naming one node in the hierarchical attribute namespace.
pub type AttributeId = u32;

/// A point in time, in store units (typically nanoseconds).
pub type Timestamp = i64;

/// Value payload of one interval, decided once at store-read time.
///
/// All downstream arithmetic operates only on the numeric branch; `None`
/// (absent or malformed payload) contributes 0 and never errors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum IntervalValue {
    /// No value, or a payload that does not parse as a number.
    #[default]
    None,
    /// A numeric payload.
    Numeric(f64),
}

impl IntervalValue {
    /// Numeric value, defaulting to 0 for the `None` branch.
    pub fn as_f64(self) -> f64 {
        match self {
            IntervalValue::None => 0.0,
            IntervalValue::Numeric(v) => v,
        }
    }
}

/// One time-stamped value interval: the attribute held `value` over the
/// closed range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// The attribute this interval belongs to.
    pub attribute: AttributeId,
    /// Inclusive start time.
    pub start: Timestamp,
    /// Inclusive end time, `>= start`.
    pub end: Timestamp,
    /// Value held over the range.
    pub value: IntervalValue,
}

impl Interval {
    /// Whether `time` falls inside this interval (bounds inclusive).
    pub fn covers(&self, time: Timestamp) -> bool {
        self.start <= time && time <= self.end
    }

    /// Length of the closed range, always at least 1.
    pub fn duration(&self) -> i64 {
        self.end - self.start + 1
    }
}

/// Inserting an interval that would break the disjointness invariant.
#[derive(Debug, Error)]
#[error("interval [{start}, {end}] overlaps an existing interval of attribute {attribute}")]
pub struct OverlapError {
    /// Attribute whose set rejected the insert.
    pub attribute: AttributeId,
    /// Start of the rejected interval.
    pub start: Timestamp,
    /// End of the rejected interval.
    pub end: Timestamp,
}

/// Per-attribute interval container, ordered by start time.
///
/// Ordering and disjointness are invariants of the type, not an incidental
/// property of how callers fill it: `insert` keeps intervals keyed by start
/// time and at most one interval covers any instant. Lookup by time is the
/// last interval starting at or before the queried instant.
#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    by_start: BTreeMap<Timestamp, Interval>,
}

impl IntervalSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an interval, replacing any interval with the same start time.
    ///
    /// Query results for a single attribute are disjoint by the store's own
    /// invariant, so no overlap check is needed on this path.
    pub fn insert(&mut self, interval: Interval) {
        self.by_start.insert(interval.start, interval);
    }

    /// Insert, rejecting intervals that overlap an existing one.
    pub fn try_insert(&mut self, interval: Interval) -> std::result::Result<(), OverlapError> {
        let overlap = OverlapError {
            attribute: interval.attribute,
            start: interval.start,
            end: interval.end,
        };
        if let Some((_, before)) = self.by_start.range(..=interval.start).next_back() {
            if before.end >= interval.start {
                return Err(overlap);
            }
        }
        if let Some((_, after)) = self.by_start.range(interval.start..).next() {
            if after.start <= interval.end {
                return Err(overlap);
            }
        }
        self.by_start.insert(interval.start, interval);
        Ok(())
    }

    /// The interval covering `time`, if any.
    pub fn at(&self, time: Timestamp) -> Option<&Interval> {
        self.by_start
            .range(..=time)
            .next_back()
            .map(|(_, interval)| interval)
            .filter(|interval| interval.covers(time))
    }

    /// Intervals in ascending start-time order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.by_start.values()
    }

    /// Number of intervals in the set.
    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    /// Whether the set holds no intervals.
    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }
}

/// Lazily consumed result of a batched 2-D range query.
///
/// Yielding `Result` per item lets a store that is torn down mid-query
/// surface the failure at the point of consumption.
pub type IntervalIter<'a> = Box<dyn Iterator<Item = Result<Interval>> + 'a>;

/// Read interface onto the hierarchical attribute interval store.
///
/// Implementations may be concurrently mutated by an ingestion thread while
/// this crate reads them; every method must tolerate a store that is still
/// growing and must never block indefinitely.
pub trait AttributeStore {
    /// Resolve a path of attribute names from the root to an id.
    fn resolve(&self, path: &[&str]) -> Option<AttributeId>;

    /// Direct children of an attribute, in creation order.
    fn children(&self, attribute: AttributeId) -> Vec<AttributeId>;

    /// Direct child with the given name, if present.
    fn child(&self, attribute: AttributeId, name: &str) -> Option<AttributeId>;

    /// The attribute's own name (last path segment).
    fn attribute_name(&self, attribute: AttributeId) -> String;

    /// Earliest time the store covers.
    fn start_time(&self) -> Timestamp;

    /// Latest time the store has committed so far. Grows while ingestion
    /// is still running.
    fn current_end_time(&self) -> Timestamp;

    /// Bounded, non-blocking probe: has ingestion finished?
    fn is_fully_built(&self) -> bool;

    /// One batched query for all intervals of `attributes` intersecting the
    /// span of `times`. The iterator yields intervals in unspecified order;
    /// callers bucket them per attribute.
    fn query_range(
        &self,
        attributes: &[AttributeId],
        times: &[Timestamp],
    ) -> Result<IntervalIter<'_>>;
}

struct Node {
    name: String,
    children: Vec<AttributeId>,
    intervals: IntervalSet,
}

/// In-memory [`AttributeStore`] for tests, benchmarks and examples.
///
/// Attributes are created by path; intervals are validated against the
/// disjointness invariant on insert. `current_end_time` advances
/// automatically to the latest inserted interval end and can be pushed
/// further with [`set_current_end`](MemoryAttributeStore::set_current_end)
/// to model an ingestion pipeline that has read past the last closed
/// interval.
pub struct MemoryAttributeStore {
    nodes: Vec<Node>,
    start: Timestamp,
    current_end: Timestamp,
    fully_built: bool,
}

impl MemoryAttributeStore {
    /// New store starting at `start`, empty and not yet built.
    pub fn new(start: Timestamp) -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                children: Vec::new(),
                intervals: IntervalSet::new(),
            }],
            start,
            current_end: start,
            fully_built: false,
        }
    }

    /// Root attribute id.
    pub fn root(&self) -> AttributeId {
        0
    }

    /// Get or create the attribute at `path`, creating parents as needed.
    pub fn ensure_attribute(&mut self, path: &[&str]) -> AttributeId {
        let mut current = self.root();
        for segment in path {
            current = match self.find_child(current, segment) {
                Some(child) => child,
                None => {
                    let id = self.nodes.len() as AttributeId;
                    self.nodes.push(Node {
                        name: (*segment).to_string(),
                        children: Vec::new(),
                        intervals: IntervalSet::new(),
                    });
                    self.nodes[current as usize].children.push(id);
                    id
                }
            };
        }
        current
    }

    /// Insert one interval for an attribute, rejecting overlaps.
    pub fn insert_interval(
        &mut self,
        attribute: AttributeId,
        start: Timestamp,
        end: Timestamp,
        value: IntervalValue,
    ) -> std::result::Result<(), OverlapError> {
        debug_assert!(start <= end, "interval start must not exceed end");
        self.nodes[attribute as usize].intervals.try_insert(Interval {
            attribute,
            start,
            end,
            value,
        })?;
        self.current_end = self.current_end.max(end);
        Ok(())
    }

    /// Advance the committed end time past the last closed interval.
    pub fn set_current_end(&mut self, end: Timestamp) {
        self.current_end = self.current_end.max(end);
    }

    /// Mark ingestion as finished.
    pub fn set_fully_built(&mut self, built: bool) {
        self.fully_built = built;
    }

    fn find_child(&self, parent: AttributeId, name: &str) -> Option<AttributeId> {
        self.nodes[parent as usize]
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child as usize].name == name)
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn resolve(&self, path: &[&str]) -> Option<AttributeId> {
        let mut current = self.root();
        for segment in path {
            current = self.find_child(current, segment)?;
        }
        Some(current)
    }

    fn children(&self, attribute: AttributeId) -> Vec<AttributeId> {
        self.nodes
            .get(attribute as usize)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    fn child(&self, attribute: AttributeId, name: &str) -> Option<AttributeId> {
        self.find_child(attribute, name)
    }

    fn attribute_name(&self, attribute: AttributeId) -> String {
        self.nodes
            .get(attribute as usize)
            .map(|node| node.name.clone())
            .unwrap_or_default()
    }

    fn start_time(&self) -> Timestamp {
        self.start
    }

    fn current_end_time(&self) -> Timestamp {
        self.current_end
    }

    fn is_fully_built(&self) -> bool {
        self.fully_built
    }

    fn query_range(
        &self,
        attributes: &[AttributeId],
        times: &[Timestamp],
    ) -> Result<IntervalIter<'_>> {
        let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
            return Ok(Box::new(std::iter::empty()));
        };
        if first > last {
            return Err(crate::error::Error::QueryFailed(format!(
                "invalid time span [{first}, {last}]"
            )));
        }
        let hits: Vec<Interval> = attributes
            .iter()
            .filter_map(|&attribute| self.nodes.get(attribute as usize))
            .flat_map(|node| node.intervals.iter())
            .filter(|interval| interval.end >= first && interval.start <= last)
            .copied()
            .collect();
        Ok(Box::new(hits.into_iter().map(Ok)))
    }
}
