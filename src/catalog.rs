//! Entry catalog: builds the display tree and the leaf label cache.
//!
//! The catalog walks the attribute hierarchy once per tree request, drops
//! entities that have no queryable metric leaf, and records every leaf's
//! fully-qualified display path keyed by attribute id. That cache is the
//! sole channel connecting a later series request's selected ids back to
//! attribute ids: only leaves previously seen by a tree build are eligible
//! for series queries.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::resolver::NameResolver;
use crate::store::{AttributeId, AttributeStore, Timestamp};

/// Namespace root under which entity attributes live.
pub const ENTITY_ROOT: &str = "TID";

/// Metric leaf attribute names with their display titles.
const METRIC_LEAVES: &[(&str, &str)] = &[("read", "Read"), ("write", "Write")];

/// Display id of the synthetic root entry.
pub const ROOT_ID: i64 = 0;

/// Parent id marking the root of the display tree.
pub const ROOT_PARENT: i64 = -1;

/// One node of the display tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Stable display id, reused across requests for the same attribute.
    pub id: i64,
    /// Display id of the parent entry, `-1` for the root.
    pub parent_id: i64,
    /// Human-readable label.
    pub label: String,
    /// Numeric entity key, when the raw key parses as an integer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<i64>,
}

/// Output of one tree build.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeModel {
    /// Id of the synthetic root entry.
    pub root_id: i64,
    /// All entries, root first, entities before their metric children.
    pub entries: Vec<Entry>,
}

/// Shared catalog state: display-id registry and leaf label cache.
///
/// Both maps live for the analysis session and are only ever grown.
/// Mutation is synchronized per insert (last writer wins per key), so tree
/// builds and series requests may run concurrently on different threads.
pub struct EntryCatalog {
    session_label: String,
    ids: RwLock<FxHashMap<AttributeId, i64>>,
    next_id: AtomicI64,
    leaf_paths: RwLock<FxHashMap<AttributeId, String>>,
}

impl EntryCatalog {
    /// New catalog labelled with the session (trace) name.
    pub fn new(session_label: impl Into<String>) -> Self {
        Self {
            session_label: session_label.into(),
            ids: RwLock::new(FxHashMap::default()),
            next_id: AtomicI64::new(ROOT_ID + 1),
            leaf_paths: RwLock::new(FxHashMap::default()),
        }
    }

    /// Display id of the synthetic root entry.
    pub fn root_id(&self) -> i64 {
        ROOT_ID
    }

    /// Stable display id for an attribute, assigned on first sight.
    pub fn display_id(&self, attribute: AttributeId) -> i64 {
        if let Some(&id) = self.ids.read().unwrap().get(&attribute) {
            return id;
        }
        let mut ids = self.ids.write().unwrap();
        *ids.entry(attribute)
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether the attribute is a metric leaf seen by a previous tree build.
    pub fn has_leaf(&self, attribute: AttributeId) -> bool {
        self.leaf_paths.read().unwrap().contains_key(&attribute)
    }

    /// Fully-qualified display path of a cached metric leaf.
    pub fn leaf_path(&self, attribute: AttributeId) -> Option<String> {
        self.leaf_paths.read().unwrap().get(&attribute).cloned()
    }

    /// Walk the attribute hierarchy and build the display tree.
    ///
    /// Entities with neither metric leaf are dropped entirely; they never
    /// appear in the tree and can never be selected for series queries.
    /// Repeated calls overwrite stale cache entries for the same leaf.
    pub fn build_tree<S, R>(&self, store: &S, resolver: &R) -> TreeModel
    where
        S: AttributeStore + ?Sized,
        R: NameResolver + ?Sized,
    {
        let mut entries = vec![Entry {
            id: ROOT_ID,
            parent_id: ROOT_PARENT,
            label: self.session_label.clone(),
            tid: None,
        }];

        let entities = store
            .resolve(&[ENTITY_ROOT])
            .map(|root| store.children(root))
            .unwrap_or_default();
        let resolve_at = store.current_end_time();
        let mut kept = 0usize;

        for entity in entities {
            let leaves: Vec<(AttributeId, &str)> = METRIC_LEAVES
                .iter()
                .filter_map(|&(name, title)| store.child(entity, name).map(|id| (id, title)))
                .collect();
            if leaves.is_empty() {
                continue;
            }
            kept += 1;

            let key = store.attribute_name(entity);
            let label = entity_label(resolver, &key, resolve_at);
            let tid = key.parse::<i64>().ok();
            let entity_id = self.display_id(entity);
            entries.push(Entry {
                id: entity_id,
                parent_id: ROOT_ID,
                label: label.clone(),
                tid,
            });

            for (leaf, title) in leaves {
                entries.push(Entry {
                    id: self.display_id(leaf),
                    parent_id: entity_id,
                    label: title.to_string(),
                    tid,
                });
                self.leaf_paths.write().unwrap().insert(
                    leaf,
                    format!("{}/{}/{}", self.session_label, label, title),
                );
            }
        }

        tracing::debug!(
            entities = kept,
            entries = entries.len(),
            "built entry tree"
        );

        TreeModel {
            root_id: ROOT_ID,
            entries,
        }
    }

    /// Map selected display ids back to their attribute ids.
    ///
    /// Ids that were never assigned by a tree build are silently excluded;
    /// the set of selectable ids is inherently a subset unknown to a caller
    /// who has not yet fetched a tree.
    pub fn selected_entries(&self, selected: &[i64]) -> BTreeMap<i64, AttributeId> {
        let ids = self.ids.read().unwrap();
        let reverse: FxHashMap<i64, AttributeId> =
            ids.iter().map(|(&attr, &id)| (id, attr)).collect();
        selected
            .iter()
            .filter_map(|id| reverse.get(id).map(|&attr| (*id, attr)))
            .collect()
    }
}

/// Best-effort label: `"{name} ({key})"` when the resolver knows the
/// entity, the raw key otherwise.
fn entity_label<R>(resolver: &R, key: &str, at: Timestamp) -> String
where
    R: NameResolver + ?Sized,
{
    match resolver.resolve(key, at) {
        Some(name) => format!("{name} ({key})"),
        None => key.to_string(),
    }
}
