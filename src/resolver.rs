//! Entity name resolution seam.

use crate::store::Timestamp;

/// Best-effort lookup of a human-readable name for an entity key.
///
/// Returning `None` is not an error; callers fall back to the raw key.
/// `at` lets resolvers pick the name that was current at a given time
/// (entity names can change over the lifetime of a trace).
pub trait NameResolver {
    /// Resolve `key` to a display name, if one is known at time `at`.
    fn resolve(&self, key: &str, at: Timestamp) -> Option<String>;
}

/// Resolver that never resolves anything; labels stay raw keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl NameResolver for NoResolver {
    fn resolve(&self, _key: &str, _at: Timestamp) -> Option<String> {
        None
    }
}

impl<F> NameResolver for F
where
    F: Fn(&str, Timestamp) -> Option<String>,
{
    fn resolve(&self, key: &str, at: Timestamp) -> Option<String> {
        self(key, at)
    }
}
