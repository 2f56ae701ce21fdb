use std::collections::HashMap;

use crate::plan::FieldSet;
use crate::value::RefId;

/// Identity of one reference resolution. Two resolutions share a cache
/// entry only when the declared target type, the identifier, the origin
/// store, and the requested field subset all match; differing projections
/// yield differently-populated instances and stay distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RefKey {
    ty: String,
    id: RefId,
    origin: String,
    fields: Option<FieldSet>,
}

impl RefKey {
    pub fn new(
        ty: impl Into<String>,
        id: RefId,
        origin: impl Into<String>,
        fields: Option<FieldSet>,
    ) -> Self {
        RefKey {
            ty: ty.into(),
            id,
            origin: origin.into(),
            fields,
        }
    }
}

/// Per-session map from reference identity to the materialized instance
/// handle. A handle is recorded for an identity before that referent's own
/// references are decoded, so a cycle resolves to the in-progress instance
/// instead of re-entering the fetch. Never shared across sessions.
#[derive(Debug)]
pub struct ReferenceCache<H> {
    entries: HashMap<RefKey, H>,
}

impl<H> ReferenceCache<H> {
    pub fn new() -> Self {
        ReferenceCache {
            entries: HashMap::new(),
        }
    }

    /// Pure lookup; never fetches.
    pub fn lookup(&self, key: &RefKey) -> Option<&H> {
        self.entries.get(key)
    }

    pub fn record(&mut self, key: RefKey, handle: H) {
        self.entries.insert(key, handle);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H> Default for ReferenceCache<H> {
    fn default() -> Self {
        ReferenceCache::new()
    }
}
