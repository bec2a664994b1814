//! Collections, secondary indexes and index keys
//!
//! Records are JSON objects keyed by their `id` field. Each collection
//! declares secondary indexes on top-level fields; a multi-entry index
//! produces one key per element of an array field.

use harmonic_model::Timestamp;
use serde_json::Value;
use std::cmp::Ordering;
use std::ops::Bound;

/// The four logical collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    /// Chat messages
    Messages,
    /// Documentation items
    Documents,
    /// Projects
    Projects,
    /// Analytics events
    Analytics,
}

impl Collection {
    /// All collections in declaration order
    pub const ALL: [Collection; 4] = [
        Collection::Messages,
        Collection::Documents,
        Collection::Projects,
        Collection::Analytics,
    ];

    /// Storage name
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Documents => "documents",
            Self::Projects => "projects",
            Self::Analytics => "analytics",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Secondary index declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name
    pub name: &'static str,
    /// Top-level record field the key is read from
    pub key_path: &'static str,
    /// One entry per array element
    pub multi_entry: bool,
}

impl IndexSpec {
    const fn single(name: &'static str) -> Self {
        Self {
            name,
            key_path: name,
            multi_entry: false,
        }
    }

    const fn multi(name: &'static str) -> Self {
        Self {
            name,
            key_path: name,
            multi_entry: true,
        }
    }

    /// Extract the index keys of a record
    ///
    /// Records missing the field, or holding a value that is not a valid
    /// key, are simply absent from the index.
    #[must_use]
    pub fn keys_for(&self, record: &Value) -> Vec<IndexKey> {
        let Some(field) = record.get(self.key_path) else {
            return Vec::new();
        };
        match field {
            Value::Array(items) if self.multi_entry => {
                let mut keys: Vec<IndexKey> =
                    items.iter().filter_map(IndexKey::from_json).collect();
                keys.sort();
                keys.dedup();
                keys
            }
            other => IndexKey::from_json(other).into_iter().collect(),
        }
    }
}

/// Collection declaration: name plus its secondary indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Collection
    pub collection: Collection,
    /// Secondary indexes
    pub indexes: Vec<IndexSpec>,
}

impl CollectionSchema {
    /// Look up an index by name
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// Index names used by the durable store
pub mod index {
    /// Message / event creation instant
    pub const TIMESTAMP: &str = "timestamp";
    /// Message kind or document type
    pub const TYPE: &str = "type";
    /// Document tags (multi-entry)
    pub const TAGS: &str = "tags";
    /// Document creation instant
    pub const CREATED_AT: &str = "createdAt";
    /// Document last mutation instant
    pub const UPDATED_AT: &str = "updatedAt";
    /// Project activity instant
    pub const LAST_ACTIVE: &str = "lastActive";
    /// Project name
    pub const NAME: &str = "name";
    /// Analytics event name
    pub const EVENT: &str = "event";
}

/// The schema created by `init()`
#[must_use]
pub fn default_schema() -> Vec<CollectionSchema> {
    vec![
        CollectionSchema {
            collection: Collection::Messages,
            indexes: vec![IndexSpec::single(index::TIMESTAMP), IndexSpec::single(index::TYPE)],
        },
        CollectionSchema {
            collection: Collection::Documents,
            indexes: vec![
                IndexSpec::single(index::TYPE),
                IndexSpec::multi(index::TAGS),
                IndexSpec::single(index::CREATED_AT),
                IndexSpec::single(index::UPDATED_AT),
            ],
        },
        CollectionSchema {
            collection: Collection::Projects,
            indexes: vec![IndexSpec::single(index::LAST_ACTIVE), IndexSpec::single(index::NAME)],
        },
        CollectionSchema {
            collection: Collection::Analytics,
            indexes: vec![IndexSpec::single(index::TIMESTAMP), IndexSpec::single(index::EVENT)],
        },
    ]
}

/// An index key: integers sort before strings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    /// Integer key (timestamps)
    Int(i64),
    /// String key (types, tags, names)
    Text(String),
}

impl IndexKey {
    /// Convert a JSON scalar into a key
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.floor() as i64))
                .map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for IndexKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Timestamp> for IndexKey {
    fn from(v: Timestamp) -> Self {
        Self::Int(v.as_millis())
    }
}

impl From<&str> for IndexKey {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Scan direction over an index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Smallest key first
    #[default]
    Ascending,
    /// Largest key first
    Descending,
}

/// Key range over an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower bound
    pub lower: Bound<IndexKey>,
    /// Upper bound
    pub upper: Bound<IndexKey>,
}

impl KeyRange {
    /// Every key
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly one key
    #[must_use]
    pub fn only(key: impl Into<IndexKey>) -> Self {
        let key = key.into();
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys `>= key`
    #[must_use]
    pub fn at_least(key: impl Into<IndexKey>) -> Self {
        Self {
            lower: Bound::Included(key.into()),
            upper: Bound::Unbounded,
        }
    }

    /// Keys `< key`
    #[must_use]
    pub fn below(key: impl Into<IndexKey>) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(key.into()),
        }
    }

    /// Keys in `[lower, upper]`
    #[must_use]
    pub fn between(lower: impl Into<IndexKey>, upper: impl Into<IndexKey>) -> Self {
        Self {
            lower: Bound::Included(lower.into()),
            upper: Bound::Included(upper.into()),
        }
    }

    /// True if `key` lies within the range
    #[must_use]
    pub fn contains(&self, key: &IndexKey) -> bool {
        let above_lower = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below_upper = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above_lower && below_upper
    }

    /// True if no key can satisfy the range
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l.cmp(u) != Ordering::Less,
            _ => false,
        }
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_key_extraction() {
        let spec = IndexSpec::single("timestamp");
        assert_eq!(spec.keys_for(&json!({"timestamp": 42})), vec![IndexKey::Int(42)]);
        assert!(spec.keys_for(&json!({"other": 1})).is_empty());
        assert!(spec.keys_for(&json!({"timestamp": null})).is_empty());
    }

    #[test]
    fn multi_entry_extraction_dedups() {
        let spec = IndexSpec::multi("tags");
        let keys = spec.keys_for(&json!({"tags": ["b", "a", "b", 3, {"x": 1}]}));
        assert_eq!(
            keys,
            vec![IndexKey::Int(3), IndexKey::from("a"), IndexKey::from("b")]
        );
    }

    #[test]
    fn integers_sort_before_text() {
        assert!(IndexKey::Int(i64::MAX) < IndexKey::from(""));
    }

    #[test]
    fn range_membership() {
        let range = KeyRange::below(10_i64);
        assert!(range.contains(&IndexKey::Int(9)));
        assert!(!range.contains(&IndexKey::Int(10)));

        let range = KeyRange::only("api");
        assert!(range.contains(&IndexKey::from("api")));
        assert!(!range.contains(&IndexKey::from("code")));
    }

    #[test]
    fn empty_ranges_detected() {
        assert!(KeyRange::between(5_i64, 4_i64).is_empty());
        assert!(!KeyRange::between(4_i64, 4_i64).is_empty());
        assert!(KeyRange {
            lower: Bound::Excluded(IndexKey::Int(4)),
            upper: Bound::Excluded(IndexKey::Int(4)),
        }
        .is_empty());
        assert!(!KeyRange::all().is_empty());
    }

    #[test]
    fn default_schema_declares_four_collections() {
        let schema = default_schema();
        assert_eq!(schema.len(), 4);
        let docs = schema.iter().find(|s| s.collection == Collection::Documents).unwrap();
        assert!(docs.index(index::TAGS).unwrap().multi_entry);
        assert!(docs.index(index::CREATED_AT).is_some());
    }
}
