//! Typed field values and the per-file field store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A value stored in a context field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// A boolean scalar.
    Bool(bool),
    /// An integer scalar.
    Int(i64),
    /// A floating point scalar.
    Float(f64),
    /// A string.
    Text(String),
    /// A per-record boolean array (e.g. a validity mask).
    BoolArray(Vec<bool>),
    /// A per-record integer array (e.g. surface type codes).
    IntArray(Vec<i64>),
    /// A per-record floating point array (e.g. retracked ranges).
    FloatArray(Vec<f64>),
}

impl FieldValue {
    /// Feeds a canonical byte encoding into `hasher`: a variant tag, a
    /// length for sequences, then little-endian values. Floats are hashed by
    /// bit pattern so NaN and the infinities stay distinct.
    fn hash_into(&self, hasher: &mut Sha256) {
        fn len_prefix(hasher: &mut Sha256, len: usize) {
            hasher.update((len as u64).to_le_bytes());
        }

        match self {
            Self::Bool(v) => hasher.update([0u8, u8::from(*v)]),
            Self::Int(v) => {
                hasher.update([1u8]);
                hasher.update(v.to_le_bytes());
            }
            Self::Float(v) => {
                hasher.update([2u8]);
                hasher.update(v.to_bits().to_le_bytes());
            }
            Self::Text(v) => {
                hasher.update([3u8]);
                len_prefix(hasher, v.len());
                hasher.update(v.as_bytes());
            }
            Self::BoolArray(values) => {
                hasher.update([4u8]);
                len_prefix(hasher, values.len());
                for v in values {
                    hasher.update([u8::from(*v)]);
                }
            }
            Self::IntArray(values) => {
                hasher.update([5u8]);
                len_prefix(hasher, values.len());
                for v in values {
                    hasher.update(v.to_le_bytes());
                }
            }
            Self::FloatArray(values) => {
                hasher.update([6u8]);
                len_prefix(hasher, values.len());
                for v in values {
                    hasher.update(v.to_bits().to_le_bytes());
                }
            }
        }
    }

    /// Returns the variant name, used in type mismatch errors.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::BoolArray(_) => "bool_array",
            Self::IntArray(_) => "int_array",
            Self::FloatArray(_) => "float_array",
        }
    }

    /// Returns the number of records for array values, `None` for scalars.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::BoolArray(v) => Some(v.len()),
            Self::IntArray(v) => Some(v.len()),
            Self::FloatArray(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Returns true for an empty array value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Returns the bool scalar, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer scalar, if this is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float scalar. Integers are widened.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the bool array, if this is one.
    #[must_use]
    pub fn as_bool_array(&self) -> Option<&[bool]> {
        match self {
            Self::BoolArray(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the integer array, if this is one.
    #[must_use]
    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            Self::IntArray(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the float array, if this is one.
    #[must_use]
    pub fn as_float_array(&self) -> Option<&[f64]> {
        match self {
            Self::FloatArray(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<bool>> for FieldValue {
    fn from(v: Vec<bool>) -> Self {
        Self::BoolArray(v)
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(v: Vec<i64>) -> Self {
        Self::IntArray(v)
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(v: Vec<f64>) -> Self {
        Self::FloatArray(v)
    }
}

/// A stored field with the name of the stage that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    /// The stored value.
    pub value: FieldValue,
    /// Stage that last wrote the value, or "" for seeded fields.
    pub written_by: String,
}

/// The field mapping of one context.
///
/// Keys are kept sorted so iteration, serialisation and fingerprints are
/// deterministic. The store is owned by a single context and is not shared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStore {
    entries: BTreeMap<String, FieldEntry>,
}

impl FieldStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Gets the full entry, including the writer.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&FieldEntry> {
        self.entries.get(key)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: FieldValue,
        written_by: impl Into<String>,
    ) -> Option<FieldValue> {
        self.entries
            .insert(
                key.into(),
                FieldEntry {
                    value,
                    written_by: written_by.into(),
                },
            )
            .map(|e| e.value)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no field has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over `(key, value)` pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), &e.value))
    }

    /// Returns a hex SHA-256 digest of the keys and values.
    ///
    /// Two stores with equal contents always have the same fingerprint,
    /// independent of insertion order or of which stage wrote each key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in self.iter() {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            value.hash_into(&mut hasher);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_accessors() {
        let v = FieldValue::from(vec![1.0, 2.0]);
        assert_eq!(v.as_float_array(), Some(&[1.0, 2.0][..]));
        assert_eq!(v.len(), Some(2));
        assert!(v.as_int_array().is_none());

        assert_eq!(FieldValue::Int(3).as_float(), Some(3.0));
        assert_eq!(FieldValue::from("LRM").as_text(), Some("LRM"));
        assert_eq!(FieldValue::Bool(true).len(), None);
    }

    #[test]
    fn test_store_insert_and_get() {
        let mut store = FieldStore::new();
        assert!(store.insert("hemisphere", "south".into(), "alg_identify_file").is_none());

        assert_eq!(store.get("hemisphere"), Some(&FieldValue::from("south")));
        assert_eq!(store.entry("hemisphere").unwrap().written_by, "alg_identify_file");
        assert!(store.contains_key("hemisphere"));
        assert!(!store.contains_key("latitudes"));
    }

    #[test]
    fn test_store_keys_sorted() {
        let mut store = FieldStore::new();
        store.insert("b", FieldValue::Int(1), "");
        store.insert("a", FieldValue::Int(2), "");
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_fingerprint_independent_of_insertion_order() {
        let mut first = FieldStore::new();
        first.insert("x", FieldValue::Float(1.5), "s1");
        first.insert("y", FieldValue::from(vec![1_i64, 2]), "s2");

        let mut second = FieldStore::new();
        second.insert("y", FieldValue::from(vec![1_i64, 2]), "other");
        second.insert("x", FieldValue::Float(1.5), "other");

        assert_eq!(first.fingerprint(), second.fingerprint());

        second.insert("x", FieldValue::Float(1.6), "other");
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_non_finite_floats() {
        let fingerprint = |value: FieldValue| {
            let mut store = FieldStore::new();
            store.insert("elevation", value, "alg_dem_elevation");
            store.fingerprint()
        };

        let nan = fingerprint(FieldValue::Float(f64::NAN));
        let pos_inf = fingerprint(FieldValue::Float(f64::INFINITY));
        let neg_inf = fingerprint(FieldValue::Float(f64::NEG_INFINITY));
        assert_ne!(nan, pos_inf);
        assert_ne!(nan, neg_inf);
        assert_ne!(pos_inf, neg_inf);
        assert_eq!(nan, fingerprint(FieldValue::Float(f64::NAN)));

        let nan_array = fingerprint(FieldValue::from(vec![1.0, f64::NAN]));
        let inf_array = fingerprint(FieldValue::from(vec![1.0, f64::INFINITY]));
        assert_ne!(nan_array, inf_array);
    }

    #[test]
    fn test_fingerprint_distinguishes_variants() {
        let fingerprint = |value: FieldValue| {
            let mut store = FieldStore::new();
            store.insert("surface_type", value, "");
            store.fingerprint()
        };

        assert_ne!(fingerprint(FieldValue::Int(1)), fingerprint(FieldValue::Float(1.0)));
        assert_ne!(
            fingerprint(FieldValue::from(vec![1_i64])),
            fingerprint(FieldValue::Int(1))
        );
        assert_ne!(fingerprint(FieldValue::from("1")), fingerprint(FieldValue::Bool(true)));
    }
}
