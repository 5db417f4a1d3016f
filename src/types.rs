//! Core scalar and identifier types shared across the bundle store and the indexes.

use std::cmp::Ordering;

use bson::Bson;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a document within a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tuple id: a per-index-build monotonic identifier for an indexed item.
pub type Tid = u64;

/// Tagged-variant field value. Replaces reflection-based document/map conversion:
/// every encoder and comparator dispatches on this discriminant, and the same byte
/// is what gets written as the type tag in an encoded key (see [`crate::btree::key`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(OrderedFloat<f64>),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Map(Vec<(String, FieldValue)>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// The tag byte written to the canonical key encoding for this variant.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::I64(_) => 2,
            Self::F64(_) => 3,
            Self::Str(_) => 4,
            Self::Bytes(_) => 5,
            Self::Timestamp(_) => 6,
            Self::Map(_) => 7,
            Self::List(_) => 8,
        }
    }

    #[must_use]
    pub fn from_bson(value: &Bson) -> Self {
        match value {
            Bson::Null => Self::Null,
            Bson::Boolean(b) => Self::Bool(*b),
            Bson::Int32(i) => Self::I64(i64::from(*i)),
            Bson::Int64(i) => Self::I64(*i),
            Bson::Double(d) => Self::F64(OrderedFloat(*d)),
            Bson::String(s) => Self::Str(s.clone()),
            Bson::Binary(b) => Self::Bytes(b.bytes.clone()),
            Bson::DateTime(dt) => Self::Timestamp(dt.to_chrono()),
            Bson::Array(items) => Self::List(items.iter().map(Self::from_bson).collect()),
            Bson::Document(doc) => {
                Self::Map(doc.iter().map(|(k, v)| (k.clone(), Self::from_bson(v))).collect())
            }
            other => Self::Str(other.to_string()),
        }
    }

    #[must_use]
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Null => Bson::Null,
            Self::Bool(b) => Bson::Boolean(*b),
            Self::I64(i) => Bson::Int64(*i),
            Self::F64(f) => Bson::Double(f.0),
            Self::Str(s) => Bson::String(s.clone()),
            Self::Bytes(b) => Bson::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: b.clone(),
            }),
            Self::Timestamp(dt) => Bson::DateTime(bson::DateTime::from_chrono(*dt)),
            Self::List(items) => Bson::Array(items.iter().map(Self::to_bson).collect()),
            Self::Map(fields) => {
                let mut doc = bson::Document::new();
                for (k, v) in fields {
                    doc.insert(k.clone(), v.to_bson());
                }
                Bson::Document(doc)
            }
        }
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.tag() != other.tag() {
            return Some(self.tag().cmp(&other.tag()));
        }
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::I64(a), Self::I64(b)) => Some(a.cmp(b)),
            (Self::F64(a), Self::F64(b)) => Some(a.cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_order_before_values() {
        let a = FieldValue::I64(100);
        let b = FieldValue::Str("0".into());
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Less));
    }

    #[test]
    fn bson_round_trip_preserves_scalars() {
        let v = FieldValue::I64(42);
        assert_eq!(FieldValue::from_bson(&v.to_bson()), v);
        let v = FieldValue::Str("hi".into());
        assert_eq!(FieldValue::from_bson(&v.to_bson()), v);
    }
}
