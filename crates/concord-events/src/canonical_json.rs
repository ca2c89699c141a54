//! Matrix canonical JSON: UTF-8, no insignificant whitespace, object keys
//! sorted lexicographically at every depth, integers with no leading zeros,
//! no floats, no `NaN`/`Infinity`.

use std::{collections::BTreeMap, fmt};

use js_int::Int;
use serde::{de::Deserializer, ser::Serializer, Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// The inner type of [`CanonicalJsonValue::Object`]. A `BTreeMap` so that
/// serialization always emits keys in sorted order.
pub type CanonicalJsonObject = BTreeMap<String, CanonicalJsonValue>;

/// A JSON value restricted to what the Matrix canonical JSON grammar allows:
/// no floats, no `NaN`/`Infinity`, integers that fit `js_int::Int`.
#[derive(Clone, Default, Eq, PartialEq)]
pub enum CanonicalJsonValue {
    #[default]
    Null,
    Bool(bool),
    Integer(Int),
    String(String),
    Array(Vec<CanonicalJsonValue>),
    Object(CanonicalJsonObject),
}

impl CanonicalJsonValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&CanonicalJsonObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut CanonicalJsonObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Serializes this value to its canonical byte representation: compact
    /// JSON with keys already sorted (guaranteed by `BTreeMap`'s iteration
    /// order), ready to be hashed or signed.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        // `serde_json::to_vec` on a `BTreeMap`-backed value already produces
        // sorted, whitespace-free output; `Serialize` below walks the tree
        // the same way `Display` does.
        serde_json::to_vec(self).expect("CanonicalJsonValue always serializes")
    }
}

impl fmt::Debug for CanonicalJsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Null => f.debug_tuple("Null").finish(),
            Self::Bool(v) => f.debug_tuple("Bool").field(&v).finish(),
            Self::Integer(ref v) => fmt::Debug::fmt(v, f),
            Self::String(ref v) => f.debug_tuple("String").field(v).finish(),
            Self::Array(ref v) => f.debug_tuple("Array").field(v).finish(),
            Self::Object(ref v) => f.debug_tuple("Object").field(v).finish(),
        }
    }
}

impl fmt::Display for CanonicalJsonValue {
    /// Intentionally ignores formatting flags: inserting whitespace would
    /// make the output not canonical anymore.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_canonical_bytes();
        f.write_str(std::str::from_utf8(&bytes).map_err(|_| fmt::Error)?)
    }
}

impl TryFrom<JsonValue> for CanonicalJsonValue {
    type Error = Error;

    fn try_from(val: JsonValue) -> Result<Self, Self::Error> {
        Ok(match val {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(num) => {
                let i = num.as_i64().ok_or(Error::MalformedEvent("non-integer number"))?;
                Self::Integer(Int::try_from(i).map_err(|_| Error::MalformedEvent("integer out of range"))?)
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(arr) => {
                Self::Array(arr.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?)
            }
            JsonValue::Object(obj) => Self::Object(
                obj.into_iter().map(|(k, v)| Ok((k, v.try_into()?))).collect::<Result<_, Error>>()?,
            ),
        })
    }
}

impl From<CanonicalJsonValue> for JsonValue {
    fn from(val: CanonicalJsonValue) -> Self {
        match val {
            CanonicalJsonValue::Null => Self::Null,
            CanonicalJsonValue::Bool(b) => Self::Bool(b),
            CanonicalJsonValue::Integer(i) => Self::Number(i64::from(i).into()),
            CanonicalJsonValue::String(s) => Self::String(s),
            CanonicalJsonValue::Array(arr) => Self::Array(arr.into_iter().map(Into::into).collect()),
            CanonicalJsonValue::Object(obj) => {
                Self::Object(obj.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl Serialize for CanonicalJsonValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(v) => v.serialize(serializer),
            Self::Object(m) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for CanonicalJsonValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let val = JsonValue::deserialize(deserializer)?;
        val.try_into().map_err(serde::de::Error::custom)
    }
}

/// Computes the canonical byte encoding of an event for hashing or signing:
/// the object minus `unsigned`, `signatures`, and `hashes` (the fields the
/// Matrix spec excludes from the content that gets hashed), key-sorted.
pub fn canonical_bytes_excluding(
    object: &CanonicalJsonObject,
    excluded_keys: &[&str],
) -> Vec<u8> {
    let filtered: CanonicalJsonObject = object
        .iter()
        .filter(|(k, _)| !excluded_keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    CanonicalJsonValue::Object(filtered).to_canonical_bytes()
}
