use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number};

use crate::error::TypeError;

/// A generic struct: field accessor key to value.
///
/// Ordered so that the encoded document of a record is deterministic.
pub type Object = BTreeMap<String, Value>;

/// Type-erased record value.
///
/// This is the store's internal representation of a record. Booleans have no
/// variant of their own: they travel as `Int(0)` / `Int(1)` so that the set
/// of shapes the codec and index maintainer must handle stays minimal.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// Signed integer (also used for booleans).
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Opaque byte blob.
    Bytes(Vec<u8>),
    /// Ordered sequence (arrays).
    Seq(Vec<Value>),
    /// Nested generic struct.
    Object(Object),
    /// No value. Never written into an [`Object`].
    #[default]
    Absent,
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Seq(_) => "sequence",
            Self::Object(_) => "object",
            Self::Absent => "absent",
        }
    }

    /// Returns `true` for [`Value::Absent`].
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Look up a field when this value is an object.
    pub fn get(&self, accessor: &str) -> Option<&Value> {
        self.as_object().and_then(|obj| obj.get(accessor))
    }

    /// Convert to the JSON form used on disk.
    ///
    /// Bytes become lowercase hex strings and `Absent` becomes `null`.
    /// Non-finite floats have no JSON representation and are rejected.
    pub fn to_json(&self) -> Result<serde_json::Value, TypeError> {
        Ok(match self {
            Self::Int(n) => serde_json::Value::Number((*n).into()),
            Self::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| TypeError::NonFinite(f.to_string()))?,
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Self::Seq(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            ),
            Self::Object(obj) => {
                let mut map = Map::with_capacity(obj.len());
                for (key, value) in obj {
                    if !value.is_absent() {
                        map.insert(key.clone(), value.to_json()?);
                    }
                }
                serde_json::Value::Object(map)
            }
            Self::Absent => serde_json::Value::Null,
        })
    }

    /// Rebuild a value from its JSON form.
    ///
    /// The document is self-describing except for bytes, which come back as
    /// strings; the codec resolves that using the field descriptor. JSON
    /// booleans (only produced by foreign writers) map onto `Int(0|1)`.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Absent,
            serde_json::Value::Bool(b) => Self::from(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::Seq(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Encode into the on-disk document bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(&self.to_json()?).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Decode from on-disk document bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TypeError> {
        let json: serde_json::Value =
            serde_json::from_slice(data).map_err(|e| TypeError::InvalidDocument(e.to_string()))?;
        Ok(Self::from_json(json))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{json}"),
            Err(_) => write!(f, "<{}>", self.kind_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Int(i64::from(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Seq(items)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Self::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_object() -> Value {
        let mut inner = Object::new();
        inner.insert("Mode".into(), Value::from("classic"));
        let mut obj = Object::new();
        obj.insert("Name".into(), Value::from("lobby"));
        obj.insert("Round".into(), Value::Int(3));
        obj.insert("Ratio".into(), Value::Float(0.5));
        obj.insert("Open".into(), Value::from(true));
        obj.insert("Settings".into(), Value::Object(inner));
        obj.insert(
            "Tags".into(),
            Value::Seq(vec![Value::from("a"), Value::from("b")]),
        );
        Value::Object(obj)
    }

    #[test]
    fn bool_is_stored_as_int() {
        assert_eq!(Value::from(true), Value::Int(1));
        assert_eq!(Value::from(false), Value::Int(0));
    }

    #[test]
    fn document_roundtrip_preserves_structure() {
        let value = sample_object();
        let bytes = value.to_bytes().unwrap();
        assert_eq!(Value::from_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn bytes_travel_as_hex() {
        let value = Value::Bytes(vec![0xde, 0xad]);
        assert_eq!(value.to_json().unwrap(), serde_json::json!("dead"));
        // Without a descriptor the blob comes back as a string.
        let back = Value::from_bytes(&value.to_bytes().unwrap()).unwrap();
        assert_eq!(back, Value::from("dead"));
    }

    #[test]
    fn absent_fields_are_not_written() {
        let mut obj = Object::new();
        obj.insert("Missing".into(), Value::Absent);
        obj.insert("Present".into(), Value::Int(1));
        let json = Value::Object(obj).to_json().unwrap();
        assert_eq!(json, serde_json::json!({ "Present": 1 }));
    }

    #[test]
    fn null_members_are_dropped_on_read() {
        let value = Value::from_bytes(br#"{"a":null,"b":2}"#).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("a"));
        assert_eq!(obj.get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn non_finite_float_is_rejected() {
        let err = Value::Float(f64::INFINITY).to_json().unwrap_err();
        assert!(matches!(err, TypeError::NonFinite(_)));
    }

    #[test]
    fn invalid_document_is_reported() {
        let err = Value::from_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, TypeError::InvalidDocument(_)));
    }

    #[test]
    fn get_reads_object_members() {
        let value = sample_object();
        assert_eq!(value.get("Round"), Some(&Value::Int(3)));
        assert_eq!(value.get("Nope"), None);
        assert_eq!(Value::Int(1).get("Round"), None);
    }

    #[test]
    fn display_is_json() {
        assert_eq!(Value::from("x").to_string(), "\"x\"");
        assert_eq!(Value::Seq(vec![Value::Int(1)]).to_string(), "[1]");
    }

    proptest! {
        #[test]
        fn integers_and_strings_survive_documents(n in any::<i64>(), s in ".*") {
            let mut obj = Object::new();
            obj.insert("n".into(), Value::Int(n));
            obj.insert("s".into(), Value::Str(s));
            let value = Value::Object(obj);
            let back = Value::from_bytes(&value.to_bytes().unwrap()).unwrap();
            prop_assert_eq!(back, value);
        }
    }
}
