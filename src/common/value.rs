use crate::common;

use aws_sdk_dynamodb::types;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_dynamo::{Result, to_attribute_value};

/// A record: attribute name to value, in declaration order.
pub type Record = IndexMap<String, Value>;

/// Attribute value as seen by the connector.
///
/// ```rust
/// use dynamodb_connector::common::value;
///
/// let title = value::Value::from("hello");
/// let count = value::Value::Int(3);
/// assert_eq!(title, value::Value::String("hello".to_string()));
/// assert_ne!(title, count);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// No value was supplied. Normalizes to `Null`.
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integral number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Number kept as the store's decimal text, for values neither `Int` nor
    /// `Float` can hold exactly.
    Number(String),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Point in time. Normalizes to epoch milliseconds.
    Timestamp(DateTime<Utc>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Keyed structure.
    Map(Record),
}

impl Value {
    /// Canonicalize the value before it crosses the store boundary.
    ///
    /// Undefined becomes `Null`, timestamps become epoch milliseconds, lists
    /// and maps are normalized element-wise. Applying it twice is the same as
    /// applying it once.
    pub fn normalize(self) -> Self {
        match self {
            Self::Undefined => Self::Null,
            Self::Timestamp(timestamp) => Self::Int(timestamp.timestamp_millis()),
            Self::List(items) => Self::List(items.into_iter().map(Self::normalize).collect()),
            Self::Map(record) => Self::Map(normalize_record(record)),
            scalar => scalar,
        }
    }

    /// Whether the value clears an attribute (null or undefined).
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Alphanumeric rendering of the literal, used to name value placeholders.
    pub(crate) fn token(&self) -> String {
        let raw = match self {
            Self::Undefined | Self::Null => "null".to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Number(number) => number.clone(),
            Self::String(value) => value.clone(),
            Self::Binary(bytes) => bytes.iter().map(|byte| format!("{byte:02x}")).collect(),
            Self::Timestamp(timestamp) => timestamp.timestamp_millis().to_string(),
            Self::List(items) => items.iter().map(Self::token).collect(),
            Self::Map(record) => record.keys().map(String::as_str).collect(),
        };
        raw.chars().filter(char::is_ascii_alphanumeric).collect()
    }
}

/// Normalize every attribute of a record.
pub fn normalize_record(record: Record) -> Record {
    record
        .into_iter()
        .map(|(name, value)| (name, value.normalize()))
        .collect()
}

/// Convert a value into a store attribute.
///
/// [`Value::Number`] is written as its decimal text, untouched.
pub fn to_attribute(value: &Value) -> Result<types::AttributeValue> {
    match value {
        Value::Number(number) => Ok(types::AttributeValue::N(number.clone())),
        Value::List(items) => items
            .iter()
            .map(to_attribute)
            .collect::<Result<_>>()
            .map(types::AttributeValue::L),
        Value::Map(record) => to_item(record).map(types::AttributeValue::M),
        scalar => to_attribute_value(scalar),
    }
}

/// Convert a record into a store item.
pub fn to_item(record: &Record) -> Result<common::Item> {
    let mut item = common::Item::with_capacity(record.len());
    for (name, value) in record {
        item.insert(name.clone(), to_attribute(value)?);
    }
    Ok(item)
}

/// Convert a store item into a record.
pub fn from_item(item: common::Item) -> Record {
    let mut record: Record = item
        .into_iter()
        .map(|(name, value)| (name, Value::from(value)))
        .collect();
    record.sort_keys();
    record
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            // Lossy outside `to_attribute`, which writes the text as-is.
            Self::Number(number) => serializer.serialize_f64(number.parse().unwrap_or_default()),
            Self::String(value) => serializer.serialize_str(value),
            Self::Binary(bytes) => serializer.serialize_bytes(bytes),
            Self::Timestamp(timestamp) => serializer.serialize_i64(timestamp.timestamp_millis()),
            Self::List(items) => serializer.collect_seq(items),
            Self::Map(record) => serializer.collect_map(record),
        }
    }
}

/// `Int` or `Float` when the text survives the round trip, `Number` otherwise.
fn parse_number(number: &str) -> Value {
    if let Ok(value) = number.parse::<i64>() {
        return Value::Int(value);
    }
    match number.parse::<f64>() {
        Ok(value) if value.is_finite() && value.to_string() == number => Value::Float(value),
        _ => Value::Number(number.to_string()),
    }
}

impl From<types::AttributeValue> for Value {
    fn from(value: types::AttributeValue) -> Self {
        match value {
            types::AttributeValue::S(value) => Self::String(value),
            types::AttributeValue::N(number) => parse_number(&number),
            types::AttributeValue::Bool(value) => Self::Bool(value),
            types::AttributeValue::B(blob) => Self::Binary(blob.into_inner()),
            types::AttributeValue::L(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            types::AttributeValue::M(map) => Self::Map(from_item(map)),
            types::AttributeValue::Ss(values) => {
                Self::List(values.into_iter().map(Self::String).collect())
            }
            types::AttributeValue::Ns(numbers) => {
                Self::List(numbers.iter().map(|number| parse_number(number)).collect())
            }
            types::AttributeValue::Bs(blobs) => Self::List(
                blobs
                    .into_iter()
                    .map(|blob| Self::Binary(blob.into_inner()))
                    .collect(),
            ),
            _ => Self::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => match (number.as_i64(), number.as_u64()) {
                (Some(value), _) => Self::Int(value),
                (None, Some(_)) => Self::Number(number.to_string()),
                (None, None) => Self::Float(number.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(value) => Self::String(value),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(name, value)| (name, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Build a record from a JSON object. Non-object input yields an empty record.
pub fn record_from_json(value: serde_json::Value) -> Record {
    match Value::from(value) {
        Value::Map(record) => record,
        _ => Record::new(),
    }
}
