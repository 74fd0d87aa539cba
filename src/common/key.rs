use crate::common::{self, value};

use serde::Deserialize;
use serde_dynamo::Result;

/// Attribute name used for the hash key when an entity declares no primary index.
pub const DEFAULT_HASH_KEY: &str = "id";

/// Storage type of a key attribute.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
pub enum KeyType {
    /// String key (`S`).
    #[default]
    #[serde(rename = "S", alias = "string")]
    String,
    /// Number key (`N`).
    #[serde(rename = "N", alias = "number")]
    Number,
}

/// Role of a key attribute within an index.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum KeyRole {
    /// Partition key.
    #[default]
    Hash,
    /// Sort key.
    Range,
}

/// Key attribute declaration.
///
/// ```rust
/// use dynamodb_connector::common::key;
///
/// let key = key::KeySpec::hash("id", key::KeyType::String);
/// assert_eq!(key.role, key::KeyRole::Hash);
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct KeySpec {
    /// The attribute name of the key.
    pub name: String,
    /// The storage type of the key.
    pub key_type: KeyType,
    /// Whether this is the hash or the range key.
    pub role: KeyRole,
}

impl KeySpec {
    /// Hash key declaration.
    pub fn hash(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            role: KeyRole::Hash,
        }
    }

    /// Range key declaration.
    pub fn range(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            role: KeyRole::Range,
        }
    }
}

/// Primary-key values addressing a single record.
///
/// Built from a record and the entity's key declarations; every declared key
/// attribute must carry a non-null value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keys {
    /// Key attribute name and value pairs, hash key first.
    pub values: Vec<(String, value::Value)>,
}

impl Keys {
    /// Extract the key values of `record`.
    ///
    /// Returns the name of the first key attribute that is absent or null.
    pub fn from_record(
        key_specs: &[KeySpec],
        record: &value::Record,
    ) -> std::result::Result<Self, String> {
        let mut values = Vec::with_capacity(key_specs.len());
        for key_spec in key_specs {
            match record.get(&key_spec.name) {
                Some(value) if !value.is_clear() => {
                    values.push((key_spec.name.clone(), value.clone().normalize()));
                }
                _ => return Err(key_spec.name.clone()),
            }
        }
        Ok(Self { values })
    }

    /// The key values as a record.
    pub fn to_record(&self) -> value::Record {
        self.values.iter().cloned().collect()
    }
}

impl TryFrom<&Keys> for common::Item {
    type Error = serde_dynamo::Error;

    fn try_from(keys: &Keys) -> Result<Self> {
        let mut item = Self::with_capacity(keys.values.len());
        for (name, value) in &keys.values {
            item.insert(name.clone(), value::to_attribute(value)?);
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_dynamodb::types;
    use rstest::rstest;
    use serde_json::json;

    fn composite() -> Vec<KeySpec> {
        vec![
            KeySpec::hash("a", KeyType::String),
            KeySpec::range("c", KeyType::Number),
        ]
    }

    #[rstest]
    #[case::partition_key_only(
        vec![KeySpec::hash("a", KeyType::String)],
        json!({"a": "b", "x": 1}),
        common::Item::from(
            [(
                "a".to_string(),
                types::AttributeValue::S(
                    "b".to_string()
                ),
            )]
        )
    )]
    #[case::partition_key_and_sort_key(
        composite(),
        json!({"a": "b", "c": 100}),
        common::Item::from(
            [
                (
                    "a".to_string(),
                    types::AttributeValue::S(
                        "b".to_string()
                    )
                ),
                (
                    "c".to_string(),
                    types::AttributeValue::N(
                        "100".to_string()
                    )
                ),
            ]
        )
    )]
    fn test_keys_to_item(
        #[case] key_specs: Vec<KeySpec>,
        #[case] record: serde_json::Value,
        #[case] expected: common::Item,
    ) {
        let record = value::record_from_json(record);
        let keys = Keys::from_record(&key_specs, &record).unwrap();
        let actual: common::Item = (&keys).try_into().unwrap();
        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case::missing_range(json!({"a": "b"}), "c")]
    #[case::null_hash(json!({"a": null, "c": 1}), "a")]
    fn test_keys_missing(#[case] record: serde_json::Value, #[case] expected: &str) {
        let record = value::record_from_json(record);
        assert_eq!(
            Keys::from_record(&composite(), &record),
            Err(expected.to_string())
        );
    }
}
