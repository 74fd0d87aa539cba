//! Entity metadata and index coverage.
//!
//! The [`SchemaProvider`] supplies per-entity key declarations; the
//! [`IndexCatalog`] answers the coverage questions the filter compiler and the
//! update reconciler ask of them.

use crate::{
    common::{
        condition,
        key::{self, KeySpec, KeyType},
        value,
    },
    error::{Error, Result},
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections;

/// Declared storage type of a plain attribute.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// String attribute.
    String,
    /// Numeric attribute.
    Number,
    /// Boolean attribute.
    Boolean,
    /// Temporal attribute, stored as epoch milliseconds.
    Date,
    /// Binary attribute.
    Binary,
    /// Ordered list.
    Array,
    /// Nested structure.
    Object,
}

/// Primary index: one hash key and at most one range key.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimaryIndex {
    /// The partition key.
    pub hash_key: KeySpec,
    /// The sort key, for composite primary keys.
    pub range_key: Option<KeySpec>,
}

/// Secondary index declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct SecondaryIndex {
    /// The index name.
    pub name: String,
    /// The index partition key.
    pub hash_key: KeySpec,
    /// The index sort key.
    pub range_key: Option<KeySpec>,
}

impl SecondaryIndex {
    fn contains(&self, attribute: &str) -> bool {
        self.hash_key.name == attribute
            || self
                .range_key
                .as_ref()
                .is_some_and(|range_key| range_key.name == attribute)
    }
}

/// Metadata the connector needs about one entity type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityMetadata {
    /// Declared primary index, if any.
    pub primary_index: Option<PrimaryIndex>,
    /// Declared secondary indexes.
    pub secondary_indices: Vec<SecondaryIndex>,
    /// Id attribute used as hash key when no primary index is declared.
    pub id_attribute: Option<String>,
    /// Declared attribute types.
    pub attribute_types: IndexMap<String, AttributeType>,
}

#[derive(Debug, Deserialize)]
struct KeySettings {
    key: String,
    #[serde(default, rename = "type")]
    key_type: KeyType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexSettings {
    #[serde(default)]
    name: Option<String>,
    hash_key: KeySettings,
    #[serde(default)]
    range_key: Option<KeySettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntitySettings {
    #[serde(default)]
    primary_index: Option<IndexSettings>,
    #[serde(default)]
    indices: Vec<IndexSettings>,
    #[serde(default)]
    id_column: Option<String>,
    #[serde(default)]
    properties: IndexMap<String, AttributeType>,
}

impl EntityMetadata {
    /// Entity with a single hash key.
    pub fn with_hash_key(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            primary_index: Some(PrimaryIndex {
                hash_key: KeySpec::hash(name, key_type),
                range_key: None,
            }),
            ..Default::default()
        }
    }

    /// Entity with a composite hash and range primary key.
    pub fn with_composite_key(hash_key: KeySpec, range_key: KeySpec) -> Self {
        Self {
            primary_index: Some(PrimaryIndex {
                hash_key,
                range_key: Some(range_key),
            }),
            ..Default::default()
        }
    }

    /// Parse model settings of the form
    /// `{"primaryIndex": {"hashKey": {"key": "id", "type": "S"}}, "indices": [...]}`.
    pub fn from_settings(entity: &str, settings: serde_json::Value) -> Result<Self> {
        let settings: EntitySettings =
            serde_json::from_value(settings).map_err(|err| Error::InvalidSchema {
                entity: entity.to_string(),
                reason: err.to_string(),
            })?;
        let primary_index = settings.primary_index.map(|index| PrimaryIndex {
            hash_key: KeySpec::hash(index.hash_key.key, index.hash_key.key_type),
            range_key: index
                .range_key
                .map(|range_key| KeySpec::range(range_key.key, range_key.key_type)),
        });
        let mut secondary_indices = Vec::with_capacity(settings.indices.len());
        for index in settings.indices {
            let Some(name) = index.name else {
                return Err(Error::InvalidSchema {
                    entity: entity.to_string(),
                    reason: "secondary index without a name".to_string(),
                });
            };
            secondary_indices.push(SecondaryIndex {
                name,
                hash_key: KeySpec::hash(index.hash_key.key, index.hash_key.key_type),
                range_key: index
                    .range_key
                    .map(|range_key| KeySpec::range(range_key.key, range_key.key_type)),
            });
        }
        Ok(Self {
            primary_index,
            secondary_indices,
            id_attribute: settings.id_column,
            attribute_types: settings.properties,
        })
    }

    /// Primary-key declarations, hash key first.
    ///
    /// Without a declared primary index the id attribute (or `id`) is the
    /// string hash key.
    pub fn primary_key(&self) -> Vec<KeySpec> {
        match &self.primary_index {
            Some(index) => {
                let mut keys = vec![index.hash_key.clone()];
                keys.extend(index.range_key.clone());
                keys
            }
            None => {
                let name = self.id_attribute.as_deref().unwrap_or(key::DEFAULT_HASH_KEY);
                vec![KeySpec::hash(name, KeyType::String)]
            }
        }
    }

    /// Whether `attribute` is the hash or range key of the primary index.
    pub fn is_in_primary_key(&self, attribute: &str) -> bool {
        self.primary_key()
            .iter()
            .any(|key_spec| key_spec.name == attribute)
    }

    /// Name of the primary hash key.
    pub fn hash_key(&self) -> &str {
        match &self.primary_index {
            Some(index) => &index.hash_key.name,
            None => self.id_attribute.as_deref().unwrap_or(key::DEFAULT_HASH_KEY),
        }
    }

    /// Coerce `value` to the declared type of `attribute`.
    ///
    /// RFC 3339 strings on `date` attributes become timestamps. Anything else
    /// passes through unchanged.
    pub fn coerce(&self, attribute: &str, value: value::Value) -> value::Value {
        match (self.attribute_types.get(attribute), value) {
            (Some(AttributeType::Date), value::Value::String(text)) => {
                match DateTime::parse_from_rfc3339(&text) {
                    Ok(timestamp) => value::Value::Timestamp(timestamp.with_timezone(&Utc)),
                    Err(_) => value::Value::String(text),
                }
            }
            (_, value) => value,
        }
    }

    /// [`coerce`](Self::coerce) every attribute of `record`.
    pub fn coerce_record(&self, record: value::Record) -> value::Record {
        record
            .into_iter()
            .map(|(name, value)| {
                let value = self.coerce(&name, value);
                (name, value)
            })
            .collect()
    }
}

/// Source of entity metadata.
pub trait SchemaProvider: Send + Sync {
    /// Metadata registered for `entity`, if any.
    fn entity_metadata(&self, entity: &str) -> Option<&EntityMetadata>;
}

/// In-memory [`SchemaProvider`].
///
/// ```rust
/// use dynamodb_connector::schema;
/// use serde_json::json;
///
/// let registry = schema::SchemaRegistry::from_settings(json!({
///     "Post": {"primaryIndex": {"hashKey": {"key": "id", "type": "S"}}},
/// }))
/// .unwrap();
/// assert!(registry.contains("Post"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    entities: collections::HashMap<String, EntityMetadata>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the metadata of `entity`.
    pub fn register(&mut self, entity: impl Into<String>, metadata: EntityMetadata) -> &mut Self {
        self.entities.insert(entity.into(), metadata);
        self
    }

    /// Whether `entity` is registered.
    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    /// Build a registry from an object of entity name to model settings.
    pub fn from_settings(settings: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(entities) = settings else {
            return Err(Error::InvalidSchema {
                entity: String::new(),
                reason: "settings must be an object keyed by entity".to_string(),
            });
        };
        let mut registry = Self::new();
        for (entity, settings) in entities {
            let metadata = EntityMetadata::from_settings(&entity, settings)?;
            registry.register(entity, metadata);
        }
        Ok(registry)
    }
}

impl SchemaProvider for SchemaRegistry {
    fn entity_metadata(&self, entity: &str) -> Option<&EntityMetadata> {
        self.entities.get(entity)
    }
}

/// Index coverage lookups over a [`SchemaProvider`].
#[derive(Clone, Debug)]
pub struct IndexCatalog<P> {
    provider: P,
}

impl<P: SchemaProvider> IndexCatalog<P> {
    /// Wrap a schema provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Metadata of `entity`, or `SchemaNotFound`.
    pub fn metadata(&self, entity: &str) -> Result<&EntityMetadata> {
        self.provider
            .entity_metadata(entity)
            .ok_or_else(|| Error::SchemaNotFound(entity.to_string()))
    }

    /// Primary-key declarations of `entity` (one or two entries).
    pub fn resolve_primary_key(&self, entity: &str) -> Result<Vec<KeySpec>> {
        Ok(self.metadata(entity)?.primary_key())
    }

    /// Whether `attribute` is a key of the primary index or of any secondary index.
    pub fn is_indexed(&self, entity: &str, attribute: &str) -> Result<bool> {
        let metadata = self.metadata(entity)?;
        let indexed = metadata.is_in_primary_key(attribute)
            || metadata
                .secondary_indices
                .iter()
                .any(|index| index.contains(attribute));
        Ok(indexed)
    }

    /// Whether `attribute` belongs to the primary key of `entity`.
    pub fn is_in_primary_key(&self, entity: &str, attribute: &str) -> Result<bool> {
        Ok(self.metadata(entity)?.is_in_primary_key(attribute))
    }

    /// Whether a flat clause references only primary-key attributes.
    ///
    /// Boolean nodes are never covered. Coverage alone does not make a clause
    /// queryable; see [`is_queryable`](Self::is_queryable).
    pub fn covers_clause(&self, entity: &str, clause: &condition::WhereClause) -> Result<bool> {
        let metadata = self.metadata(entity)?;
        if !clause.is_flat() {
            return Ok(false);
        }
        let covered = clause
            .attribute_names()
            .into_iter()
            .all(|name| metadata.is_in_primary_key(name));
        Ok(covered)
    }

    /// Whether a clause can be served by an indexed query: covered,
    /// equality-only, and pinning the hash key.
    pub fn is_queryable(&self, entity: &str, clause: &condition::WhereClause) -> Result<bool> {
        if !clause.is_equality_only() || !self.covers_clause(entity, clause)? {
            return Ok(false);
        }
        let hash_key = self.metadata(entity)?.hash_key();
        Ok(clause.attribute_names().contains(&hash_key))
    }
}
