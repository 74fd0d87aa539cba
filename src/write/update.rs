use crate::{
    common::{self, key, value},
    error::{Error, Result},
    schema,
};

use indexmap::IndexMap;
use std::collections;

/// Change applied to one attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Overwrite the attribute with a normalized value.
    Put(value::Value),
    /// Delete the attribute.
    Remove,
}

/// Attribute changes for a single record.
///
/// ```rust
/// use dynamodb_connector::{common::value, write::update};
///
/// let mut plan = update::MutationPlan::default();
/// assert!(plan.is_empty());
/// plan.mutations.insert("title".to_string(), update::Mutation::Put(value::Value::from("T")));
/// assert!(!plan.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationPlan {
    /// Primary-key values addressing the record.
    pub keys: key::Keys,
    /// Mutations by attribute name, in the order they were requested.
    pub mutations: IndexMap<String, Mutation>,
}

impl MutationPlan {
    /// Whether applying the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Attributes the plan overwrites.
    pub fn puts(&self) -> impl Iterator<Item = (&str, &value::Value)> {
        self.mutations
            .iter()
            .filter_map(|(name, mutation)| match mutation {
                Mutation::Put(value) => Some((name.as_str(), value)),
                Mutation::Remove => None,
            })
    }

    /// Attributes the plan deletes.
    pub fn removes(&self) -> impl Iterator<Item = &str> {
        self.mutations
            .iter()
            .filter(|(_, mutation)| **mutation == Mutation::Remove)
            .map(|(name, _)| name.as_str())
    }

    /// The record that results from applying the plan to `baseline`.
    pub fn apply(&self, baseline: &value::Record) -> value::Record {
        let mut record = baseline.clone();
        for (name, mutation) in &self.mutations {
            match mutation {
                Mutation::Put(value) => {
                    record.insert(name.clone(), value.clone());
                }
                Mutation::Remove => {
                    record.shift_remove(name);
                }
            }
        }
        record
    }
}

impl TryFrom<&MutationPlan> for common::ExpressionInput {
    type Error = Error;

    fn try_from(plan: &MutationPlan) -> Result<Self> {
        let mut sets = Vec::new();
        let mut removes = Vec::new();
        for (index, (name, mutation)) in plan.mutations.iter().enumerate() {
            let placeholder = common::add_placeholder(name);
            let expression_attribute_names =
                collections::HashMap::from([(placeholder.clone(), name.clone())]);
            match mutation {
                Mutation::Put(value) => {
                    let value_placeholder = format!(":set{index}");
                    let value = value::to_attribute(value)?;
                    sets.push(common::ExpressionInput {
                        expression: format!("{placeholder} = {value_placeholder}"),
                        expression_attribute_names,
                        expression_attribute_values: collections::HashMap::from([(
                            value_placeholder,
                            value,
                        )]),
                    });
                }
                Mutation::Remove => removes.push(common::ExpressionInput {
                    expression: placeholder,
                    expression_attribute_names,
                    ..Default::default()
                }),
            }
        }
        let mut clauses = Vec::with_capacity(2);
        if !sets.is_empty() {
            let mut operation = common::ExpressionInput::merge(", ", sets);
            operation.expression = format!("SET {}", operation.expression);
            clauses.push(operation);
        }
        if !removes.is_empty() {
            let mut operation = common::ExpressionInput::merge(", ", removes);
            operation.expression = format!("REMOVE {}", operation.expression);
            clauses.push(operation);
        }
        Ok(common::ExpressionInput::merge(" ", clauses))
    }
}

/// Diff `update` against `baseline` into a mutation plan.
///
/// Non-null values become puts. Null or undefined values remove attributes the
/// baseline holds and are dropped otherwise. Values of `date` attributes are
/// coerced before normalization. Primary-key attributes are never mutated, and
/// the record is addressed by the baseline's key values.
pub fn reconcile<P: schema::SchemaProvider>(
    catalog: &schema::IndexCatalog<P>,
    entity: &str,
    baseline: &value::Record,
    update: value::Record,
) -> Result<MutationPlan> {
    let metadata = catalog.metadata(entity)?;
    let key_specs = metadata.primary_key();
    let keys =
        key::Keys::from_record(&key_specs, baseline).map_err(|attribute| Error::MissingIdentity {
            entity: entity.to_string(),
            attribute,
        })?;
    let mut mutations = IndexMap::with_capacity(update.len());
    for (name, value) in value::normalize_record(metadata.coerce_record(update)) {
        if key_specs.iter().any(|key_spec| key_spec.name == name) {
            continue;
        }
        if !value.is_clear() {
            mutations.insert(name, Mutation::Put(value));
        } else if baseline.get(&name).is_some_and(|current| !current.is_clear()) {
            mutations.insert(name, Mutation::Remove);
        }
    }
    Ok(MutationPlan { keys, mutations })
}
