use crate::{
    common,
    error::{Error, Result},
};

use indexmap::IndexMap;
use std::collections;

/// Attributes to fetch (projection).
///
/// ```rust
/// use dynamodb_connector::common::selection;
///
/// let fields = selection::Fields::Leaves(vec![
///     "id".to_string(),
///     "name".to_string(),
/// ]);
/// assert_eq!(fields.names(), vec!["id", "name"]);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fields {
    /// Flat list of attribute names to fetch.
    Leaves(Vec<String>),
    /// Attribute name to include flag; only `true` entries are fetched.
    Flags(IndexMap<String, bool>),
}

impl Fields {
    /// Names of the attributes to fetch, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Leaves(leaves) => leaves.iter().map(String::as_str).collect(),
            Self::Flags(flags) => flags
                .iter()
                .filter(|(_, include)| **include)
                .map(|(name, _)| name.as_str())
                .collect(),
        }
    }
}

impl From<&Fields> for common::ExpressionInput {
    fn from(fields: &Fields) -> Self {
        let operations = fields
            .names()
            .into_iter()
            .map(|name| {
                let placeholder = common::add_placeholder(name);
                let expression = placeholder.clone();
                let expression_attribute_names =
                    collections::HashMap::from([(placeholder, name.to_string())]);
                common::ExpressionInput {
                    expression,
                    expression_attribute_names,
                    ..Default::default()
                }
            })
            .collect();
        common::ExpressionInput::merge(", ", operations)
    }
}

impl TryFrom<serde_json::Value> for Fields {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(name) => Ok(Self::Leaves(vec![name])),
            serde_json::Value::Array(items) => {
                let mut leaves = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        serde_json::Value::String(name) => leaves.push(name),
                        other => {
                            return Err(Error::invalid_filter(format!(
                                "fields entries must be strings, got `{other}`"
                            )));
                        }
                    }
                }
                Ok(Self::Leaves(leaves))
            }
            serde_json::Value::Object(map) => {
                let flags = map
                    .into_iter()
                    .map(|(name, include)| {
                        let include = match include {
                            serde_json::Value::Bool(include) => include,
                            serde_json::Value::Null => false,
                            serde_json::Value::Number(number) => number.as_f64() != Some(0.0),
                            _ => true,
                        };
                        (name, include)
                    })
                    .collect();
                Ok(Self::Flags(flags))
            }
            other => Err(Error::invalid_filter(format!(
                "fields must be a name, a list or an object, got `{other}`"
            ))),
        }
    }
}
