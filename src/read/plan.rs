use crate::{
    common::{self, condition},
    error::Result,
    read::filter,
    schema,
};

use aws_sdk_dynamodb::types;
use std::collections;

/// Access path chosen for a read.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Mode {
    /// Indexed lookup on the primary key.
    Query,
    /// Full table traversal with a filter expression.
    Scan,
}

/// Store-ready description of a read.
///
/// Produced by [`compile`]; the transport turns it into a `Query` or `Scan`
/// request. Compiling the same filter twice yields equal plans.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    /// The table to read from.
    pub table_name: String,
    /// Indexed query or full scan.
    pub mode: Mode,
    /// Equality conditions on primary-key attributes. Empty in scan mode.
    pub key_conditions: Vec<condition::KeyCondition>,
    /// Filter applied to scanned items. `None` in query mode.
    pub filter_expression: Option<String>,
    /// Placeholder to attribute name bindings for the filter and projection.
    pub expression_attribute_names: collections::HashMap<String, String>,
    /// Placeholder to literal bindings for the filter.
    pub expression_attribute_values: collections::HashMap<String, types::AttributeValue>,
    /// Attributes to fetch, as a projection expression.
    pub projection_expression: Option<String>,
    /// `AllAttributes` unless a projection is requested.
    pub select: types::Select,
    /// Sort direction of an indexed query. `None` leaves the store default.
    pub scan_index_forward: Option<bool>,
}

impl QueryPlan {
    fn new(table_name: &str, mode: Mode) -> Self {
        Self {
            table_name: table_name.to_string(),
            mode,
            key_conditions: Vec::new(),
            filter_expression: None,
            expression_attribute_names: collections::HashMap::new(),
            expression_attribute_values: collections::HashMap::new(),
            projection_expression: None,
            select: types::Select::AllAttributes,
            scan_index_forward: None,
        }
    }
}

fn select_mode<P: schema::SchemaProvider>(
    catalog: &schema::IndexCatalog<P>,
    entity: &str,
    where_clause: Option<&condition::WhereClause>,
) -> Result<Mode> {
    let mode = match where_clause {
        Some(clause) if catalog.is_queryable(entity, clause)? => Mode::Query,
        _ => Mode::Scan,
    };
    Ok(mode)
}

/// Compile a filter against the schema of `entity`.
///
/// A flat, equality-only where clause over primary-key attributes that pins
/// the hash key becomes an indexed query. Anything else is a scan with the
/// where clause rendered as a filter expression. Literals on `date`
/// attributes are bound as epoch milliseconds. Fails without side effects on
/// unknown entities and unsupported operators.
///
/// ```rust
/// use dynamodb_connector::{read::{filter, plan}, schema};
/// use serde_json::json;
///
/// let registry = schema::SchemaRegistry::from_settings(json!({"Post": {}})).unwrap();
/// let catalog = schema::IndexCatalog::new(registry);
/// let filter = filter::Filter::try_from(json!({"where": {"id": "abc"}})).unwrap();
/// let plan = plan::compile(&catalog, "Post", &filter).unwrap();
/// assert_eq!(plan.mode, plan::Mode::Query);
/// assert_eq!(plan.filter_expression, None);
/// ```
pub fn compile<P: schema::SchemaProvider>(
    catalog: &schema::IndexCatalog<P>,
    entity: &str,
    filter: &filter::Filter,
) -> Result<QueryPlan> {
    let metadata = catalog.metadata(entity)?;
    let where_clause = filter
        .where_clause
        .as_ref()
        .filter(|clause| !clause.is_empty())
        .map(|clause| {
            let mut clause = clause.clone();
            clause.map_literals(&mut |attribute, literal| metadata.coerce(attribute, literal));
            clause
        });
    let mode = select_mode(catalog, entity, where_clause.as_ref())?;
    let mut plan = QueryPlan::new(entity, mode);
    match (mode, &where_clause) {
        (Mode::Query, Some(condition::WhereClause::Leaves(leaves))) => {
            plan.key_conditions = leaves.clone();
        }
        (Mode::Scan, Some(clause)) => {
            let operation: common::ExpressionInput = clause.try_into()?;
            plan.filter_expression = Some(operation.merge_into(
                &mut plan.expression_attribute_names,
                &mut plan.expression_attribute_values,
            ));
        }
        _ => {}
    }
    if let Some(fields) = &filter.fields {
        let operation: common::ExpressionInput = fields.into();
        if !operation.expression.is_empty() {
            plan.projection_expression = Some(operation.merge_into(
                &mut plan.expression_attribute_names,
                &mut plan.expression_attribute_values,
            ));
            plan.select = types::Select::SpecificAttributes;
        }
    }
    if let Some(order) = &filter.order {
        match mode {
            Mode::Query => plan.scan_index_forward = Some(order.ascending),
            Mode::Scan => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    entity,
                    attribute = %order.attribute,
                    "order ignored for full scan"
                );
            }
        }
    }
    Ok(plan)
}
