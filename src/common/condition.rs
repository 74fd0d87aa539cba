use crate::{
    common::{self, value},
    error::{Error, Result},
};

use aws_sdk_dynamodb::types;
use std::{collections, ops};

/// Value token used when a literal has no alphanumeric characters.
const EMPTY_TOKEN: &str = "empty";

/// Logical operator for combining conditions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LogicalOperator {
    /// Logical AND - all conditions must be true.
    And,
    /// Logical OR - at least one condition must be true.
    Or,
}

impl ops::Deref for LogicalOperator {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// Condition on a single attribute.
///
/// ```rust
/// use dynamodb_connector::common::{condition, value};
///
/// let eq = condition::Condition::Equals(value::Value::from("abc"));
/// let gt = condition::Condition::GreaterThan(value::Value::Int(30));
/// assert!(eq.is_equality());
/// assert!(!gt.is_equality());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Attribute equals the value (plain literal in a where object).
    Equals(value::Value),
    /// Attribute is one of the values (`in` / `inq`).
    In(Vec<value::Value>),
    /// Attribute is greater than the value (`gt`).
    GreaterThan(value::Value),
    /// Attribute is greater than or equal to the value (`gte`).
    GreaterThanOrEqual(value::Value),
    /// Attribute is less than the value (`lt`).
    LessThan(value::Value),
    /// Attribute is less than or equal to the value (`lte`).
    LessThanOrEqual(value::Value),
    /// Attribute lies between both values, inclusive (`between`).
    Between(value::Value, value::Value),
    /// Attribute is none of the values (`notIn` / `nin`).
    NotIn(Vec<value::Value>),
    /// Attribute differs from the value (`notEqual` / `neq`).
    NotEqual(value::Value),
    /// Attribute contains the value (`like`).
    Like(value::Value),
    /// Attribute does not contain the value (`notLike` / `nlike`).
    NotLike(value::Value),
}

impl Condition {
    /// Whether this is a plain equality, the only condition a key lookup accepts.
    pub fn is_equality(&self) -> bool {
        matches!(self, Self::Equals(_))
    }

    fn values_mut(&mut self) -> Vec<&mut value::Value> {
        match self {
            Self::In(list) | Self::NotIn(list) => list.iter_mut().collect(),
            Self::Between(lower, upper) => vec![lower, upper],
            Self::Equals(value)
            | Self::GreaterThan(value)
            | Self::GreaterThanOrEqual(value)
            | Self::LessThan(value)
            | Self::LessThanOrEqual(value)
            | Self::NotEqual(value)
            | Self::Like(value)
            | Self::NotLike(value) => vec![value],
        }
    }

    fn parse(name: &str, operator: &str, operand: serde_json::Value) -> Result<Self> {
        let condition = match operator {
            "in" | "inq" => Self::In(parse_values(name, operator, operand)?),
            "gt" => Self::GreaterThan(operand.into()),
            "gte" => Self::GreaterThanOrEqual(operand.into()),
            "lt" => Self::LessThan(operand.into()),
            "lte" => Self::LessThanOrEqual(operand.into()),
            "between" => {
                let bounds = match operand {
                    serde_json::Value::Array(bounds) => {
                        <[serde_json::Value; 2]>::try_from(bounds).ok()
                    }
                    _ => None,
                };
                let Some([lower, upper]) = bounds else {
                    return Err(Error::invalid_filter(format!(
                        "`between` on `{name}` expects two bounds"
                    )));
                };
                Self::Between(lower.into(), upper.into())
            }
            "notIn" | "nin" => Self::NotIn(parse_values(name, operator, operand)?),
            "notEqual" | "neq" => Self::NotEqual(operand.into()),
            "like" => Self::Like(operand.into()),
            "notLike" | "nlike" => Self::NotLike(operand.into()),
            _ => return Err(Error::unsupported(name, operator)),
        };
        Ok(condition)
    }

    fn get_filter_fragment(
        &self,
        key_placeholder: &str,
        values: &mut collections::HashMap<String, types::AttributeValue>,
    ) -> Result<String> {
        let fragment = match self {
            Self::Equals(value) => {
                format!("{key_placeholder} = {}", value_placeholder(values, value)?)
            }
            Self::In(list) => {
                format!(
                    "({key_placeholder} IN ({}))",
                    value_placeholders(values, list)?
                )
            }
            Self::GreaterThan(value) => {
                format!("({key_placeholder} > {})", value_placeholder(values, value)?)
            }
            Self::GreaterThanOrEqual(value) => {
                format!("({key_placeholder} >= {})", value_placeholder(values, value)?)
            }
            Self::LessThan(value) => {
                format!("({key_placeholder} < {})", value_placeholder(values, value)?)
            }
            Self::LessThanOrEqual(value) => {
                format!("({key_placeholder} <= {})", value_placeholder(values, value)?)
            }
            Self::Between(lower, upper) => {
                let lower = value_placeholder(values, lower)?;
                let upper = value_placeholder(values, upper)?;
                format!("({key_placeholder} BETWEEN {lower} AND {upper})")
            }
            Self::NotIn(list) => {
                format!(
                    "NOT ({key_placeholder} IN ({}))",
                    value_placeholders(values, list)?
                )
            }
            Self::NotEqual(value) => {
                format!("({key_placeholder} <> {})", value_placeholder(values, value)?)
            }
            Self::Like(value) => {
                format!(
                    "(contains({key_placeholder},{}))",
                    value_placeholder(values, value)?
                )
            }
            Self::NotLike(value) => {
                format!(
                    "(NOT contains({key_placeholder},{}))",
                    value_placeholder(values, value)?
                )
            }
        };
        Ok(fragment)
    }
}

fn parse_values(
    name: &str,
    operator: &str,
    operand: serde_json::Value,
) -> Result<Vec<value::Value>> {
    let values: Vec<value::Value> = match operand {
        serde_json::Value::Array(items) => items.into_iter().map(value::Value::from).collect(),
        single => vec![single.into()],
    };
    if values.is_empty() {
        return Err(Error::invalid_filter(format!(
            "`{operator}` on `{name}` needs at least one value"
        )));
    }
    Ok(values)
}

/// Bind `value` to a placeholder named after its sanitized rendering.
///
/// Equal literals share one placeholder; different literals that sanitize to
/// the same token get a numeric suffix.
fn value_placeholder(
    values: &mut collections::HashMap<String, types::AttributeValue>,
    value: &value::Value,
) -> Result<String> {
    let attribute_value = value::to_attribute(&value.clone().normalize())?;
    let token = match value.token() {
        token if token.is_empty() => EMPTY_TOKEN.to_string(),
        token => token,
    };
    let mut placeholder = format!(":{token}");
    let mut suffix = 0;
    loop {
        match values.get(&placeholder) {
            None => {
                values.insert(placeholder.clone(), attribute_value);
                return Ok(placeholder);
            }
            Some(existing) if *existing == attribute_value => return Ok(placeholder),
            Some(_) => {
                suffix += 1;
                placeholder = format!(":{token}_{suffix}");
            }
        }
    }
}

fn value_placeholders(
    values: &mut collections::HashMap<String, types::AttributeValue>,
    list: &[value::Value],
) -> Result<String> {
    let mut placeholders = Vec::with_capacity(list.len());
    for value in list {
        placeholders.push(value_placeholder(values, value)?);
    }
    Ok(placeholders.join(","))
}

/// Condition applied to an attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyCondition {
    /// The condition to apply to the attribute.
    pub condition: Condition,
    /// The name of the attribute to apply the condition to.
    pub name: String,
}

impl KeyCondition {
    /// Equality condition on `name`.
    pub fn equals(name: impl Into<String>, value: impl Into<value::Value>) -> Self {
        Self {
            condition: Condition::Equals(value.into()),
            name: name.into(),
        }
    }

    /// Build a key-condition expression from equality conditions.
    pub(crate) fn get_expression_operation(keys: &[Self]) -> Result<common::ExpressionInput> {
        let mut expressions = Vec::with_capacity(keys.len());
        let mut expression_attribute_names = collections::HashMap::with_capacity(keys.len());
        let mut expression_attribute_values = collections::HashMap::new();
        for (index, key) in keys.iter().enumerate() {
            let Condition::Equals(value) = &key.condition else {
                return Err(Error::invalid_filter(format!(
                    "key condition on `{}` must be an equality",
                    key.name
                )));
            };
            let placeholder = common::add_placeholder(&key.name);
            let value_placeholder = format!(":key{index}");
            let value = value::to_attribute(&value.clone().normalize())?;
            expressions.push(format!("{placeholder} = {value_placeholder}"));
            expression_attribute_names.insert(placeholder, key.name.clone());
            expression_attribute_values.insert(value_placeholder, value);
        }
        let expression = expressions.join(&*LogicalOperator::And);
        let operation = common::ExpressionInput {
            expression,
            expression_attribute_names,
            expression_attribute_values,
        };
        Ok(operation)
    }
}

/// Where clause: flat attribute conditions or a boolean node.
///
/// ```rust
/// use dynamodb_connector::common::condition;
/// use serde_json::json;
///
/// let clause = condition::WhereClause::try_from(json!({"id": "abc"})).unwrap();
/// assert!(clause.is_flat());
/// assert!(clause.is_equality_only());
///
/// let clause = condition::WhereClause::try_from(json!({"or": [{"a": 1}, {"b": 2}]})).unwrap();
/// assert!(!clause.is_flat());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum WhereClause {
    /// Leaf conditions - combined with the enclosing operator (AND at the root).
    Leaves(Vec<KeyCondition>),
    /// Node conditions - children compiled with this node's operator.
    Node(LogicalOperator, Vec<WhereClause>),
}

impl WhereClause {
    /// Whether the clause has no boolean nodes.
    pub fn is_flat(&self) -> bool {
        matches!(self, Self::Leaves(_))
    }

    /// Whether the clause holds no conditions at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaves(leaves) => leaves.is_empty(),
            Self::Node(_, children) => children.iter().all(Self::is_empty),
        }
    }

    /// Whether every condition in the clause is a plain equality.
    pub fn is_equality_only(&self) -> bool {
        match self {
            Self::Leaves(leaves) => leaves.iter().all(|leaf| leaf.condition.is_equality()),
            Self::Node(_, children) => children.iter().all(Self::is_equality_only),
        }
    }

    /// Attribute names referenced by the clause, in order of appearance.
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_attribute_names(&mut names);
        names
    }

    fn collect_attribute_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Leaves(leaves) => {
                for leaf in leaves {
                    if !names.contains(&leaf.name.as_str()) {
                        names.push(&leaf.name);
                    }
                }
            }
            Self::Node(_, children) => {
                for child in children {
                    child.collect_attribute_names(names);
                }
            }
        }
    }

    /// Rewrite every literal of the clause with `rewrite(attribute, literal)`.
    pub fn map_literals(&mut self, rewrite: &mut impl FnMut(&str, value::Value) -> value::Value) {
        match self {
            Self::Leaves(leaves) => {
                for leaf in leaves {
                    for literal in leaf.condition.values_mut() {
                        let current = std::mem::replace(literal, value::Value::Null);
                        *literal = rewrite(&leaf.name, current);
                    }
                }
            }
            Self::Node(_, children) => {
                for child in children {
                    child.map_literals(rewrite);
                }
            }
        }
    }

    /// Children keep document order; adjacent attributes share one leaf group.
    fn parse_object(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut children: Vec<Self> = Vec::new();
        for (key, value) in map {
            let operator = match key.as_str() {
                "and" => Some(LogicalOperator::And),
                "or" => Some(LogicalOperator::Or),
                _ => None,
            };
            match operator {
                Some(operator) => {
                    let serde_json::Value::Array(items) = value else {
                        return Err(Error::invalid_filter(format!(
                            "`{key}` expects an array of where objects"
                        )));
                    };
                    let mut nested = Vec::with_capacity(items.len());
                    for item in items {
                        nested.push(Self::try_from(item)?);
                    }
                    children.push(Self::Node(operator, nested));
                }
                None => {
                    let conditions = Self::parse_attribute(key, value)?;
                    match children.last_mut() {
                        Some(Self::Leaves(leaves)) => leaves.extend(conditions),
                        _ => children.push(Self::Leaves(conditions)),
                    }
                }
            }
        }
        let clause = match children.len() {
            0 => Self::Leaves(Vec::new()),
            1 => children.remove(0),
            _ => Self::Node(LogicalOperator::And, children),
        };
        Ok(clause)
    }

    fn parse_attribute(name: String, value: serde_json::Value) -> Result<Vec<KeyCondition>> {
        let operators = match value {
            serde_json::Value::Object(operators) => operators,
            literal => {
                return Ok(vec![KeyCondition {
                    condition: Condition::Equals(literal.into()),
                    name,
                }]);
            }
        };
        if operators.is_empty() {
            return Err(Error::invalid_filter(format!(
                "empty condition on `{name}`"
            )));
        }
        let mut conditions = Vec::with_capacity(operators.len());
        for (operator, operand) in operators {
            let condition = Condition::parse(&name, &operator, operand)?;
            conditions.push(KeyCondition {
                condition,
                name: name.clone(),
            });
        }
        Ok(conditions)
    }
}

impl TryFrom<serde_json::Value> for WhereClause {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Self::parse_object(map),
            other => Err(Error::invalid_filter(format!(
                "where clause must be an object, got `{other}`"
            ))),
        }
    }
}

/// Accumulates tagged filter fragments while walking a where clause.
///
/// Each fragment after the first is prefixed with the operator it was compiled
/// under; boolean nodes do not introduce precedence groups.
#[derive(Debug, Default)]
pub(crate) struct FilterExpressionBuilder {
    operation: common::ExpressionInput,
}

impl FilterExpressionBuilder {
    pub(crate) fn push_clause(
        &mut self,
        clause: &WhereClause,
        operator: LogicalOperator,
    ) -> Result<()> {
        match clause {
            WhereClause::Leaves(leaves) => {
                for leaf in leaves {
                    let key_placeholder = common::add_placeholder(&leaf.name);
                    let fragment = leaf.condition.get_filter_fragment(
                        &key_placeholder,
                        &mut self.operation.expression_attribute_values,
                    )?;
                    self.operation
                        .expression_attribute_names
                        .insert(key_placeholder, leaf.name.clone());
                    let expression = std::mem::take(&mut self.operation.expression);
                    self.operation.expression =
                        common::get_expression(expression, &operator, fragment);
                }
            }
            WhereClause::Node(node_operator, children) => {
                for child in children {
                    self.push_clause(child, *node_operator)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn build(self) -> common::ExpressionInput {
        self.operation
    }
}

impl TryFrom<&WhereClause> for common::ExpressionInput {
    type Error = Error;

    fn try_from(clause: &WhereClause) -> Result<Self> {
        let mut builder = FilterExpressionBuilder::default();
        builder.push_clause(clause, LogicalOperator::And)?;
        Ok(builder.build())
    }
}
