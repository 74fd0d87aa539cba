//! Common utilities shared by the read and write paths.
//!
//! This module provides the value model, key handling, where-clause conditions
//! and attribute selection, plus the expression fragments they compile into.

/// Where-clause conditions and filter-expression synthesis.
pub mod condition;

/// Key declarations and primary-key addressing.
pub mod key;

/// Attribute selection for projection expressions.
pub mod selection;

/// Attribute values, records and normalization.
pub mod value;

use aws_sdk_dynamodb::types;
use std::collections;

/// A store item: attribute name to DynamoDB attribute value.
pub type Item = collections::HashMap<String, types::AttributeValue>;

pub(crate) fn add_placeholder(identifier: &str) -> String {
    format!("#{identifier}")
}

fn get_expression(left: String, operator: &str, right: String) -> String {
    if left.is_empty() {
        right
    } else if right.is_empty() {
        left
    } else {
        format!("{left}{operator}{right}")
    }
}

/// expression operation
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ExpressionInput {
    pub(crate) expression: String,
    pub(crate) expression_attribute_names: collections::HashMap<String, String>,
    pub(crate) expression_attribute_values: collections::HashMap<String, types::AttributeValue>,
}

impl ExpressionInput {
    pub(crate) fn merge(operator: &str, items: Vec<Self>) -> Self {
        let mut operation = Self::default();
        for item in items {
            operation
                .expression_attribute_names
                .extend(item.expression_attribute_names);
            operation
                .expression_attribute_values
                .extend(item.expression_attribute_values);
            operation.expression = get_expression(operation.expression, operator, item.expression);
        }
        operation
    }

    pub(crate) fn merge_into(
        self,
        names: &mut collections::HashMap<String, String>,
        values: &mut collections::HashMap<String, types::AttributeValue>,
    ) -> String {
        names.extend(self.expression_attribute_names);
        values.extend(self.expression_attribute_values);
        self.expression
    }
}
