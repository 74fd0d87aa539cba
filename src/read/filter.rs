use crate::{
    common::{condition, selection},
    error::{Error, Result},
};

use std::str;

/// Sort direction requested by a filter's `order` entry.
///
/// ```rust
/// use dynamodb_connector::read::filter;
///
/// let order: filter::Order = "createdAt DESC".parse().unwrap();
/// assert_eq!(order.attribute, "createdAt");
/// assert!(!order.ascending);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Order {
    /// The attribute to sort on.
    pub attribute: String,
    /// `true` for `ASC` (the default), `false` for `DESC`.
    pub ascending: bool,
}

impl str::FromStr for Order {
    type Err = Error;

    fn from_str(order: &str) -> Result<Self> {
        let mut parts = order.split_whitespace();
        let Some(attribute) = parts.next() else {
            return Err(Error::invalid_filter("empty order"));
        };
        let ascending = match parts.next() {
            None => true,
            Some(direction) if direction.eq_ignore_ascii_case("asc") => true,
            Some(direction) if direction.eq_ignore_ascii_case("desc") => false,
            Some(direction) => {
                return Err(Error::invalid_filter(format!(
                    "unknown order direction `{direction}`"
                )));
            }
        };
        if parts.next().is_some() {
            return Err(Error::invalid_filter(format!("malformed order `{order}`")));
        }
        Ok(Self {
            attribute: attribute.to_string(),
            ascending,
        })
    }
}

/// Find request: where clause, projection, order and window.
///
/// ```rust
/// use dynamodb_connector::read::filter;
/// use serde_json::json;
///
/// let filter = filter::Filter::try_from(json!({
///     "where": {"age": {"gt": 30}},
///     "fields": ["id", "age"],
///     "limit": 10,
///     "skip": 5,
/// }))
/// .unwrap();
/// assert_eq!(filter.limit, Some(10));
/// assert_eq!(filter.skip, 5);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    /// Conditions records must satisfy. `None` matches everything.
    pub where_clause: Option<condition::WhereClause>,
    /// Attributes to fetch. `None` fetches all attributes.
    pub fields: Option<selection::Fields>,
    /// Requested sort order; honored by indexed queries only.
    pub order: Option<Order>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Number of matching records to skip.
    pub skip: usize,
}

impl Filter {
    /// Filter with only a where clause.
    pub fn with_where(where_clause: condition::WhereClause) -> Self {
        Self {
            where_clause: Some(where_clause),
            ..Default::default()
        }
    }
}

fn parse_count(name: &str, value: serde_json::Value) -> Result<usize> {
    match value {
        serde_json::Value::Null => Ok(0),
        serde_json::Value::Number(number) => number
            .as_u64()
            .and_then(|count| usize::try_from(count).ok())
            .ok_or_else(|| Error::invalid_filter(format!("`{name}` must be a positive integer"))),
        serde_json::Value::String(count) => count
            .trim()
            .parse()
            .map_err(|_| Error::invalid_filter(format!("`{name}` must be a positive integer"))),
        other => Err(Error::invalid_filter(format!(
            "`{name}` must be a positive integer, got `{other}`"
        ))),
    }
}

fn parse_order(value: serde_json::Value) -> Result<Option<Order>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(order) => order.parse().map(Some),
        serde_json::Value::Array(orders) => match orders.into_iter().next() {
            Some(first) => parse_order(first),
            None => Ok(None),
        },
        other => Err(Error::invalid_filter(format!(
            "order must be a string, got `{other}`"
        ))),
    }
}

impl TryFrom<serde_json::Value> for Filter {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        let map = match value {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => return Ok(Self::default()),
            other => {
                return Err(Error::invalid_filter(format!(
                    "filter must be an object, got `{other}`"
                )));
            }
        };
        let mut filter = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "where" if !value.is_null() => {
                    filter.where_clause = Some(value.try_into()?);
                }
                "fields" if !value.is_null() => filter.fields = Some(value.try_into()?),
                "order" => filter.order = parse_order(value)?,
                "limit" => {
                    // zero means unlimited
                    filter.limit = Some(parse_count(&key, value)?).filter(|limit| *limit > 0);
                }
                "skip" | "offset" => filter.skip = parse_count(&key, value)?,
                _ => {}
            }
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::bare("title", "title", true)]
    #[case::asc("title ASC", "title", true)]
    #[case::desc_lowercase("title desc", "title", false)]
    #[case::extra_spaces("  title   DESC ", "title", false)]
    fn test_order(#[case] order: &str, #[case] attribute: &str, #[case] ascending: bool) {
        let order: Order = order.parse().unwrap();
        assert_eq!(order.attribute, attribute);
        assert_eq!(order.ascending, ascending);
    }

    #[rstest]
    #[case::empty("")]
    #[case::bad_direction("title UP")]
    #[case::trailing("title ASC x")]
    fn test_invalid_order(#[case] order: &str) {
        assert!(matches!(order.parse::<Order>(), Err(Error::InvalidFilter(_))));
    }

    #[test]
    fn test_full_filter() {
        let filter = Filter::try_from(json!({
            "where": {"id": "abc"},
            "fields": {"id": true, "title": true},
            "order": ["title DESC", "id ASC"],
            "limit": 2,
            "offset": 1,
            "include": "comments",
        }))
        .unwrap();
        assert_eq!(
            filter.where_clause,
            Some(condition::WhereClause::Leaves(vec![
                condition::KeyCondition::equals("id", "abc"),
            ]))
        );
        assert_eq!(filter.fields.unwrap().names(), vec!["id", "title"]);
        assert_eq!(
            filter.order,
            Some(Order {
                attribute: "title".to_string(),
                ascending: false,
            })
        );
        assert_eq!(filter.limit, Some(2));
        assert_eq!(filter.skip, 1);
    }

    #[rstest]
    #[case::null(json!(null), None, 0)]
    #[case::zero_limit(json!({"limit": 0}), None, 0)]
    #[case::string_counts(json!({"limit": "3", "skip": "4"}), Some(3), 4)]
    #[case::null_where(json!({"where": null}), None, 0)]
    fn test_window(
        #[case] filter: serde_json::Value,
        #[case] limit: Option<usize>,
        #[case] skip: usize,
    ) {
        let filter = Filter::try_from(filter).unwrap();
        assert_eq!(filter.limit, limit);
        assert_eq!(filter.skip, skip);
        assert_eq!(filter.where_clause, None);
    }

    #[rstest]
    #[case::negative_limit(json!({"limit": -1}))]
    #[case::fractional_skip(json!({"skip": 1.5}))]
    #[case::not_an_object(json!([1]))]
    #[case::bad_where(json!({"where": "id"}))]
    fn test_invalid_filter(#[case] filter: serde_json::Value) {
        assert!(matches!(
            Filter::try_from(filter),
            Err(Error::InvalidFilter(_))
        ));
    }
}
