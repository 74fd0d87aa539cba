use crate::{
    common::{self, condition},
    error::{Error, Result},
    read::plan,
    store::{ContinuationToken, ResultPage, StoreTransport},
    write::update,
};

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    config::{self, timeout::TimeoutConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types,
};
use std::{collections, fmt, time::Duration};

/// Service error codes that signal exhausted throughput.
const THROTTLING_CODES: [&str; 3] = [
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
];

/// Service error codes that signal a store-side outage.
const UNAVAILABLE_CODES: [&str; 2] = ["InternalServerError", "ServiceUnavailable"];

/// Client overrides applied on top of the shared SDK configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TransportConfig {
    /// AWS region; the SDK default is used when unset.
    pub region: Option<String>,
    /// Endpoint override, e.g. a local DynamoDB.
    pub endpoint: Option<String>,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// [`StoreTransport`] backed by the AWS DynamoDB client.
#[derive(Clone)]
pub struct DynamoDbTransport {
    client: Client,
}

impl fmt::Debug for DynamoDbTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoDbTransport").finish_non_exhaustive()
    }
}

impl DynamoDbTransport {
    /// Build a client from `sdk_config` with the overrides of `config`.
    ///
    /// ```rust,no_run
    /// use dynamodb_connector::store::dynamodb;
    ///
    /// # async fn example() {
    /// let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    /// let transport = dynamodb::DynamoDbTransport::new(
    ///     &sdk_config,
    ///     dynamodb::TransportConfig {
    ///         endpoint: Some("http://localhost:8000".to_string()),
    ///         ..Default::default()
    ///     },
    /// );
    /// # }
    /// ```
    pub fn new(sdk_config: &aws_config::SdkConfig, config: TransportConfig) -> Self {
        let mut builder = config::Builder::from(sdk_config);
        if let Some(region) = config.region {
            builder = builder.region(config::Region::new(region));
        }
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }
        Self::from_client(Client::from_conf(builder.build()))
    }

    /// Wrap a pre-built client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn non_empty<K, V>(map: collections::HashMap<K, V>) -> Option<collections::HashMap<K, V>> {
    (!map.is_empty()).then_some(map)
}

/// Map an SDK failure onto the connector's store errors.
fn map_sdk_error<E, R>(err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) => Error::Timeout(message),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            Error::StoreUnavailable(message)
        }
        SdkError::ServiceError(service) => match service.err().code() {
            Some(code) if THROTTLING_CODES.contains(&code) => Error::Throttling(message),
            Some(code) if UNAVAILABLE_CODES.contains(&code) => Error::StoreUnavailable(message),
            _ => Error::Store(message),
        },
        _ => Error::Store(message),
    }
}

macro_rules! apply_read_plan {
    ($builder:expr, $plan:expr, $names:expr, $values:expr, $start:expr) => {
        $builder
            .set_exclusive_start_key($start)
            .set_expression_attribute_names(non_empty($names))
            .set_expression_attribute_values(non_empty($values))
            .set_filter_expression($plan.filter_expression.clone())
            .set_projection_expression($plan.projection_expression.clone())
            .select($plan.select.clone())
            .table_name(&$plan.table_name)
    };
}

fn delete_requests(keys: Vec<common::Item>) -> Result<Vec<types::WriteRequest>> {
    let mut requests = Vec::with_capacity(keys.len());
    for key in keys {
        let delete_request = types::DeleteRequest::builder()
            .set_key(Some(key))
            .build()
            .map_err(|err| Error::Store(err.to_string()))?;
        requests.push(
            types::WriteRequest::builder()
                .delete_request(delete_request)
                .build(),
        );
    }
    Ok(requests)
}

#[async_trait]
impl StoreTransport for DynamoDbTransport {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_connector.query",
            skip(self, plan, start),
            fields(table = %plan.table_name),
            err
        )
    )]
    async fn indexed_query(
        &self,
        plan: &plan::QueryPlan,
        start: Option<ContinuationToken>,
    ) -> Result<ResultPage> {
        let mut names = plan.expression_attribute_names.clone();
        let mut values = plan.expression_attribute_values.clone();
        let key_condition_expression =
            condition::KeyCondition::get_expression_operation(&plan.key_conditions)?
                .merge_into(&mut names, &mut values);
        let builder = self
            .client
            .query()
            .key_condition_expression(key_condition_expression)
            .set_scan_index_forward(plan.scan_index_forward);
        let output = apply_read_plan!(builder, plan, names, values, start)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(ResultPage {
            items: output.items.unwrap_or_default(),
            continuation_token: output.last_evaluated_key,
        })
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_connector.scan",
            skip(self, plan, start),
            fields(table = %plan.table_name),
            err
        )
    )]
    async fn full_scan(
        &self,
        plan: &plan::QueryPlan,
        start: Option<ContinuationToken>,
    ) -> Result<ResultPage> {
        let names = plan.expression_attribute_names.clone();
        let values = plan.expression_attribute_values.clone();
        let builder = self.client.scan();
        let output = apply_read_plan!(builder, plan, names, values, start)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(ResultPage {
            items: output.items.unwrap_or_default(),
            continuation_token: output.last_evaluated_key,
        })
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_connector.update_item",
            skip(self, mutations),
            err
        )
    )]
    async fn point_update(
        &self,
        table_name: &str,
        mutations: &update::MutationPlan,
    ) -> Result<()> {
        let key: common::Item = (&mutations.keys).try_into()?;
        let operation: common::ExpressionInput = mutations.try_into()?;
        self.client
            .update_item()
            .table_name(table_name)
            .set_key(Some(key))
            .update_expression(operation.expression)
            .set_expression_attribute_names(non_empty(operation.expression_attribute_names))
            .set_expression_attribute_values(non_empty(operation.expression_attribute_values))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_connector.batch_write_item",
            skip(self, keys),
            fields(count = keys.len()),
            err
        )
    )]
    async fn batch_delete(
        &self,
        table_name: &str,
        keys: Vec<common::Item>,
    ) -> Result<Vec<common::Item>> {
        let requests = delete_requests(keys)?;
        let output = self
            .client
            .batch_write_item()
            .request_items(table_name, requests)
            .send()
            .await
            .map_err(map_sdk_error)?;
        let unprocessed = output
            .unprocessed_items
            .and_then(|mut tables| tables.remove(table_name))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|request| request.delete_request.map(|delete| delete.key))
            .collect();
        Ok(unprocessed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_dynamodb::operation::query::QueryError;
    use rstest::rstest;

    #[test]
    fn test_timeout_maps_to_timeout() {
        let err: SdkError<QueryError, ()> = SdkError::timeout_error("operation timed out");
        assert!(matches!(map_sdk_error(err), Error::Timeout(_)));
    }

    #[test]
    fn test_construction_failure_maps_to_store() {
        let err: SdkError<QueryError, ()> = SdkError::construction_failure("bad request");
        assert!(matches!(map_sdk_error(err), Error::Store(_)));
    }

    #[rstest]
    #[case::empty(collections::HashMap::new(), None)]
    #[case::filled(
        collections::HashMap::from([("#a".to_string(), "a".to_string())]),
        Some(collections::HashMap::from([("#a".to_string(), "a".to_string())]))
    )]
    fn test_non_empty(
        #[case] map: collections::HashMap<String, String>,
        #[case] expected: Option<collections::HashMap<String, String>>,
    ) {
        assert_eq!(non_empty(map), expected);
    }

    #[test]
    fn test_delete_requests() {
        let key = common::Item::from([(
            "id".to_string(),
            types::AttributeValue::S("1".to_string()),
        )]);
        let requests = delete_requests(vec![key.clone()]).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].delete_request.as_ref().map(|delete| &delete.key),
            Some(&key)
        );
        assert!(requests[0].put_request.is_none());
    }
}
