//! Entity-level operations composed from the compiler, the aggregator and the
//! reconciler.

use crate::{
    common::{condition, key, value},
    error::{Error, Result},
    read::{filter, paginate, plan},
    schema,
    store::{StoreTransport, dynamodb},
    write::{batch, update},
};

use serde::Deserialize;

/// Default number of store requests a batch operation keeps in flight.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

/// Connector settings.
///
/// ```rust
/// use dynamodb_connector::connector;
/// use serde_json::json;
///
/// let config: connector::ConnectorConfig = serde_json::from_value(json!({
///     "region": "eu-west-1",
///     "timeoutMs": 2000,
/// }))
/// .unwrap();
/// assert_eq!(config.batch_concurrency, connector::DEFAULT_BATCH_CONCURRENCY);
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    /// AWS region override.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override, e.g. a local DynamoDB.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-operation timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Store requests a batch operation keeps in flight.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            timeout_ms: None,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl From<&ConnectorConfig> for dynamodb::TransportConfig {
    fn from(config: &ConnectorConfig) -> Self {
        Self {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            timeout_ms: config.timeout_ms,
        }
    }
}

/// Reads and writes entity records through a [`StoreTransport`].
///
/// ```rust,no_run
/// use dynamodb_connector::{connector, read::filter, schema};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = schema::SchemaRegistry::from_settings(json!({"Post": {}}))?;
/// let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
/// let connector = connector::Connector::with_sdk_config(
///     registry,
///     &sdk_config,
///     connector::ConnectorConfig::default(),
/// );
/// let filter = filter::Filter::try_from(json!({"where": {"views": {"gt": 100}}, "limit": 10}))?;
/// let popular = connector.all("Post", &filter).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Connector<P, T> {
    catalog: schema::IndexCatalog<P>,
    transport: T,
    config: ConnectorConfig,
}

impl<P: schema::SchemaProvider> Connector<P, dynamodb::DynamoDbTransport> {
    /// Connector over a DynamoDB client built from `sdk_config`.
    pub fn with_sdk_config(
        provider: P,
        sdk_config: &aws_config::SdkConfig,
        config: ConnectorConfig,
    ) -> Self {
        let transport = dynamodb::DynamoDbTransport::new(sdk_config, (&config).into());
        Self::new(provider, transport, config)
    }
}

impl<P: schema::SchemaProvider, T: StoreTransport> Connector<P, T> {
    /// Connector over an arbitrary transport.
    pub fn new(provider: P, transport: T, config: ConnectorConfig) -> Self {
        Self {
            catalog: schema::IndexCatalog::new(provider),
            transport,
            config,
        }
    }

    /// The index catalog.
    pub fn catalog(&self) -> &schema::IndexCatalog<P> {
        &self.catalog
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Compile `filter` without touching the store.
    pub fn compile(&self, entity: &str, filter: &filter::Filter) -> Result<plan::QueryPlan> {
        plan::compile(&self.catalog, entity, filter)
    }

    /// Records of `entity` matching `filter`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_connector.all", skip(self, filter), err)
    )]
    pub async fn all(&self, entity: &str, filter: &filter::Filter) -> Result<Vec<value::Record>> {
        let plan = self.compile(entity, filter)?;
        let items = paginate::execute(&self.transport, &plan, filter.limit, filter.skip).await?;
        Ok(items.into_iter().map(value::from_item).collect())
    }

    /// Records of `entity` matching a JSON filter document.
    ///
    /// The document is parsed and compiled before any store request, so a
    /// malformed filter or an unsupported operator never reaches the store.
    pub async fn all_json(
        &self,
        entity: &str,
        filter: serde_json::Value,
    ) -> Result<Vec<value::Record>> {
        let filter = filter::Filter::try_from(filter)?;
        self.all(entity, &filter).await
    }

    /// Number of records of `entity` matching `where_clause`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_connector.count", skip(self, where_clause), err)
    )]
    pub async fn count(
        &self,
        entity: &str,
        where_clause: Option<condition::WhereClause>,
    ) -> Result<usize> {
        let filter = filter::Filter {
            where_clause,
            ..Default::default()
        };
        let plan = self.compile(entity, &filter)?;
        Ok(paginate::execute(&self.transport, &plan, None, 0).await?.len())
    }

    async fn fetch_baseline(&self, entity: &str, keys: &key::Keys) -> Result<value::Record> {
        let leaves = keys
            .values
            .iter()
            .map(|(name, value)| condition::KeyCondition::equals(name.clone(), value.clone()))
            .collect();
        let filter = filter::Filter {
            where_clause: Some(condition::WhereClause::Leaves(leaves)),
            limit: Some(1),
            ..Default::default()
        };
        let plan = self.compile(entity, &filter)?;
        paginate::execute(&self.transport, &plan, filter.limit, 0)
            .await?
            .into_iter()
            .next()
            .map(value::from_item)
            .ok_or_else(|| Error::RecordNotFound {
                entity: entity.to_string(),
            })
    }

    /// Apply `data` to the record of `entity` addressed by the keys in `record`.
    ///
    /// `record` doubles as the baseline when it carries more than the keys;
    /// pass `fetch_baseline = true` to diff against the stored record instead.
    /// Returns the applied plan; an empty plan issues no store request.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_connector.update_attributes",
            skip(self, record, data),
            err
        )
    )]
    pub async fn update_attributes(
        &self,
        entity: &str,
        record: &value::Record,
        data: value::Record,
        fetch_baseline: bool,
    ) -> Result<update::MutationPlan> {
        let key_specs = self.catalog.resolve_primary_key(entity)?;
        let keys = key::Keys::from_record(&key_specs, record).map_err(|attribute| {
            Error::MissingIdentity {
                entity: entity.to_string(),
                attribute,
            }
        })?;
        let plan = if fetch_baseline {
            let baseline = self.fetch_baseline(entity, &keys).await?;
            update::reconcile(&self.catalog, entity, &baseline, data)?
        } else {
            update::reconcile(&self.catalog, entity, record, data)?
        };
        if !plan.is_empty() {
            self.transport.point_update(entity, &plan).await?;
        }
        Ok(plan)
    }

    /// Apply `data` to every record of `entity` matching `where_clause`.
    ///
    /// Plans for all matches are built before the first update is issued.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_connector.update_all",
            skip(self, where_clause, data),
            err
        )
    )]
    pub async fn update_all(
        &self,
        entity: &str,
        where_clause: Option<condition::WhereClause>,
        data: value::Record,
    ) -> Result<batch::BatchReport> {
        let filter = filter::Filter {
            where_clause,
            ..Default::default()
        };
        let records = self.all(entity, &filter).await?;
        let mut plans = Vec::with_capacity(records.len());
        for record in &records {
            plans.push(update::reconcile(&self.catalog, entity, record, data.clone())?);
        }
        let report =
            batch::update_records(&self.transport, entity, plans, self.config.batch_concurrency)
                .await;
        Ok(report)
    }

    /// Delete every record of `entity` matching `where_clause`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_connector.destroy_all",
            skip(self, where_clause),
            err
        )
    )]
    pub async fn destroy_all(
        &self,
        entity: &str,
        where_clause: Option<condition::WhereClause>,
    ) -> Result<batch::BatchReport> {
        let key_specs = self.catalog.resolve_primary_key(entity)?;
        let filter = filter::Filter {
            where_clause,
            ..Default::default()
        };
        let records = self.all(entity, &filter).await?;
        let mut keys = Vec::with_capacity(records.len());
        for record in &records {
            let record_keys = key::Keys::from_record(&key_specs, record).map_err(|attribute| {
                Error::MissingIdentity {
                    entity: entity.to_string(),
                    attribute,
                }
            })?;
            keys.push(record_keys);
        }
        let report =
            batch::delete_records(&self.transport, entity, keys, self.config.batch_concurrency)
                .await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::stub;
    use serde_json::json;

    fn registry() -> schema::SchemaRegistry {
        schema::SchemaRegistry::from_settings(json!({"Post": {}})).unwrap()
    }

    fn posts() -> Vec<crate::common::Item> {
        vec![
            stub::item(json!({"id": "1", "title": "T", "content": "old"})),
            stub::item(json!({"id": "2", "title": "U", "content": "old"})),
            stub::item(json!({"id": "3", "title": "V"})),
        ]
    }

    fn connector(
        transport: stub::StubTransport,
    ) -> Connector<schema::SchemaRegistry, stub::StubTransport> {
        Connector::new(registry(), transport, ConnectorConfig::default())
    }

    #[tokio::test]
    async fn test_unsupported_operator_issues_no_request() {
        let connector = connector(stub::StubTransport::new(posts(), 10));
        let result = connector
            .all_json("Post", json!({"where": {"loc": {"near": "1,2"}}}))
            .await;
        assert!(matches!(
            result,
            Err(Error::UnsupportedOperator { attribute, operator })
                if attribute == "loc" && operator == "near"
        ));
        assert_eq!(connector.transport().calls(), 0);
    }

    #[rstest::rstest]
    #[case::unknown_entity("Missing", json!({}))]
    #[case::bad_filter("Post", json!({"where": {"title": {}}}))]
    #[case::bad_window("Post", json!({"limit": -3}))]
    #[tokio::test]
    async fn test_compile_errors_issue_no_request(
        #[case] entity: &str,
        #[case] filter: serde_json::Value,
    ) {
        let connector = connector(stub::StubTransport::new(posts(), 10));
        let err = connector.all_json(entity, filter).await.unwrap_err();
        assert!(err.is_compile_time());
        assert_eq!(connector.transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_all_uses_window() {
        let connector = connector(stub::StubTransport::new(posts(), 1));
        let filter = filter::Filter::try_from(json!({"limit": 1, "skip": 1})).unwrap();
        let records = connector.all("Post", &filter).await.unwrap();
        assert_eq!(
            records,
            vec![value::record_from_json(json!({"id": "2", "title": "U", "content": "old"}))]
        );
        assert_eq!(connector.transport().calls(), 2);
    }

    #[tokio::test]
    async fn test_count() {
        let connector = connector(stub::StubTransport::new(posts(), 2));
        assert_eq!(connector.count("Post", None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_attributes_against_given_record() {
        let connector = connector(stub::StubTransport::new(Vec::new(), 10));
        let record = value::record_from_json(json!({"id": "1", "title": "T", "content": "old"}));
        let mut data = value::record_from_json(json!({"content": "new"}));
        data.insert("comments".to_string(), value::Value::Undefined);
        let plan = connector
            .update_attributes("Post", &record, data, false)
            .await
            .unwrap();
        assert_eq!(
            plan.mutations.keys().collect::<Vec<_>>(),
            vec!["content"]
        );
        let updates = connector.transport().updates.lock().unwrap().clone();
        assert_eq!(updates, vec![("Post".to_string(), plan)]);
    }

    #[tokio::test]
    async fn test_update_attributes_fetches_baseline() {
        let connector = connector(stub::StubTransport::new(posts(), 10));
        let key = value::record_from_json(json!({"id": "1"}));
        let data = value::record_from_json(json!({"content": null, "title": "New"}));
        let plan = connector
            .update_attributes("Post", &key, data, true)
            .await
            .unwrap();
        assert_eq!(
            plan.mutations,
            indexmap::IndexMap::from([
                ("content".to_string(), update::Mutation::Remove),
                ("title".to_string(), update::Mutation::Put("New".into())),
            ])
        );
        let reads = connector.transport().reads();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].mode, plan::Mode::Query);
    }

    #[rstest::rstest]
    #[case::missing_record(json!({"id": "9"}), true)]
    #[case::missing_key(json!({"title": "T"}), false)]
    #[tokio::test]
    async fn test_update_attributes_errors(
        #[case] record: serde_json::Value,
        #[case] fetch_baseline: bool,
    ) {
        let connector = connector(stub::StubTransport::new(posts(), 10));
        let result = connector
            .update_attributes(
                "Post",
                &value::record_from_json(record),
                value::record_from_json(json!({"title": "X"})),
                fetch_baseline,
            )
            .await;
        match result {
            Err(Error::RecordNotFound { .. }) => assert!(fetch_baseline),
            Err(Error::MissingIdentity { attribute, .. }) => assert_eq!(attribute, "id"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(connector.transport().updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_update_skips_store() {
        let connector = connector(stub::StubTransport::new(Vec::new(), 10));
        let record = value::record_from_json(json!({"id": "1", "title": "T"}));
        let data = value::record_from_json(json!({"id": "1", "missing": null}));
        let plan = connector
            .update_attributes("Post", &record, data, false)
            .await
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(connector.transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_update_all() {
        let connector = connector(stub::StubTransport::new(posts(), 2));
        let where_clause =
            condition::WhereClause::try_from(json!({"content": "old"})).unwrap();
        let report = connector
            .update_all(
                "Post",
                Some(where_clause),
                value::record_from_json(json!({"content": "new"})),
            )
            .await
            .unwrap();
        // the stub does not evaluate filters, so every record is updated
        assert_eq!(report.len(), 3);
        assert!(report.is_complete());
        assert_eq!(connector.transport().updates.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_destroy_all() {
        let connector = connector(
            stub::StubTransport::new(posts(), 2).failing(vec![stub::item(json!({"id": "2"}))]),
        );
        let report = connector.destroy_all("Post", None).await.unwrap();
        assert_eq!(report.succeeded().count(), 2);
        let failed: Vec<_> = report.failed().map(|(keys, _)| keys.to_record()).collect();
        assert_eq!(failed, vec![value::record_from_json(json!({"id": "2"}))]);
        assert_eq!(connector.transport().deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let connector = connector(stub::StubTransport::new(posts(), 2).unavailable());
        assert!(matches!(
            connector.all("Post", &filter::Filter::default()).await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config: ConnectorConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, ConnectorConfig::default());
        let transport_config: dynamodb::TransportConfig = (&ConnectorConfig {
            endpoint: Some("http://localhost:8000".to_string()),
            ..Default::default()
        })
            .into();
        assert_eq!(transport_config.endpoint.as_deref(), Some("http://localhost:8000"));
    }
}
