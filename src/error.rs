//! Error types for filter compilation, execution and update planning.

use thiserror::Error;

/// Errors surfaced by the connector.
///
/// Compile-time variants (`SchemaNotFound`, `UnsupportedOperator`, `InvalidFilter`,
/// `MissingIdentity`) are raised before any store request is issued. Store
/// variants are returned by the transport and passed through unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// The entity type is not registered with the schema provider.
    #[error("schema not found for entity `{0}`")]
    SchemaNotFound(String),

    /// Entity settings could not be turned into schema metadata.
    #[error("invalid schema for entity `{entity}`: {reason}")]
    InvalidSchema {
        /// The entity type.
        entity: String,
        /// Why the settings were rejected.
        reason: String,
    },

    /// A condition uses an operator outside the supported set.
    #[error("unsupported operator `{operator}` on attribute `{attribute}`")]
    UnsupportedOperator {
        /// The attribute the condition was attached to.
        attribute: String,
        /// The rejected operator key.
        operator: String,
    },

    /// A record cannot be addressed because a primary-key value is missing.
    #[error("missing primary key attribute `{attribute}` for entity `{entity}`")]
    MissingIdentity {
        /// The entity type.
        entity: String,
        /// The primary-key attribute without a value.
        attribute: String,
    },

    /// No record matches the key used to fetch an update baseline.
    #[error("unable to find `{entity}` record for update")]
    RecordNotFound {
        /// The entity type.
        entity: String,
    },

    /// The filter document is malformed.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A value could not be converted into a DynamoDB attribute value.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_dynamo::Error),

    /// The store could not be reached or returned no usable response.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store rejected the request because of throughput limits.
    #[error("throttled: {0}")]
    Throttling(String),

    /// The transport gave up waiting for the store.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Any other store-side failure.
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    pub(crate) fn unsupported(attribute: impl Into<String>, operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            attribute: attribute.into(),
            operator: operator.into(),
        }
    }

    pub(crate) fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Whether the error was produced before any store request was issued.
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            Self::SchemaNotFound(_)
                | Self::InvalidSchema { .. }
                | Self::UnsupportedOperator { .. }
                | Self::MissingIdentity { .. }
                | Self::InvalidFilter(_)
                | Self::Serialization(_)
        )
    }
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, Error>;
