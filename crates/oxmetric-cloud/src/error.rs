/// Errors raised by the collection pipeline itself, as opposed to errors
/// coming back from a collaborator.
///
/// # Examples
///
/// ```rust
/// use oxmetric_cloud::error::CollectorError;
///
/// let err = CollectorError::UnsupportedProvider("openstack".to_string());
/// assert!(err.to_string().contains("openstack"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// A provider backend failed while checking availability or fetching metrics.
    #[error("{provider} metric backend error: {message}")]
    Backend { provider: String, message: String },

    /// The provider name is not one the collector can dispatch to.
    #[error("Unsupported cloud provider: {0}")]
    UnsupportedProvider(String),

    /// Collector configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization or deserialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, CollectorError>;
