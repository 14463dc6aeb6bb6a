use oxmetric_cloud::error::CollectorError;

/// Errors surfaced to the host before or while starting a collection run.
///
/// # Examples
///
/// ```rust
/// use oxmetric_plugin::error::PluginError;
///
/// let err = PluginError::InvalidApiKey { reason: "expired".to_string() };
/// assert!(err.to_string().contains("expired"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// `secret_data` carries no `api_key`.
    #[error("api_key not found in secret data")]
    ApiKeyNotFound,

    /// Endpoints could not be resolved with the given api key.
    #[error("invalid api_key: {reason}")]
    InvalidApiKey { reason: String },

    /// Request parameters are malformed.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Collector(#[from] CollectorError),
}

pub type Result<T> = std::result::Result<T, PluginError>;
