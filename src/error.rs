use std::time::Duration;
use thiserror::Error;

/// Failures raised while talking to the cluster.
///
/// Only `ClusterUnreachable` aborts a scan. The per-call variants are absorbed
/// into a [`LogSample`](crate::types::LogSample) outcome or an omitted
/// snapshot section.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScanError {
    #[error("cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("timed out after {}s", .0.as_secs_f64())]
    PerCallTimeout(Duration),

    #[error("{0}")]
    PerCallError(String),
}

impl ScanError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScanError::PerCallTimeout(_))
    }
}

/// Problems setting up an [`AlertDispatcher`](crate::dispatcher::AlertDispatcher).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid webhook url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScanError::ClusterUnreachable("connection refused".to_string());
        assert_eq!(err.to_string(), "cluster unreachable: connection refused");

        let err = ScanError::PerCallTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "timed out after 10s");
        assert!(err.is_timeout());
    }
}
