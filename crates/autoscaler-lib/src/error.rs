//! Error types shared by the autoscaler collaborators

use thiserror::Error;

/// Errors raised while talking to the workload runtime or the metrics store
#[derive(Debug, Error)]
pub enum ScalerError {
    /// Transport-level failure reaching the metrics store
    #[error("metrics store request for `{query}` failed: {source}")]
    StoreRequest {
        query: String,
        #[source]
        source: reqwest::Error,
    },

    /// The metrics store answered with a non-success HTTP status
    #[error("metrics store returned status {status} for `{query}`: {body}")]
    StoreStatus {
        query: String,
        status: u16,
        body: String,
    },

    /// The metrics store accepted the request but reported a failed query
    #[error("metrics store query `{query}` failed with status `{status}`")]
    QueryFailed { query: String, status: String },

    /// A response body could not be decoded
    #[error("malformed response from {source_name}: {message}")]
    MalformedResponse {
        source_name: &'static str,
        message: String,
    },

    /// A workload runtime call failed
    #[error("workload runtime `{operation}` on `{target}` failed: {message}")]
    Runtime {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// The workload cannot have its replica count set
    #[error("workload `{0}` is not in replicated mode")]
    NotReplicated(String),

    /// The metrics store never reported ready
    #[error("metrics store at {url} did not become ready after {attempts} attempts")]
    StoreNotReady { url: String, attempts: u32 },

    /// An endpoint URL could not be parsed or joined
    #[error("invalid endpoint `{url}`: {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// An HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The shutdown signal fired while waiting
    #[error("operation cancelled by shutdown")]
    Cancelled,
}

impl ScalerError {
    /// Build a runtime error with operation and target context
    pub fn runtime(
        operation: &'static str,
        target: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Runtime {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// Result alias for autoscaler library operations
pub type Result<T> = std::result::Result<T, ScalerError>;
