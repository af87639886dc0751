use thiserror::Error;

/// Transport-level errors shared by the run state store, the event bus, and any other
/// component that talks to an external provider over a connection. Domain-specific errors
/// (guard trips, validation failures, ...) live in `coordinator-execution::error` and convert
/// into the component-level enums that embed [`TransportError`], not the other way around.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Deserialising JSON error: {error} for payload: {payload}")]
    Deserialise {
        error: serde_json::Error,
        payload: String,
    },

    #[error("Serialising JSON error: {0}")]
    Serialise(serde_json::Error),

    #[error("connection to provider timed out")]
    Timeout,

    #[error("provider connectivity error: {0}")]
    Connectivity(String),

    #[error("provider responded with an unexpected payload: {0}")]
    UnexpectedResponse(String),
}
