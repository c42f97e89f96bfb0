//! Error types for the edge telemetry middleware.

use thiserror::Error;

/// Boxed error produced by transports and registered services.
pub type BoxError = tower::BoxError;

/// A specialised Result type for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Failure of an outbound call made through the invocation's `fetch`.
///
/// The original transport error is kept as the [`source`](std::error::Error::source)
/// so handlers can inspect or downcast it.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FetchError {
    /// The transport or the routed service rejected the call.
    #[error("{source}")]
    Transport {
        #[source]
        source: BoxError,
    },

    /// The call named a service that is not in the registry.
    #[error("no service registered under name `{0}`")]
    UnknownService(String),
}

impl FetchError {
    /// Consumes the error, returning the transport's original error if any.
    pub fn into_transport_error(self) -> Option<BoxError> {
        match self {
            FetchError::Transport { source } => Some(source),
            FetchError::UnknownService(_) => None,
        }
    }
}

impl From<BoxError> for FetchError {
    fn from(source: BoxError) -> Self {
        FetchError::Transport { source }
    }
}
