use thiserror::Error;

/// Errors produced by the realtime client.
///
/// None of these are fatal to a running client: the transport manager turns
/// transport failures into lifecycle events and the router drops undecodable
/// messages. They surface as `Err` only from constructors and explicit decode
/// calls.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The configured endpoint or origin could not be parsed as a URL.
    #[error("Invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        /// The raw endpoint text as configured.
        endpoint: String,
        /// The underlying parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The endpoint uses a scheme the feed cannot be reached over.
    #[error("Unsupported scheme '{0}' for a realtime endpoint")]
    UnsupportedScheme(String),

    /// The origin URL carries no host to connect to.
    #[error("Origin '{0}' has no host")]
    MissingHost(String),

    /// A message body was not a valid envelope.
    #[error("Failed to decode envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// A transport could not be started.
    #[error("Transport failure: {0}")]
    Transport(String),
}
