use thiserror::Error;

/// Errors produced while building requests against a Nextcloud server or
/// normalizing its responses.
///
/// The variants map to the failure classes the executor distinguishes:
/// bad operation setup, transport failures, non-2xx HTTP statuses, error
/// statuses inside an OCS envelope, and unparseable response bodies.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Invalid operation setup: unknown resource/operation, missing or
    /// mistyped parameters. Raised before any request goes out.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network-level failure surfaced from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success HTTP status.
    #[error("request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// The OCS envelope reported a status other than "ok"; carries the
    /// server-supplied message.
    #[error("Nextcloud API error: {0}")]
    Remote(String),

    /// Malformed XML or a response missing expected structure.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl AdapterError {
    pub fn missing_parameter(name: &str, item: usize) -> Self {
        Self::Config(format!(
            "parameter \"{}\" is missing or invalid for item {}",
            name, item
        ))
    }
}
