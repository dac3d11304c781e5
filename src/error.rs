use thiserror::Error;

/// Errors surfaced by the exchange adapters and the trading components built on them
#[derive(Debug, Error)]
pub enum BotError {
    /// Transport failure (DNS, TLS, timeout, connection reset)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The exchange answered but reported a non-success status
    #[error("API error [{code}]: {message}")]
    Api { code: String, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Something the operation needs is not in the exchange data (e.g. option not listed)
    #[error("missing data: {0}")]
    MissingData(String),

    /// One leg of a paired operation went through and its sibling did not
    #[error("partial fill: {0}")]
    PartialFill(String),

    #[error("need at least 3 tracked straddles to roll, have {tracked}")]
    NotEnoughStraddles { tracked: usize },

    #[error("missing credentials: {0}")]
    Credentials(String),
}

impl BotError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
