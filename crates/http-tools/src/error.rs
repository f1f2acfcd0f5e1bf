use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpToolsError {
    /// The outbound policy refused the destination.
    #[error("outbound HTTP blocked: {0}")]
    Blocked(String),

    /// The response exceeded the configured size cap.
    #[error("response too large: {0}")]
    TooLarge(String),

    /// Connection, TLS or protocol failure (message is sanitized).
    #[error("http transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(crate::safety::sanitize_reqwest_error(&value))
    }
}
