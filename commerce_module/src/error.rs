#[derive(Debug, thiserror::Error)]
pub enum CommerceError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("order {0} not found")]
    OrderNotFound(String),
}

impl CommerceError {
    /// Network faults, rate limits and server errors are worth retrying;
    /// everything else reflects the request itself.
    pub fn is_transient(&self) -> bool {
        match self {
            CommerceError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            CommerceError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
