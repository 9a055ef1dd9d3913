use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("HTTP error! status: {0}")]
    Status(StatusCode),
    #[error("malformed response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Status(status)
        } else if err.is_decode() {
            Self::Decode(err)
        } else {
            Self::Network(err)
        }
    }
}
