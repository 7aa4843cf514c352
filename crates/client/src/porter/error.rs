use reqwest::StatusCode;
use url::Url;

use crate::cancel::Interrupted;
use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum PorterError {
    #[error("no porter endpoints configured")]
    NoEndpoints,
    #[error("invalid porter uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },
    /// The request never produced an HTTP response
    #[error("porter {uri} unreachable: {source}")]
    Transport {
        uri: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("porter {uri} responded {status}: {body}")]
    BadResponse {
        uri: Url,
        status: StatusCode,
        body: String,
    },
    /// A success status with a body that is not the expected document
    #[error("porter {uri} sent an undecodable response: {reason}")]
    Decode { uri: Url, reason: String },
    #[error("porter configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("porter request could not be built: {0}")]
    Request(String),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl PorterError {
    /// Endpoint the error came from, if any
    pub fn uri(&self) -> Option<&Url> {
        match self {
            PorterError::Transport { uri, .. }
            | PorterError::BadResponse { uri, .. }
            | PorterError::Decode { uri, .. } => Some(uri),
            _ => None,
        }
    }
}
