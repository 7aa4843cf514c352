//! Network selection and client configuration
//!
//! Everything here is validated before any network call: an unknown domain,
//! a malformed ritual id or a chain adapter on the wrong network is rejected
//! up front.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chain::{ChainAdapter, ChainError};

pub const CONFIG_FILE_NAME: &str = "taco.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown domain {0:?}, expected one of lynx, tapir, mainnet")]
    UnknownDomain(String),
    #[error("invalid ritual id {input:?}: {reason}")]
    InvalidRitualId { input: String, reason: &'static str },
    #[error("invalid porter uri {uri:?}: {reason}")]
    InvalidPorterUri { uri: String, reason: String },
    #[error("porter uri override list is empty")]
    NoPorterUris,
    #[error("request timeout must be positive")]
    InvalidTimeout,
    #[error("chain id {actual} does not match domain {domain} (expected {expected})")]
    ChainMismatch {
        domain: Domain,
        expected: u64,
        actual: u64,
    },
    #[error("could not query chain id: {0}")]
    Chain(#[from] ChainError),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config encode error: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deployment a client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Development network
    Lynx,
    /// Test network
    Tapir,
    Mainnet,
}

impl Domain {
    pub fn chain_id(&self) -> u64 {
        match self {
            Domain::Lynx | Domain::Tapir => 80002,
            Domain::Mainnet => 137,
        }
    }

    pub fn default_porter_uri(&self) -> Url {
        let uri = match self {
            Domain::Lynx => "https://porter-lynx.nucypher.io",
            Domain::Tapir => "https://porter-tapir.nucypher.io",
            Domain::Mainnet => "https://porter.nucypher.io",
        };
        Url::parse(uri).expect("valid porter uri")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Lynx => "lynx",
            Domain::Tapir => "tapir",
            Domain::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lynx" | "devnet" => Ok(Domain::Lynx),
            "tapir" | "testnet" => Ok(Domain::Tapir),
            "mainnet" => Ok(Domain::Mainnet),
            _ => Err(ConfigError::UnknownDomain(s.to_string())),
        }
    }
}

/// Identifier of a DKG ritual on the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RitualId(u32);

impl RitualId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for RitualId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for RitualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RitualId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ConfigError::InvalidRitualId {
            input: s.to_string(),
            reason,
        };
        let trimmed = s.trim();
        if trimmed.starts_with('-') {
            return Err(err("must not be negative"));
        }
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("not an integer"));
        }
        trimmed
            .parse::<u32>()
            .map(RitualId)
            .map_err(|_| err("out of range"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub domain: Domain,
    pub ritual_id: RitualId,
    /// Replaces the domain's default Porter when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub porter_uris: Option<Vec<String>>,
    /// Per-request timeout for Porter calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    pub fn new(domain: Domain, ritual_id: RitualId) -> Self {
        Self {
            domain,
            ritual_id,
            porter_uris: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn with_porter_uris(mut self, uris: Vec<String>) -> Self {
        self.porter_uris = Some(uris);
        self
    }

    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        self.porter_uris().map(|_| ())
    }

    /// Porter endpoints in fallback order
    pub fn porter_uris(&self) -> Result<Vec<Url>, ConfigError> {
        match &self.porter_uris {
            None => Ok(vec![self.domain.default_porter_uri()]),
            Some(uris) if uris.is_empty() => Err(ConfigError::NoPorterUris),
            Some(uris) => uris.iter().map(|uri| parse_porter_uri(uri)).collect(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub(crate) fn parse_porter_uri(uri: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(uri).map_err(|e| ConfigError::InvalidPorterUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ConfigError::InvalidPorterUri {
            uri: uri.to_string(),
            reason: format!("unsupported scheme {}", other),
        }),
    }
}

/// Reject a chain adapter connected to a different network than `domain`
pub async fn ensure_chain(domain: Domain, chain: &dyn ChainAdapter) -> Result<(), ConfigError> {
    let actual = chain.chain_id().await?;
    let expected = domain.chain_id();
    if actual != expected {
        return Err(ConfigError::ChainMismatch {
            domain,
            expected,
            actual,
        });
    }
    Ok(())
}
