use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::HeaderMap, header::HeaderValue, Client};
use url::Url;

use super::error::PorterError;
use super::types::{DecryptionRequest, GetPeersRequest, Peer, ShareOutcome};
use super::PorterRequest;
use crate::cancel::Cancellation;
use crate::chain::Address;
use crate::config::{parse_porter_uri, ClientConfig, Domain};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Porter client with ordered endpoint fallback
///
/// Cheap to clone; the endpoint list is shared and never changes.
#[derive(Debug, Clone)]
pub struct PorterClient {
    uris: Arc<[Url]>,
    client: Client,
}

impl PorterClient {
    pub fn new(uris: Vec<Url>, timeout: Duration) -> Result<Self, PorterError> {
        if uris.is_empty() {
            return Err(PorterError::NoEndpoints);
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PorterError::Request(e.to_string()))?;

        Ok(Self {
            uris: uris.into(),
            client,
        })
    }

    /// Parse and validate endpoint strings, in fallback order
    pub fn from_uris<I, S>(uris: I) -> Result<Self, PorterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let uris = uris
            .into_iter()
            .map(|uri| {
                parse_porter_uri(uri.as_ref()).map_err(|e| PorterError::InvalidUri {
                    uri: uri.as_ref().to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(uris, DEFAULT_TIMEOUT)
    }

    /// The default Porter of a domain
    pub fn for_domain(domain: Domain) -> Result<Self, PorterError> {
        Self::new(vec![domain.default_porter_uri()], DEFAULT_TIMEOUT)
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, PorterError> {
        Self::new(config.porter_uris()?, config.request_timeout())
    }

    pub fn uris(&self) -> &[Url] {
        &self.uris
    }

    /// Ask Porter for `quantity` nodes
    pub async fn get_peers(
        &self,
        quantity: usize,
        exclude: &[Address],
        include: &[Address],
        cancel: &Cancellation,
    ) -> Result<Vec<Peer>, PorterError> {
        let request = GetPeersRequest {
            quantity,
            exclude: exclude.to_vec(),
            include: include.to_vec(),
        };
        let response = cancel.run(self.call(&request)).await??;
        Ok(response.result.peers)
    }

    /// Collect encrypted decryption shares from a ritual's nodes
    ///
    /// Individual node failures are reported per node; only a failure to reach
    /// any Porter at all is an error.
    pub async fn request_decryption_shares(
        &self,
        request: &DecryptionRequest,
        cancel: &Cancellation,
    ) -> Result<BTreeMap<Address, ShareOutcome>, PorterError> {
        let response = cancel.run(self.call(request)).await??;
        let outcomes = response.result.decryption_results.into_outcomes();
        tracing::debug!(
            ritual_id = request.ritual_id,
            responses = outcomes.len(),
            "received decryption results"
        );
        Ok(outcomes)
    }

    /// Try each endpoint in order; first success wins, last error is returned
    pub async fn call<R: PorterRequest>(&self, request: &R) -> Result<R::Response, PorterError> {
        let mut last_error = PorterError::NoEndpoints;
        for (attempt, uri) in self.uris.iter().enumerate() {
            tracing::debug!(%uri, attempt, "porter request");
            match self.call_endpoint(uri, request).await {
                Ok(response) => {
                    tracing::debug!(%uri, attempt, "porter request succeeded");
                    return Ok(response);
                }
                Err(error) => {
                    tracing::warn!(%uri, attempt, %error, "porter endpoint failed");
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    async fn call_endpoint<R: PorterRequest>(
        &self,
        uri: &Url,
        request: &R,
    ) -> Result<R::Response, PorterError> {
        let response = request
            .build_request(uri, &self.client)?
            .send()
            .await
            .map_err(|source| PorterError::Transport {
                uri: uri.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            return Err(PorterError::BadResponse {
                uri: uri.clone(),
                status,
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| PorterError::Transport {
                uri: uri.clone(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|e| PorterError::Decode {
            uri: uri.clone(),
            reason: e.to_string(),
        })
    }
}
