//! Client for Porter, the HTTP relay in front of the ritual nodes
//!
//! A [`PorterClient`] holds an ordered list of Porter base URIs. Every call
//! tries them strictly in order: the first endpoint to answer with a success
//! status and a decodable body wins, and if all of them fail the error from
//! the last endpoint tried is returned.

mod client;
mod error;
mod types;

pub use client::PorterClient;
pub use error::PorterError;
pub use types::{
    DecryptionRequest, DecryptionRequestBody, DecryptionResponse, DecryptionResults,
    GetPeersRequest, Peer, PeersResult, PorterResponse, ShareOutcome,
};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

/// A Porter operation, buildable against any endpoint in the list
pub trait PorterRequest {
    type Response: DeserializeOwned;

    fn build_request(&self, base_url: &Url, client: &Client) -> Result<RequestBuilder, PorterError>;
}

/// `base` with `path` appended as a final segment, keeping any base path
pub(crate) fn endpoint_url(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(path);
    }
    url
}
