use async_trait::async_trait;
use netpath_core::cx::{parse_cx, CxError};
use netpath_core::error::{ErrorCode, NetpathError};
use netpath_core::model::{Network, NetworkId};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RemoteFetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server answered HTTP {0}")]
    Status(u16),
    #[error("network document is invalid: {0}")]
    Document(#[from] CxError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl NetpathError for RemoteFetchError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RemoteFetchError::Status(404) => ErrorCode::NotFound,
            _ => ErrorCode::Unavailable,
        }
    }
}

/// Where reference networks come from when neither memory nor disk has them.
#[async_trait]
pub trait RemoteNetworkSource: Send + Sync {
    async fn fetch(&self, host: &str, id: &NetworkId) -> Result<Network, RemoteFetchError>;
}

/// Downloads CX documents from an NDEx server.
pub struct NdexClient {
    client: reqwest::Client,
}

impl NdexClient {
    pub fn new(timeout: Duration) -> Result<Self, RemoteFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteFetchError::Transport(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn network_url(host: &str, id: &NetworkId) -> String {
        format!("{}/v2/network/{}", host.trim_end_matches('/'), id)
    }
}

#[async_trait]
impl RemoteNetworkSource for NdexClient {
    async fn fetch(&self, host: &str, id: &NetworkId) -> Result<Network, RemoteFetchError> {
        let url = Self::network_url(host, id);
        debug!(%url, "requesting network document");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| RemoteFetchError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteFetchError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| RemoteFetchError::Transport(err.to_string()))?;

        // Large documents; keep the parse off the async workers.
        let parsed = tokio::task::spawn_blocking(move || parse_cx(&body))
            .await
            .map_err(|err| RemoteFetchError::Transport(err.to_string()))?;
        Ok(parsed?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_url_joins_host_and_id() {
        let id = NetworkId::new("50e3dff7-133e-11e6-a039-06603eb7f303");
        assert_eq!(
            NdexClient::network_url("http://public.ndexbio.org/", &id),
            "http://public.ndexbio.org/v2/network/50e3dff7-133e-11e6-a039-06603eb7f303"
        );
    }

    #[test]
    fn test_missing_network_maps_to_not_found() {
        assert_eq!(RemoteFetchError::Status(404).error_code(), ErrorCode::NotFound);
        assert_eq!(RemoteFetchError::Status(503).error_code(), ErrorCode::Unavailable);
        assert_eq!(
            RemoteFetchError::Timeout(Duration::from_secs(1)).error_code(),
            ErrorCode::Unavailable
        );
    }
}
