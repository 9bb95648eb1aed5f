//! Brightbox Cloud implementation of [`ComputeApi`].
//!
//! Talks to the Brightbox REST API directly. Failed calls keep the response
//! body verbatim so provider validation messages reach the user unchanged.

mod error;
mod types;

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

pub use error::BrightboxError;

use crate::backend::{BackendFuture, ComputeApi, NamedResource, ServerRequest, ServerSnapshot};
use types::{CreateServerPayload, HandleResource, ServerResource};

/// API endpoint used when none is configured.
pub const DEFAULT_API_URL: &str = "https://api.gb1.brightbox.com";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Brightbox API client scoped to one account token.
#[derive(Clone, Debug)]
pub struct BrightboxBackend {
    api_url: String,
    access_token: String,
}

impl BrightboxBackend {
    /// Creates a backend for `api_url` authenticated with `access_token`.
    ///
    /// # Errors
    ///
    /// Returns [`BrightboxError::Config`] when the token is blank or the URL
    /// is not an HTTP(S) URL.
    pub fn new(
        api_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, BrightboxError> {
        let url = api_url.into().trim().trim_end_matches('/').to_owned();
        let token = access_token.into().trim().to_owned();
        if token.is_empty() {
            return Err(BrightboxError::Config(String::from(
                "access token must not be empty",
            )));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(BrightboxError::Config(format!(
                "API URL must start with http:// or https://, got '{url}'"
            )));
        }
        Ok(Self {
            api_url: url,
            access_token: token,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/1.0/{path}", self.api_url)
    }

    fn authorised(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(
        &self,
        url: &str,
        builder: RequestBuilder,
    ) -> Result<(StatusCode, Vec<u8>), BrightboxError> {
        let transport_failed = |err: reqwest::Error| BrightboxError::Transport {
            url: url.to_owned(),
            message: err.to_string(),
        };
        let response = self
            .authorised(builder)
            .send()
            .await
            .map_err(transport_failed)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_failed)?;
        debug!(url, status = status.as_u16(), "brightbox response");
        Ok((status, body.to_vec()))
    }

    fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, BrightboxError> {
        serde_json::from_slice(body).map_err(|err| BrightboxError::Decode {
            url: url.to_owned(),
            message: err.to_string(),
        })
    }

    fn http_error(status: StatusCode, body: &[u8]) -> BrightboxError {
        BrightboxError::Http {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    async fn create(&self, request: &ServerRequest) -> Result<ServerSnapshot, BrightboxError> {
        let url = self.endpoint("servers");
        let payload = CreateServerPayload::from_request(request);
        let (status, body) = self
            .send(&url, HTTP_CLIENT.post(&url).json(&payload))
            .await?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        let server: ServerResource = Self::decode(&url, &body)?;
        Ok(server.into_snapshot())
    }

    async fn fetch(&self, id: &str) -> Result<Option<ServerSnapshot>, BrightboxError> {
        let url = self.endpoint(&format!("servers/{id}"));
        let (status, body) = self.send(&url, HTTP_CLIENT.get(&url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        let server: ServerResource = Self::decode(&url, &body)?;
        Ok(Some(server.into_snapshot()))
    }

    async fn list(&self, collection: &str) -> Result<Vec<NamedResource>, BrightboxError> {
        let url = self.endpoint(collection);
        let (status, body) = self.send(&url, HTTP_CLIENT.get(&url)).await?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        let entries: Vec<HandleResource> = Self::decode(&url, &body)?;
        Ok(entries.into_iter().map(NamedResource::from).collect())
    }

    async fn delete(&self, id: &str) -> Result<(), BrightboxError> {
        let url = self.endpoint(&format!("servers/{id}"));
        let (status, body) = self.send(&url, HTTP_CLIENT.delete(&url)).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::http_error(status, &body))
    }
}

impl ComputeApi for BrightboxBackend {
    type Error = BrightboxError;

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> BackendFuture<'a, ServerSnapshot, Self::Error> {
        Box::pin(self.create(request))
    }

    fn fetch_server<'a>(
        &'a self,
        id: &'a str,
    ) -> BackendFuture<'a, Option<ServerSnapshot>, Self::Error> {
        Box::pin(self.fetch(id))
    }

    fn list_zones(&self) -> BackendFuture<'_, Vec<NamedResource>, Self::Error> {
        Box::pin(self.list("zones"))
    }

    fn list_server_types(&self) -> BackendFuture<'_, Vec<NamedResource>, Self::Error> {
        Box::pin(self.list("server_types"))
    }

    fn destroy_server<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.delete(id))
    }
}

#[cfg(test)]
mod tests;
