//! Raindrop.io API client
//!
//! The remote service is reached through two traits so the coordinator and
//! the deletion engine can be exercised without a network:
//! - [`OAuthProvider`] exchanges an authorization code for an access token
//! - [`TagService`] lists tags and deletes a single tag

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use hyper::{Method, Request};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::auth::{AccessToken, AuthSession};
use crate::config::Config;
use crate::error::{parse_retry_after_header, CleanerError, Result};
use crate::models::{
    ApiResult, DeleteTagsRequest, Tag, TagsResponse, TokenRequest, TokenResponse,
};

/// Type alias for the HTTPS client used for all Raindrop calls
pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

const CLIENT_USER_AGENT: &str = concat!("raindrop-tag-cleaner/", env!("CARGO_PKG_VERSION"));

/// Token exchange half of the OAuth flow
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Exchange a one-time authorization code for an access token
    async fn exchange_code(&self, session: &AuthSession, code: &str) -> Result<AccessToken>;
}

/// Tag operations used by the deletion engine
#[async_trait]
pub trait TagService: Send + Sync {
    /// List every tag, in the order the service returns them
    async fn list_tags(&self, token: &AccessToken) -> Result<Vec<Tag>>;

    /// Delete exactly one tag
    async fn delete_tag(&self, token: &AccessToken, tag: &str) -> Result<()>;
}

/// Install the process-wide rustls crypto provider
///
/// Safe to call more than once; later calls are no-ops.
pub fn install_crypto_provider() {
    #[cfg(not(windows))]
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    #[cfg(windows)]
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Raindrop REST and OAuth client over hyper + rustls
pub struct RaindropClient {
    http: HttpsClient,
    api_base_url: String,
    token_url: String,
}

impl RaindropClient {
    /// Create a client for the given API base and token endpoint
    ///
    /// Plain `http://` endpoints are accepted so the client can talk to a
    /// local test server.
    pub fn new(api_base_url: impl Into<String>, token_url: impl Into<String>) -> Result<Self> {
        let roots = match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!("Native TLS roots unavailable ({}), using bundled webpki roots", e);
                hyper_rustls::HttpsConnectorBuilder::new().with_webpki_roots()
            }
        };
        let connector = roots
            .https_or_http()
            .enable_http1()
            .build();

        let http = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api.base_url.clone(), config.oauth.token_url.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&AccessToken>,
    ) -> hyper::http::request::Builder {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token.as_str()));
        }
        builder
    }

    fn json_request<T: Serialize>(
        builder: hyper::http::request::Builder,
        body: &T,
    ) -> Result<Request<Full<Bytes>>> {
        let body = serde_json::to_vec(body)?;
        Ok(builder
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Full::new(Bytes::from(body)))?)
    }

    fn empty_request(builder: hyper::http::request::Builder) -> Result<Request<Full<Bytes>>> {
        Ok(builder.body(Full::new(Bytes::new()))?)
    }

    /// Send a request and return the body of a 2xx response
    async fn send(&self, request: Request<Full<Bytes>>) -> Result<Bytes> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        trace!("{} {}", method, uri);

        let response = self.http.request(request).await?;
        let status = response.status();
        let retry_after = parse_retry_after_header(response.headers());
        let body = response.into_body().collect().await?.to_bytes();

        debug!("{} {} -> {}", method, uri.path(), status);
        if !status.is_success() {
            return Err(CleanerError::from_status(
                status,
                retry_after,
                &String::from_utf8_lossy(&body),
            ));
        }
        Ok(body)
    }

    fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(body)?)
    }
}

#[async_trait]
impl OAuthProvider for RaindropClient {
    async fn exchange_code(&self, session: &AuthSession, code: &str) -> Result<AccessToken> {
        let payload = TokenRequest {
            grant_type: "authorization_code",
            code,
            client_id: session.client_id(),
            client_secret: session.client_secret(),
            redirect_uri: session.redirect_uri(),
        };
        let builder = self.request(Method::POST, &self.token_url, None);
        let request = Self::json_request(builder, &payload)?;

        let body = self
            .send(request)
            .await
            .map_err(|e| CleanerError::TokenExchangeError(e.to_string()))?;
        let response: TokenResponse = Self::parse(&body).map_err(|e| {
            CleanerError::TokenExchangeError(format!("unreadable token response: {}", e))
        })?;

        if let Some(error) = response.error {
            let detail = response
                .error_description
                .map(|d| format!("{}: {}", error, d))
                .unwrap_or(error);
            return Err(CleanerError::TokenExchangeError(detail));
        }

        match response.access_token {
            Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
            _ => Err(CleanerError::TokenExchangeError(
                "response did not contain an access token".to_string(),
            )),
        }
    }
}

#[async_trait]
impl TagService for RaindropClient {
    async fn list_tags(&self, token: &AccessToken) -> Result<Vec<Tag>> {
        let uri = self.endpoint("/tags");
        let request = Self::empty_request(self.request(Method::GET, &uri, Some(token)))?;

        let body = self.send(request).await?;
        let response: TagsResponse = Self::parse(&body)?;
        if !response.result {
            return Err(CleanerError::ApiError(format!(
                "failed to list tags: {}",
                response.error_message.unwrap_or_else(|| "result: false".to_string())
            )));
        }
        Ok(response.items)
    }

    async fn delete_tag(&self, token: &AccessToken, tag: &str) -> Result<()> {
        let uri = self.endpoint("/tags");
        let payload = DeleteTagsRequest {
            tags: vec![tag.to_string()],
        };
        let builder = self.request(Method::DELETE, &uri, Some(token));
        let request = Self::json_request(builder, &payload)?;

        let body = self.send(request).await?;
        if body.is_empty() {
            return Ok(());
        }
        let response: ApiResult = Self::parse(&body)?;
        if !response.result {
            return Err(CleanerError::ApiError(
                response.error_message.unwrap_or_else(|| "result: false".to_string()),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RaindropClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaindropClient")
            .field("api_base_url", &self.api_base_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        install_crypto_provider();
        let client = RaindropClient::new(
            "https://api.raindrop.io/rest/v1/",
            "https://raindrop.io/oauth/access_token",
        )
        .unwrap();
        assert_eq!(client.endpoint("/tags"), "https://api.raindrop.io/rest/v1/tags");
    }

    #[test]
    fn test_user_agent() {
        assert!(CLIENT_USER_AGENT.starts_with("raindrop-tag-cleaner/"));
    }
}
