//! Common test utilities and fixtures

#![allow(dead_code)]

use mockall::mock;
use raindrop_tag_cleaner::auth::{AccessToken, AuthSession};
use raindrop_tag_cleaner::client::{OAuthProvider, TagService};
use raindrop_tag_cleaner::config::OAuthConfig;
use raindrop_tag_cleaner::error::Result;
use raindrop_tag_cleaner::models::Tag;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

/// Build tags in listing order
pub fn tags(names: &[&str]) -> Vec<Tag> {
    names.iter().map(|name| Tag::new(*name)).collect()
}

pub fn test_token() -> AccessToken {
    AccessToken::new("test-access-token")
}

/// OAuth settings for a listener on an ephemeral port, no browser
pub fn test_oauth_config() -> OAuthConfig {
    OAuthConfig {
        redirect_port: 0,
        poll_interval_secs: 1,
        open_browser: false,
        ..OAuthConfig::default()
    }
}

/// Mock raindrop.io tag list response (JSON)
pub fn mock_tags_response(names: &[&str]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({ "_id": name, "count": i + 1 }))
        .collect();

    json!({ "result": true, "items": items })
}

/// Pull the redirect URI back out of an authorization URL
pub fn redirect_uri_of(authorization_url: &Url) -> Url {
    let redirect = authorization_url
        .query_pairs()
        .find(|(key, _)| key == "redirect_uri")
        .map(|(_, value)| value.into_owned())
        .expect("authorization URL has a redirect_uri");
    Url::parse(&redirect).expect("redirect_uri is a valid URL")
}

/// Act as the browser: hit the redirect URI with `query` and return the raw response
pub async fn send_redirect(redirect_uri: &Url, query: &str) -> String {
    let port = redirect_uri.port().expect("redirect URI carries a port");
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("redirect listener accepts connections");

    let request = format!(
        "GET {}?{} HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
        redirect_uri.path(),
        query,
        port
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

/// Deliver an authorization code as the browser would after the operator approves
pub fn approve_in_background(authorization_url: &Url, code: &str) {
    let redirect = redirect_uri_of(authorization_url);
    let query = format!("code={}", code);
    tokio::spawn(async move {
        send_redirect(&redirect, &query).await;
    });
}

// Mock implementation of TagService for testing
mock! {
    pub TagService {}

    #[async_trait::async_trait]
    impl TagService for TagService {
        async fn list_tags(&self, token: &AccessToken) -> Result<Vec<Tag>>;
        async fn delete_tag(&self, token: &AccessToken, tag: &str) -> Result<()>;
    }
}

// Mock implementation of OAuthProvider for testing
mock! {
    pub OAuthProvider {}

    #[async_trait::async_trait]
    impl OAuthProvider for OAuthProvider {
        async fn exchange_code(&self, session: &AuthSession, code: &str) -> Result<AccessToken>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_preserve_order() {
        let list = tags(&["b", "a", "c"]);
        let ids: Vec<&str> = list.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_redirect_uri_of() {
        let url = Url::parse_with_params(
            "https://raindrop.io/oauth/authorize",
            &[("client_id", "abc"), ("redirect_uri", "http://localhost:4000/oauth")],
        )
        .unwrap();
        let redirect = redirect_uri_of(&url);
        assert_eq!(redirect.port(), Some(4000));
        assert_eq!(redirect.path(), "/oauth");
    }
}
