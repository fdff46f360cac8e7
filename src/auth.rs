//! OAuth2 authorization-code flow for raindrop.io
//!
//! The flow runs once per invocation and is never persisted:
//! 1. bind the redirect listener and build the authorization URL
//! 2. wait for the provider to redirect the browser back with a code
//! 3. exchange the code for an access token

use std::env;
use std::fmt;
use std::io::{self, Write};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::OAuthProvider;
use crate::config::OAuthConfig;
use crate::error::{CleanerError, Result};
use crate::redirect::{CodeSlot, ListenerHandle, RedirectListener};

/// Environment variable holding the OAuth client secret
pub const CLIENT_SECRET_ENV: &str = "RAINDROP_CLIENT_SECRET";

/// Read the client secret from the environment
///
/// Missing or blank values are a fatal [`CleanerError::MissingCredential`].
pub fn client_secret_from_env() -> Result<String> {
    match env::var(CLIENT_SECRET_ENV) {
        Ok(secret) if !secret.trim().is_empty() => Ok(secret),
        _ => Err(CleanerError::MissingCredential(format!(
            "missing env variable {}",
            CLIENT_SECRET_ENV
        ))),
    }
}

/// Bearer credential produced by the token exchange
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Client credentials plus the code captured by the redirect listener
#[derive(Clone)]
pub struct AuthSession {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    code: CodeSlot,
}

impl AuthSession {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        code: CodeSlot,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            code,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn code_slot(&self) -> &CodeSlot {
        &self.code
    }

    pub fn code(&self) -> Option<String> {
        self.code.get()
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("code_received", &self.code.is_set())
            .finish()
    }
}

/// Build the provider's authorization URL
pub fn authorization_url(authorize_url: &str, client_id: &str, redirect_uri: &str) -> Result<Url> {
    Url::parse_with_params(
        authorize_url,
        &[("client_id", client_id), ("redirect_uri", redirect_uri)],
    )
    .map_err(|e| {
        CleanerError::AuthError(format!(
            "failed to construct authorization URL from '{}': {}",
            authorize_url, e
        ))
    })
}

/// Print the authorization URL and optionally open it in a browser
///
/// A browser that fails to launch is logged and otherwise ignored.
pub fn present_authorization_url(url: &Url, open_browser: bool) {
    present_with(url, open_browser, io::stdout().lock(), |target| open::that_detached(target));
}

/// Write the authorization URL to `out`, then try `launch` if enabled
///
/// Returns whether a browser was launched.
pub fn present_with<W, L>(url: &Url, open_browser: bool, mut out: W, launch: L) -> bool
where
    W: Write,
    L: FnOnce(&str) -> io::Result<()>,
{
    if let Err(e) = writeln!(out, "authorization URL: {}", url).and_then(|()| out.flush()) {
        warn!("couldn't print the authorization URL: {}", e);
    }
    if !open_browser {
        return false;
    }
    match launch(url.as_str()) {
        Ok(()) => true,
        Err(e) => {
            warn!("couldn't open your browser automatically: {}", e);
            false
        }
    }
}

/// Coordinator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Init,
    AwaitingRedirect,
    Exchanging,
    Authorized,
    Failed,
}

/// Redirect listener running and URL ready to be shown to the operator
pub struct PendingAuthorization {
    session: AuthSession,
    url: Url,
    listener: ListenerHandle,
}

impl PendingAuthorization {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Stop the background listener
    pub fn abort_listener(&self) {
        self.listener.abort();
    }
}

/// Drives the authorization-code flow to an [`AccessToken`]
pub struct Authorizer<'a> {
    config: &'a OAuthConfig,
    client_secret: String,
    provider: &'a dyn OAuthProvider,
    state: AuthState,
}

impl<'a> Authorizer<'a> {
    pub fn new(
        config: &'a OAuthConfig,
        client_secret: String,
        provider: &'a dyn OAuthProvider,
    ) -> Self {
        Self {
            config,
            client_secret,
            provider,
            state: AuthState::Init,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Run the whole flow, handing the authorization URL to `present`
    pub async fn authorize<F>(&mut self, present: F) -> Result<AccessToken>
    where
        F: FnOnce(&Url),
    {
        let pending = self.begin().await?;
        present(pending.url());
        self.complete(pending).await
    }

    /// Bind the listener, build the URL, and start serving redirects
    pub async fn begin(&mut self) -> Result<PendingAuthorization> {
        match self.start().await {
            Ok(pending) => {
                self.transition(AuthState::AwaitingRedirect);
                Ok(pending)
            }
            Err(e) => {
                self.transition(AuthState::Failed);
                Err(e)
            }
        }
    }

    /// Wait for the redirect and exchange the code
    pub async fn complete(&mut self, pending: PendingAuthorization) -> Result<AccessToken> {
        let result = self.finish(&pending).await;
        match &result {
            Ok(_) => self.transition(AuthState::Authorized),
            Err(_) => self.transition(AuthState::Failed),
        }
        result
    }

    async fn start(&mut self) -> Result<PendingAuthorization> {
        let slot = CodeSlot::new();
        let listener = RedirectListener::bind_loopback(
            self.config.redirect_port,
            &self.config.redirect_path,
            slot.clone(),
        )
        .await?;
        let port = listener.local_addr()?.port();

        let session = AuthSession::new(
            self.config.client_id.clone(),
            self.client_secret.clone(),
            self.config.redirect_uri_for_port(port),
            slot,
        );
        let url = authorization_url(
            &self.config.authorize_url,
            session.client_id(),
            session.redirect_uri(),
        )?;

        let listener = listener.spawn();
        debug!("Redirect listener serving {}", session.redirect_uri());

        Ok(PendingAuthorization {
            session,
            url,
            listener,
        })
    }

    async fn finish(&mut self, pending: &PendingAuthorization) -> Result<AccessToken> {
        let code = self.await_code(&pending.session).await?;

        self.transition(AuthState::Exchanging);
        let token = self
            .provider
            .exchange_code(&pending.session, &code)
            .await
            .map_err(|e| match e {
                CleanerError::TokenExchangeError(_) => e,
                other => CleanerError::TokenExchangeError(other.to_string()),
            })?;

        info!("Obtained raindrop.io access token");
        Ok(token)
    }

    /// Block until the listener stores a code, logging every poll interval
    async fn await_code(&self, session: &AuthSession) -> Result<String> {
        let poll_interval = self.config.poll_interval();
        let timeout = self.config.redirect_timeout();
        let deadline = timeout.map(|t| Instant::now() + t);

        let wait = session.code_slot().wait();
        tokio::pin!(wait);

        info!("waiting for raindrop.io authorization...");
        loop {
            let tick = match deadline {
                Some(deadline) => {
                    poll_interval.min(deadline.saturating_duration_since(Instant::now()))
                }
                None => poll_interval,
            };

            tokio::select! {
                code = &mut wait => return code,
                _ = tokio::time::sleep(tick) => {
                    if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                        if Instant::now() >= deadline {
                            return Err(CleanerError::RedirectTimeout(timeout.as_secs()));
                        }
                    }
                    info!("waiting for raindrop.io authorization...");
                }
            }
        }
    }

    fn transition(&mut self, next: AuthState) {
        debug!("Authorization state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
