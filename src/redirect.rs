//! Local listener that captures the OAuth redirect
//!
//! The listener is bound on the port registered for the redirect URI and
//! serves a single route. The first authorization code it sees is stored in
//! a [`CodeSlot`]; later deliveries are acknowledged but ignored.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CleanerError, Result};

/// Write-once cell holding the authorization code
///
/// Clones share the same cell. The first `set` wins; waiters are woken the
/// moment it happens.
#[derive(Debug, Clone)]
pub struct CodeSlot {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl CodeSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Store the code if the slot is still empty
    ///
    /// Returns `true` only for the call that filled the slot.
    pub fn set(&self, code: impl Into<String>) -> bool {
        let code = code.into();
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(code);
                true
            } else {
                false
            }
        })
    }

    pub fn get(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until a code has been stored
    pub async fn wait(&self) -> Result<String> {
        let mut rx = self.tx.subscribe();
        let code = rx.wait_for(Option::is_some).await.map_err(|_| {
            CleanerError::ListenerError("authorization code channel closed".to_string())
        })?;
        let code = (*code).clone();
        code.ok_or_else(|| {
            CleanerError::Unknown("authorization code missing after wake".to_string())
        })
    }
}

impl Default for CodeSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Pause after a failed `accept` before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bound redirect listener, not yet serving
pub struct RedirectListener {
    listeners: Vec<TcpListener>,
    path: Arc<str>,
    slot: CodeSlot,
}

impl RedirectListener {
    /// Bind a single address
    ///
    /// Fails with [`CleanerError::ListenerError`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr, path: &str, slot: CodeSlot) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            CleanerError::ListenerError(format!(
                "failed to listen for oauth callback on {}: {}",
                addr, e
            ))
        })?;

        debug!("Redirect listener bound on {}", addr);
        Ok(Self {
            listeners: vec![listener],
            path: Arc::from(path),
            slot,
        })
    }

    /// Bind the IPv4 loopback, plus the IPv6 loopback on the same port when
    /// the host has one
    ///
    /// `localhost` may resolve to either family. Only the IPv4 bind is
    /// required; port 0 picks an ephemeral port.
    pub async fn bind_loopback(port: u16, path: &str, slot: CodeSlot) -> Result<Self> {
        let v4 = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let mut listener = Self::bind(v4, path, slot).await?;

        let v6 = SocketAddr::from((Ipv6Addr::LOCALHOST, listener.local_addr()?.port()));
        match TcpListener::bind(v6).await {
            Ok(extra) => {
                debug!("Redirect listener bound on {}", v6);
                listener.listeners.push(extra);
            }
            Err(e) => debug!("Serving the redirect on IPv4 only, {} unavailable: {}", v6, e),
        }
        Ok(listener)
    }

    /// Address of the first bound socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let listener = self
            .listeners
            .first()
            .ok_or_else(|| CleanerError::ListenerError("no socket bound".to_string()))?;
        listener.local_addr().map_err(|e| {
            CleanerError::ListenerError(format!("failed to read listener address: {}", e))
        })
    }

    /// Addresses of every bound socket, IPv4 first
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Serve the redirect route on background tasks, one per socket
    ///
    /// The tasks run until aborted or the runtime shuts down.
    pub fn spawn(self) -> ListenerHandle {
        let Self {
            listeners,
            path,
            slot,
        } = self;
        let tasks = listeners
            .into_iter()
            .map(|listener| tokio::spawn(serve(listener, Arc::clone(&path), slot.clone())))
            .collect();
        ListenerHandle { tasks }
    }
}

/// Running redirect listener tasks
#[derive(Debug)]
pub struct ListenerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn serve(listener: TcpListener, path: Arc<str>, slot: CodeSlot) {
    loop {
        let (stream, peer) = accept_with_retry(|| listener.accept()).await;
        debug!("Redirect connection from {}", peer);

        let path = Arc::clone(&path);
        let slot = slot.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let response = respond(req.method(), req.uri(), &path, &slot);
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Redirect connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

/// Keep calling `accept` until it yields a connection, pausing after each error
async fn accept_with_retry<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!("Failed to accept redirect connection: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Build the response for one request and capture the code if present
pub fn respond(method: &Method, uri: &Uri, path: &str, slot: &CodeSlot) -> Response<Full<Bytes>> {
    if uri.path() != path {
        return html(
            StatusCode::NOT_FOUND,
            "<html><body><h1>Not Found</h1></body></html>".to_string(),
        );
    }

    if method != Method::GET {
        return html(
            StatusCode::METHOD_NOT_ALLOWED,
            "<html><body><h1>Method Not Allowed</h1></body></html>".to_string(),
        );
    }

    let mut code = None;
    let mut error = None;
    if let Some(query) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" if !value.is_empty() => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }
    }

    if let Some(code) = code {
        if slot.set(code) {
            info!("Received raindrop.io authorization code");
        } else {
            debug!("Ignoring repeated authorization redirect");
        }
        return html(StatusCode::OK, SUCCESS_HTML.to_string());
    }

    let reason = match error {
        Some(error) => {
            warn!("Authorization redirect carried an error: {}", error);
            format!("The provider reported an error: {}", escape_html(&error))
        }
        None => "No authorization code found in the request.".to_string(),
    };
    html(
        StatusCode::BAD_REQUEST,
        format!(
            "<html><body><h1>Authorization Failed</h1><p>{}</p>\
             <p>You can close this tab and return to your terminal.</p></body></html>",
            reason
        ),
    )
}

fn html(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const SUCCESS_HTML: &str = r#"<html>
<head>
    <title>Authorization Complete</title>
    <style>
        body {
            font-family: system-ui, -apple-system, sans-serif;
            max-width: 600px;
            margin: 100px auto;
            text-align: center;
        }
        h1 { color: #22c55e; }
        p { color: #64748b; }
    </style>
</head>
<body>
    <h1>Authorization Complete</h1>
    <p>The tag cleaner received your raindrop.io authorization.</p>
    <p>You can now close this tab and return to your terminal.</p>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_code_slot_first_write_wins() {
        let slot = CodeSlot::new();
        assert!(!slot.is_set());

        assert!(slot.set("first"));
        assert!(!slot.set("second"));
        assert_eq!(slot.get().as_deref(), Some("first"));
    }

    #[test]
    fn test_code_slot_clones_share_state() {
        let slot = CodeSlot::new();
        let clone = slot.clone();
        clone.set("abc");
        assert_eq!(slot.get().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_code_slot_wait_wakes_on_set() {
        let slot = CodeSlot::new();
        let writer = slot.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.set("late-code");
        });

        let code = tokio::time::timeout(Duration::from_secs(2), slot.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, "late-code");
    }

    #[tokio::test]
    async fn test_code_slot_wait_returns_existing_code() {
        let slot = CodeSlot::new();
        slot.set("ready");
        assert_eq!(slot.wait().await.unwrap(), "ready");
    }

    #[test]
    fn test_respond_captures_code() {
        let slot = CodeSlot::new();
        let response = respond(&Method::GET, &uri("/oauth?code=abc%2F123"), "/oauth", &slot);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(slot.get().as_deref(), Some("abc/123"));
    }

    #[test]
    fn test_respond_repeated_redirect_keeps_first_code() {
        let slot = CodeSlot::new();
        respond(&Method::GET, &uri("/oauth?code=one"), "/oauth", &slot);
        let response = respond(&Method::GET, &uri("/oauth?code=two"), "/oauth", &slot);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(slot.get().as_deref(), Some("one"));
    }

    #[test]
    fn test_respond_provider_error() {
        let slot = CodeSlot::new();
        let response = respond(
            &Method::GET,
            &uri("/oauth?error=access_denied"),
            "/oauth",
            &slot,
        );

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!slot.is_set());
    }

    #[test]
    fn test_respond_missing_or_empty_code() {
        let slot = CodeSlot::new();
        assert_eq!(
            respond(&Method::GET, &uri("/oauth"), "/oauth", &slot).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            respond(&Method::GET, &uri("/oauth?code="), "/oauth", &slot).status(),
            StatusCode::BAD_REQUEST
        );
        assert!(!slot.is_set());
    }

    #[test]
    fn test_respond_other_routes() {
        let slot = CodeSlot::new();
        assert_eq!(
            respond(&Method::GET, &uri("/favicon.ico"), "/oauth", &slot).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            respond(&Method::POST, &uri("/oauth?code=abc"), "/oauth", &slot).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert!(!slot.is_set());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<script>\"x\"&"), "&lt;script&gt;&quot;x&quot;&amp;");
    }

    async fn get(addr: SocketAddr, target: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            target
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_bind_loopback_serves_every_address() {
        let slot = CodeSlot::new();
        let listener = RedirectListener::bind_loopback(0, "/oauth", slot.clone())
            .await
            .unwrap();

        let addrs = listener.local_addrs();
        assert!(addrs[0].is_ipv4());
        assert!(addrs.iter().all(|a| a.ip().is_loopback()));
        assert!(addrs.iter().all(|a| a.port() == addrs[0].port()));

        let handle = listener.spawn();
        for addr in &addrs {
            let response = get(*addr, "/oauth?code=abc").await;
            assert!(response.starts_with("HTTP/1.1 200"), "{}: {}", addr, response);
        }
        assert_eq!(slot.get().as_deref(), Some("abc"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_bind_loopback_port_taken() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let result = RedirectListener::bind_loopback(port, "/oauth", CodeSlot::new()).await;
        assert!(matches!(result, Err(CleanerError::ListenerError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_errors_pause_before_retrying() {
        let mut attempts = 0;
        let start = tokio::time::Instant::now();

        let conn = accept_with_retry(|| {
            attempts += 1;
            let result = if attempts < 3 {
                Err(io::Error::new(io::ErrorKind::Other, "too many open files"))
            } else {
                Ok(attempts)
            };
            async move { result }
        })
        .await;

        assert_eq!(conn, 3);
        assert_eq!(start.elapsed(), ACCEPT_RETRY_DELAY * 2);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_listener_error() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let first = RedirectListener::bind(addr, "/oauth", CodeSlot::new())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();

        let second = RedirectListener::bind(addr, "/oauth", CodeSlot::new()).await;
        assert!(matches!(second, Err(CleanerError::ListenerError(_))));
    }
}
