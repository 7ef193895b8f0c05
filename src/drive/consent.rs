//! Interactive consent for the implicit OAuth grant.
//!
//! The desktop rendition opens the system browser on the authorization
//! endpoint with a loopback `redirect_uri`. Google returns the token in the
//! URL fragment, which never reaches a server, so the first request to the
//! loopback listener is answered with a tiny page that forwards the fragment
//! as a query string to `/callback`.

use super::DriveError;
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

const MAX_REQUEST_BYTES: usize = 16 * 1024;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);
const STATE_MISMATCH: &str = "state_mismatch";

/// A freshly issued access token.
#[derive(Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Identity-provider capability used by [`super::DriveSession`].
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    /// Whether the flow can run in this environment at all.
    fn is_available(&self) -> bool;

    /// Prompts the user and resolves once the provider issued a token.
    async fn request_token(&self, client_id: &str, scope: &str) -> Result<TokenGrant, DriveError>;
}

pub struct BrowserConsent {
    auth_endpoint: String,
    timeout: Duration,
}

impl BrowserConsent {
    pub fn new(timeout: Duration) -> Self {
        Self {
            auth_endpoint: GOOGLE_AUTH_ENDPOINT.to_string(),
            timeout,
        }
    }

    pub fn with_endpoint(mut self, auth_endpoint: impl Into<String>) -> Self {
        self.auth_endpoint = auth_endpoint.into();
        self
    }

    fn authorization_url(
        &self,
        client_id: &str,
        scope: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<Url, DriveError> {
        Url::parse_with_params(
            &self.auth_endpoint,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "token"),
                ("scope", scope),
                ("state", state),
                ("include_granted_scopes", "true"),
            ],
        )
        .map_err(|e| DriveError::Configuration(format!("invalid auth endpoint: {}", e)))
    }

    async fn await_callback(
        &self,
        listener: TcpListener,
        state: &str,
    ) -> Result<TokenGrant, DriveError> {
        // each connection is read on its own task so an idle socket
        // (e.g. a browser preconnect) cannot hold up the real callback
        let (requests, mut incoming) = mpsc::unbounded_channel::<(TcpStream, String)>();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    tokio::spawn(read_connection(stream, requests.clone()));
                }
                Some((mut stream, target)) = incoming.recv() => {
                    match parse_callback(&target, state) {
                        None => {
                            if let Err(e) = respond(&mut stream, FORWARD_FRAGMENT_PAGE).await {
                                log::debug!("Failed to answer loopback request: {}", e);
                            }
                        }
                        Some(Err(DriveError::Authentication { code })) if code == STATE_MISMATCH => {
                            log::warn!("Ignoring sign-in callback with an unexpected state");
                            let _ = respond(&mut stream, FAILED_PAGE).await;
                        }
                        Some(result) => {
                            let page = if result.is_ok() { SIGNED_IN_PAGE } else { FAILED_PAGE };
                            respond(&mut stream, page).await?;
                            return result;
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ConsentFlow for BrowserConsent {
    fn is_available(&self) -> bool {
        webbrowser::Browser::is_available()
    }

    async fn request_token(&self, client_id: &str, scope: &str) -> Result<TokenGrant, DriveError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());
        let state = Uuid::new_v4().to_string();
        let url = self.authorization_url(client_id, scope, &redirect_uri, &state)?;

        log::info!("🔐 Opening browser for Google sign-in (redirect {})", redirect_uri);
        webbrowser::open(url.as_str())
            .map_err(|e| DriveError::ServiceUnavailable(format!("cannot open browser: {}", e)))?;

        match tokio::time::timeout(self.timeout, self.await_callback(listener, &state)).await {
            Ok(result) => result,
            Err(_) => Err(DriveError::Authentication {
                code: "consent_timeout".to_string(),
            }),
        }
    }
}

async fn read_connection(mut stream: TcpStream, requests: mpsc::UnboundedSender<(TcpStream, String)>) {
    match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut stream)).await {
        Ok(Ok(target)) => {
            let _ = requests.send((stream, target));
        }
        Ok(Err(e)) => log::debug!("Ignoring malformed loopback request: {}", e),
        Err(_) => log::debug!("Dropping idle loopback connection"),
    }
}

/// Reads the request line of an HTTP/1.x request and returns its target.
async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request too large",
            ));
        }
    }

    let head = String::from_utf8_lossy(&buffer);
    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no request line"))
}

/// Interprets a loopback request target.
///
/// `None` means the request is not the forwarded callback yet (the browser
/// first lands on `/` with the token still in the fragment).
pub fn parse_callback(target: &str, expected_state: &str) -> Option<Result<TokenGrant, DriveError>> {
    let url = Url::parse(&format!("http://127.0.0.1{}", target)).ok()?;
    if url.path() != "/callback" {
        return None;
    }

    let mut access_token = None;
    let mut expires_in = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse::<u64>().ok(),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Some(Err(DriveError::Authentication {
            code: STATE_MISMATCH.to_string(),
        }));
    }

    let result = match (error, access_token) {
        (Some(code), _) if code == "access_denied" => Err(DriveError::AuthenticationDenied),
        (Some(code), _) => Err(DriveError::Authentication { code }),
        (None, Some(access_token)) if !access_token.is_empty() => Ok(TokenGrant {
            access_token,
            expires_in: expires_in.unwrap_or(3600),
        }),
        (None, _) => Err(DriveError::Authentication {
            code: "missing_token".to_string(),
        }),
    };
    Some(result)
}

async fn respond(stream: &mut TcpStream, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

const FORWARD_FRAGMENT_PAGE: &str = r#"<!doctype html>
<html><body><script>
location.replace('/callback?' + location.hash.substring(1));
</script></body></html>"#;

const SIGNED_IN_PAGE: &str = "<!doctype html><html><body><p>Signed in. You can close this window.</p></body></html>";

const FAILED_PAGE: &str = "<!doctype html><html><body><p>Sign-in failed. Return to the app to try again.</p></body></html>";
