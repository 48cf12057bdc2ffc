//! HTTP client pools bound to a TLS client-auth context

use clientauth_core::{ClientAuthError, PoolKind, Result};
use clientauth_tls::TlsContext;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request methods issued through a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// Request envelope executed by a [`ClientPool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl PoolRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_string(value)
            .map_err(|e| ClientAuthError::Request(format!("cannot encode JSON body: {}", e)))?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }
}

/// Response envelope returned by a [`ClientPool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolResponse {
    pub status: u16,
    pub body: String,
}

impl PoolResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| ClientAuthError::Request(format!("invalid JSON response: {}", e)))
    }
}

/// A live HTTP client with its own connect and request timeouts.
///
/// Pools are shared by `Arc` between the factory and the dispatcher. Closing
/// drops the underlying connection pool; later requests fail with
/// [`ClientAuthError::PoolClosed`].
#[derive(Debug)]
pub struct ClientPool {
    kind: PoolKind,
    connect_timeout: Duration,
    request_timeout: Duration,
    has_tls: bool,
    client: Mutex<Option<reqwest::Client>>,
    closed: AtomicBool,
}

impl ClientPool {
    /// Create a pool without client authentication
    #[cfg(test)]
    pub(crate) fn new(
        kind: PoolKind,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| construction_error(kind, &e))?;
        Ok(Self::from_client(kind, client, connect_timeout, request_timeout, false))
    }

    /// Create a pool that presents the context's client certificate on every handshake
    pub fn with_tls(
        kind: PoolKind,
        context: &TlsContext,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let tls = context.client_config().as_ref().clone();
        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| construction_error(kind, &e))?;

        debug!(
            "{} pool initialized with client auth (connect timeout {:?}, request timeout {:?})",
            kind, connect_timeout, request_timeout
        );
        Ok(Self::from_client(kind, client, connect_timeout, request_timeout, true))
    }

    fn from_client(
        kind: PoolKind,
        client: reqwest::Client,
        connect_timeout: Duration,
        request_timeout: Duration,
        has_tls: bool,
    ) -> Self {
        Self {
            kind,
            connect_timeout,
            request_timeout,
            has_tls,
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Check if this pool presents a client certificate
    pub fn has_tls(&self) -> bool {
        self.has_tls
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the connection pool. Returns true only for the call that closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("{} pool already closed", self.kind);
            return false;
        }
        if let Ok(mut client) = self.client.lock() {
            client.take();
        }
        info!("{} client pool closed", self.kind);
        true
    }

    /// Issue a request and read the whole response body
    pub async fn execute(&self, request: PoolRequest) -> Result<PoolResponse> {
        let client = self.live_client()?;
        debug!("{} pool: {:?} {}", self.kind, request.method, request.url);

        let mut builder = client.request(request.method.as_reqwest(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            let message = error_chain(&e);
            warn!("{} pool request to {} failed: {}", self.kind, request.url, message);
            ClientAuthError::Request(message)
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientAuthError::Request(error_chain(&e)))?;
        debug!("{} pool: {} responded {}", self.kind, request.url, status);

        Ok(PoolResponse { status, body })
    }

    fn live_client(&self) -> Result<reqwest::Client> {
        if self.is_closed() {
            return Err(ClientAuthError::PoolClosed(self.kind));
        }
        self.client
            .lock()
            .ok()
            .and_then(|client| client.clone())
            .ok_or(ClientAuthError::PoolClosed(self.kind))
    }
}

fn construction_error(kind: PoolKind, e: &reqwest::Error) -> ClientAuthError {
    ClientAuthError::ClientConstruction(format!("{} pool: {}", kind, error_chain(e)))
}

/// Flatten an error and its sources into one line; reqwest hides TLS causes in the chain
fn error_chain(e: &dyn StdError) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_pool() -> ClientPool {
        ClientPool::new(PoolKind::Fast, Duration::from_secs(1), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_request_builder() {
        let request = PoolRequest::post("https://service.test/jobs")
            .with_header("X-Request-Id", "abc")
            .with_body("payload");

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://service.test/jobs");
        assert_eq!(request.headers.get("x-request-id").map(String::as_str), Some("abc"));
        assert_eq!(request.body.as_deref(), Some("payload"));
    }

    #[test]
    fn test_request_json_body() {
        let request = PoolRequest::post("https://service.test/jobs")
            .with_json(&serde_json::json!({"id": 7}))
            .unwrap();
        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.body.as_deref(), Some(r#"{"id":7}"#));
    }

    #[test]
    fn test_response_helpers() {
        let response = PoolResponse {
            status: 204,
            body: "[1,2]".to_string(),
        };
        assert!(response.is_success());
        assert_eq!(response.json::<Vec<u32>>().unwrap(), vec![1, 2]);

        let failed = PoolResponse {
            status: 502,
            body: String::new(),
        };
        assert!(!failed.is_success());
    }

    #[test]
    fn test_pool_timeouts() {
        let pool = plain_pool();
        assert_eq!(pool.kind(), PoolKind::Fast);
        assert_eq!(pool.connect_timeout(), Duration::from_secs(1));
        assert_eq!(pool.request_timeout(), Duration::from_secs(2));
        assert!(!pool.has_tls());
        assert!(!pool.is_closed());
    }

    #[test]
    fn test_close_exactly_once() {
        let pool = plain_pool();
        assert!(pool.close());
        assert!(pool.is_closed());
        assert!(!pool.close());
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_execute_after_close() {
        let pool = plain_pool();
        pool.close();

        let result = pool.execute(PoolRequest::get("http://127.0.0.1:9/")).await;
        assert!(matches!(result, Err(ClientAuthError::PoolClosed(PoolKind::Fast))));
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "certificate unknown");
        let outer = ClientAuthError::Io {
            kind: clientauth_core::KeyMaterial::Keystore,
            path: "keystore.jks".into(),
            source: inner,
        };
        let message = error_chain(&outer);
        assert!(message.ends_with(": certificate unknown"));
    }
}
