//! How envelopes reach the memory server

use crate::config::ClientConfig;
use crate::memory::MemoryStore;
use crate::rpc::{RpcRequest, RpcResponse, handle_request};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Client-side failures. Every variant ends up as a message string in an
/// `OperationResult`.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Connection failure or non-2xx status
    #[error("Request failed: {message}")]
    Transport { message: String },

    #[error("Request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Error envelope, or a result carrying an `error` field
    #[error("RPC Error: {message}")]
    Rpc { message: String },

    #[error("failed to parse response: {message}")]
    Parse { message: String },
}

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

/// Sends one envelope and returns the server's envelope
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError>;

    /// Where calls go, for display
    fn endpoint(&self) -> String;
}

#[async_trait]
impl RpcTransport for Box<dyn RpcTransport> {
    async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        (**self).call(request).await
    }

    fn endpoint(&self) -> String {
        (**self).endpoint()
    }
}

/// JSON POST to a running server. No retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.url.clone()).with_timeout(Duration::from_secs(config.timeout))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        let start = Instant::now();
        let send = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send();

        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if !status.is_success() {
                    return Err(ClientError::transport(status.to_string()));
                }
                response
                    .json::<RpcResponse>()
                    .await
                    .map_err(|e| ClientError::parse(e.to_string()))
            }
            Ok(Err(e)) => {
                if e.is_timeout() {
                    Err(ClientError::Timeout {
                        elapsed: start.elapsed(),
                    })
                } else if e.is_connect() {
                    Err(ClientError::transport(format!("connection failed: {}", e)))
                } else {
                    Err(ClientError::transport(e.to_string()))
                }
            }
            Err(_) => Err(ClientError::Timeout {
                elapsed: start.elapsed(),
            }),
        }
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// Dispatches in-process against a shared store, skipping HTTP
#[derive(Debug, Clone)]
pub struct LocalTransport {
    store: Arc<Mutex<MemoryStore>>,
}

impl LocalTransport {
    pub fn new(store: Arc<Mutex<MemoryStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RpcTransport for LocalTransport {
    async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        let mut store = self.store.lock().await;
        Ok(handle_request(&mut store, request.clone()))
    }

    fn endpoint(&self) -> String {
        match self.store.try_lock() {
            Ok(store) => format!("local:{}", store.path().display()),
            Err(_) => "local".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MemoryMethod;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_transport_echoes_id() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path().join("memory.json"));
        let transport = LocalTransport::new(Arc::new(Mutex::new(store)));

        let mut request = RpcRequest::for_method(&MemoryMethod::Initialize);
        request.id = json!("abc");

        let response = transport.call(&request).await.unwrap();
        assert_eq!(response.id, json!("abc"));
        assert!(response.error.is_none());
        assert!(transport.endpoint().ends_with("memory.json"));
    }

    #[tokio::test]
    async fn test_http_transport_connection_refused() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let transport = HttpTransport::new(format!("http://{}", addr))
            .with_timeout(Duration::from_secs(5));

        let err = transport
            .call(&RpcRequest::for_method(&MemoryMethod::Initialize))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
        assert!(err.to_string().starts_with("Request failed:"));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ClientError::rpc("boom").to_string(), "RPC Error: boom");
        assert_eq!(
            ClientError::transport("500 Internal Server Error").to_string(),
            "Request failed: 500 Internal Server Error"
        );
    }
}
