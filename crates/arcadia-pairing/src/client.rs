//! HTTP client for the streaming sidecar's pairing API.
//!
//! The sidecar issues a pairing secret for each client that asks to pair and
//! waits for the PIN shown on that client. This module wraps its REST surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PairingError, Result};
use crate::types::{PairingConfig, PendingPairing, Pin, SidecarClientInfo};

/// Trait for sidecar communication.
///
/// This trait abstracts the sidecar client interface, allowing for
/// mock implementations in tests.
#[async_trait]
pub trait SidecarClient: Send + Sync {
    /// List pairing requests waiting for a PIN.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar is unreachable or answers with an error.
    async fn pending_requests(&self) -> Result<Vec<PendingPairing>>;

    /// List clients the sidecar knows about.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar is unreachable or answers with an error.
    async fn clients(&self) -> Result<Vec<SidecarClientInfo>>;

    /// Submit a PIN for a pending request. Returns true if the sidecar accepted it.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar is unreachable or answers with an error.
    async fn submit_pin(&self, pair_secret: &str, pin: Pin) -> Result<bool>;

    /// Forget every paired client.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar is unreachable or answers with an error.
    async fn unpair_all(&self) -> Result<()>;
}

/// HTTP client for the sidecar.
#[derive(Debug, Clone)]
pub struct HttpSidecarClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSidecarClient {
    /// Create a new sidecar client.
    ///
    /// # Errors
    ///
    /// Returns `PairingError::Client` if the HTTP client cannot be created.
    pub fn new(config: &PairingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| PairingError::Client(e.to_string()))?;

        Ok(Self::with_client(client, config.sidecar_url.clone()))
    }

    /// Create a new sidecar client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Get the base URL of the sidecar.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PairingError::Unavailable(format!("Sidecar request failed: {e}")))?;

        let response = check_status(response, path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PairingError::Sidecar(format!("Failed to parse response: {e}")))
    }
}

/// Error response from the sidecar.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct PendingResponse {
    #[serde(default)]
    requests: Vec<PendingPairing>,
}

#[derive(Debug, Deserialize)]
struct ClientsResponse {
    #[serde(default)]
    clients: Vec<SidecarClientInfo>,
}

#[derive(Debug, Serialize)]
struct PairRequest<'a> {
    pair_secret: &'a str,
    pin: &'a str,
}

#[derive(Debug, Deserialize)]
struct PairResponse {
    success: bool,
}

async fn check_status(response: reqwest::Response, path: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error = response
        .json::<ErrorResponse>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("Sidecar returned status {status}"));

    tracing::error!(
        path = %path,
        status = %status,
        error = %error,
        "Sidecar request failed"
    );

    Err(PairingError::Sidecar(error))
}

#[async_trait]
impl SidecarClient for HttpSidecarClient {
    async fn pending_requests(&self) -> Result<Vec<PendingPairing>> {
        let response: PendingResponse = self.get_json("/api/v1/pair/pending").await?;
        Ok(response.requests)
    }

    async fn clients(&self) -> Result<Vec<SidecarClientInfo>> {
        let response: ClientsResponse = self.get_json("/api/v1/clients").await?;
        Ok(response.clients)
    }

    async fn submit_pin(&self, pair_secret: &str, pin: Pin) -> Result<bool> {
        let path = "/api/v1/pair/client";
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&PairRequest {
                pair_secret,
                pin: pin.as_str(),
            })
            .send()
            .await
            .map_err(|e| PairingError::Unavailable(format!("Sidecar request failed: {e}")))?;

        let response = check_status(response, path).await?;
        let body: PairResponse = response
            .json()
            .await
            .map_err(|e| PairingError::Sidecar(format!("Failed to parse response: {e}")))?;

        tracing::debug!(success = body.success, "Submitted pairing PIN");
        Ok(body.success)
    }

    async fn unpair_all(&self) -> Result<()> {
        let path = "/api/v1/unpair/all";
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| PairingError::Unavailable(format!("Sidecar request failed: {e}")))?;

        check_status(response, path).await?;
        tracing::debug!("Unpaired all clients via sidecar API");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// A mock sidecar that keeps pairing state in memory.
    #[derive(Default)]
    pub struct MockSidecarClient {
        state: Mutex<MockState>,
    }

    #[derive(Default)]
    struct MockState {
        pending: Vec<PendingPairing>,
        pins: HashMap<String, String>,
        clients: Vec<SidecarClientInfo>,
        unreachable: bool,
        calls: usize,
    }

    impl MockSidecarClient {
        /// Create an empty mock sidecar.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a pending request that accepts `pin`.
        pub fn add_pending(&self, pair_secret: &str, client_ip: &str, pin: &str) {
            let mut state = self.state.lock();
            state.pending.push(PendingPairing {
                pair_secret: pair_secret.to_string(),
                client_ip: client_ip.to_string(),
            });
            state.pins.insert(pair_secret.to_string(), pin.to_string());
        }

        /// Make every call fail as unreachable.
        pub fn set_unreachable(&self, unreachable: bool) {
            self.state.lock().unreachable = unreachable;
        }

        /// Number of calls made against the mock.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.state.lock().calls
        }

        fn enter(&self) -> Result<parking_lot::MutexGuard<'_, MockState>> {
            let mut state = self.state.lock();
            state.calls += 1;
            if state.unreachable {
                return Err(PairingError::Unavailable("mock sidecar unreachable".into()));
            }
            Ok(state)
        }
    }

    #[async_trait]
    impl SidecarClient for MockSidecarClient {
        async fn pending_requests(&self) -> Result<Vec<PendingPairing>> {
            Ok(self.enter()?.pending.clone())
        }

        async fn clients(&self) -> Result<Vec<SidecarClientInfo>> {
            Ok(self.enter()?.clients.clone())
        }

        async fn submit_pin(&self, pair_secret: &str, pin: Pin) -> Result<bool> {
            let mut state = self.enter()?;
            if state.pins.get(pair_secret).map(String::as_str) != Some(pin.as_str()) {
                return Ok(false);
            }
            state.pins.remove(pair_secret);
            if let Some(index) = state.pending.iter().position(|p| p.pair_secret == pair_secret) {
                let request = state.pending.remove(index);
                let client_id = format!("client-{}", state.clients.len() + 1);
                state.clients.push(SidecarClientInfo {
                    client_id,
                    client_ip: Some(request.client_ip),
                });
            }
            Ok(true)
        }

        async fn unpair_all(&self) -> Result<()> {
            self.enter()?.clients.clear();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpSidecarClient {
        HttpSidecarClient::with_client(reqwest::Client::new(), server.uri())
    }

    #[tokio::test]
    async fn lists_pending_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pair/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requests": [{"pair_secret": "s1", "client_ip": "10.0.0.5"}]
            })))
            .mount(&server)
            .await;

        let pending = client(&server).pending_requests().await.unwrap();
        assert_eq!(
            pending,
            vec![PendingPairing {
                pair_secret: "s1".into(),
                client_ip: "10.0.0.5".into(),
            }]
        );
    }

    #[tokio::test]
    async fn lists_clients_without_ip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/clients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "clients": [{"client_id": "tv"}]
            })))
            .mount(&server)
            .await;

        let clients = client(&server).clients().await.unwrap();
        assert_eq!(clients[0].client_id, "tv");
        assert!(clients[0].client_ip.is_none());
    }

    #[tokio::test]
    async fn submits_pin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/pair/client"))
            .and(body_json(json!({"pair_secret": "s1", "pin": "1234"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let accepted = client(&server)
            .submit_pin("s1", Pin::parse("1234").unwrap())
            .await
            .unwrap();
        assert!(accepted);
    }

    #[tokio::test]
    async fn error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/unpair/all"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "state file locked"})),
            )
            .mount(&server)
            .await;

        match client(&server).unpair_all().await {
            Err(PairingError::Sidecar(message)) => assert_eq!(message, "state file locked"),
            other => panic!("expected sidecar error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_sidecar() {
        let sidecar = HttpSidecarClient::new(&PairingConfig {
            sidecar_url: "http://127.0.0.1:1".into(),
            timeout: std::time::Duration::from_secs(1),
        })
        .unwrap();

        assert!(matches!(
            sidecar.pending_requests().await,
            Err(PairingError::Unavailable(_))
        ));
    }
}
