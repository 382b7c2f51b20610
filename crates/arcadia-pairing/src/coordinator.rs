//! The pairing coordinator.
//!
//! Each pairing secret moves from pending to accepted or rejected. The
//! coordinator validates PINs locally, serializes attempts per secret, forwards
//! them to the sidecar, and records accepted clients in the store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arcadia_store::{PairedClient, Store};
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::client::SidecarClient;
use crate::error::{PairingError, Result};
use crate::types::{
    ClearReport, PairedClientView, PairingOutcome, PairingStatus, Pin, RejectReason,
};

/// Coordinates PIN pairing between streaming clients and the sidecar.
pub struct PairingCoordinator<C, S>
where
    C: SidecarClient,
    S: Store,
{
    client: Arc<C>,
    store: Arc<S>,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases a secret's in-flight slot when dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    secret: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.secret);
    }
}

impl<C, S> PairingCoordinator<C, S>
where
    C: SidecarClient,
    S: Store,
{
    /// Create a new coordinator.
    #[must_use]
    pub fn new(client: Arc<C>, store: Arc<S>) -> Self {
        Self {
            client,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Report sidecar reachability, pending requests, and paired clients.
    ///
    /// Never fails. An unreachable sidecar yields `reachable = false` with only
    /// locally recorded clients.
    pub async fn status(&self) -> PairingStatus {
        let (pending, clients) =
            tokio::join!(self.client.pending_requests(), self.client.clients());

        let reachable = pending.is_ok() && clients.is_ok();
        if let Err(e) = pending.as_ref().and(clients.as_ref()) {
            warn!(error = %e, "Sidecar status unavailable");
        }

        let mut views: HashMap<String, PairedClientView> = HashMap::new();
        for client in clients.unwrap_or_default() {
            views.insert(
                client.client_id.clone(),
                PairedClientView {
                    id: client.client_id,
                    client_ip: client.client_ip,
                    paired_at: None,
                    on_sidecar: true,
                },
            );
        }

        match self.store.list_paired_clients() {
            Ok(local) => {
                for paired in local {
                    let matched = views.values_mut().find(|v| {
                        v.paired_at.is_none()
                            && v.client_ip.as_deref() == Some(paired.client_ip.as_str())
                    });
                    match matched {
                        Some(view) => view.paired_at = Some(paired.paired_at),
                        None => {
                            views.insert(
                                paired.pair_secret.clone(),
                                PairedClientView {
                                    id: paired.pair_secret,
                                    client_ip: Some(paired.client_ip),
                                    paired_at: Some(paired.paired_at),
                                    on_sidecar: false,
                                },
                            );
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list paired clients"),
        }

        let mut clients: Vec<_> = views.into_values().collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));

        PairingStatus {
            reachable,
            pending: pending.unwrap_or_default(),
            clients,
        }
    }

    /// Attempt to pair the client behind `pair_secret` with `pin`.
    ///
    /// A wrong PIN leaves the secret usable for another attempt. A secret that
    /// was already accepted, is unknown to the sidecar, or has an attempt
    /// running is rejected without submitting the PIN.
    ///
    /// # Errors
    ///
    /// - `PairingError::InvalidPin` if the PIN is not four ASCII digits; the
    ///   sidecar is not contacted
    /// - `PairingError::EmptySecret` if the secret is empty
    /// - `PairingError::Unavailable` or `PairingError::Sidecar` if the sidecar fails
    /// - `PairingError::Store` if the accepted client cannot be recorded
    pub async fn pair(&self, pair_secret: &str, pin: &str) -> Result<PairingOutcome> {
        let pin = Pin::parse(pin)?;
        if pair_secret.trim().is_empty() {
            return Err(PairingError::EmptySecret);
        }

        if self.store.get_paired_client(pair_secret)?.is_some() {
            return Ok(rejected(RejectReason::AlreadyUsed));
        }

        if !self.in_flight.lock().insert(pair_secret.to_string()) {
            return Ok(rejected(RejectReason::InProgress));
        }
        let _guard = InFlight {
            set: &self.in_flight,
            secret: pair_secret.to_string(),
        };

        // Re-check now that the slot is held.
        if self.store.get_paired_client(pair_secret)?.is_some() {
            return Ok(rejected(RejectReason::AlreadyUsed));
        }

        let pending = self.client.pending_requests().await?;
        let Some(request) = pending.into_iter().find(|p| p.pair_secret == pair_secret) else {
            info!("Pairing rejected: unknown secret");
            return Ok(rejected(RejectReason::UnknownSecret));
        };

        if !self.client.submit_pin(pair_secret, pin).await? {
            info!(client_ip = %request.client_ip, "Pairing rejected: wrong PIN");
            return Ok(rejected(RejectReason::WrongPin));
        }

        self.store.put_paired_client(&PairedClient {
            pair_secret: pair_secret.to_string(),
            client_ip: request.client_ip.clone(),
            paired_at: Utc::now(),
        })?;
        info!(client_ip = %request.client_ip, "Client paired");

        Ok(PairingOutcome::Accepted)
    }

    /// Unpair every client on the sidecar and forget local records.
    ///
    /// A sidecar failure is reported in the result; local records are removed
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns `PairingError::Store` if local records cannot be removed.
    pub async fn clear(&self) -> Result<ClearReport> {
        let mut report = ClearReport::default();

        match self.client.unpair_all().await {
            Ok(()) => report.sidecar_cleared = true,
            Err(e) => {
                warn!(error = %e, "Sidecar unpair failed");
                report.sidecar_error = Some(e.to_string());
            }
        }

        report.local_removed = self.store.clear_paired_clients()?;
        info!(
            removed = report.local_removed,
            sidecar_cleared = report.sidecar_cleared,
            "Cleared pairings"
        );
        Ok(report)
    }
}

const fn rejected(reason: RejectReason) -> PairingOutcome {
    PairingOutcome::Rejected { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockSidecarClient;
    use crate::client::HttpSidecarClient;
    use arcadia_store::RocksStore;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn setup() -> (
        PairingCoordinator<MockSidecarClient, RocksStore>,
        Arc<MockSidecarClient>,
        Arc<RocksStore>,
        TempDir,
    ) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let client = Arc::new(MockSidecarClient::new());
        let coordinator = PairingCoordinator::new(Arc::clone(&client), Arc::clone(&store));
        (coordinator, client, store, dir)
    }

    #[tokio::test]
    async fn invalid_pin_never_reaches_sidecar() {
        let (coordinator, client, _store, _dir) = setup();
        client.add_pending("s1", "10.0.0.5", "1234");

        assert!(matches!(
            coordinator.pair("s1", "12a4").await,
            Err(PairingError::InvalidPin)
        ));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_secret_is_rejected() {
        let (coordinator, _client, _store, _dir) = setup();

        let outcome = coordinator.pair("missing", "1234").await.unwrap();
        assert_eq!(outcome, rejected(RejectReason::UnknownSecret));
    }

    #[tokio::test]
    async fn accepted_pin_records_client_once() {
        let (coordinator, client, store, _dir) = setup();
        client.add_pending("s1", "10.0.0.5", "1234");

        let outcome = coordinator.pair("s1", "1234").await.unwrap();
        assert!(outcome.is_accepted());

        let paired = store.get_paired_client("s1").unwrap().unwrap();
        assert_eq!(paired.client_ip, "10.0.0.5");

        let again = coordinator.pair("s1", "1234").await.unwrap();
        assert_eq!(again, rejected(RejectReason::AlreadyUsed));
    }

    #[tokio::test]
    async fn wrong_pin_keeps_secret_usable() {
        let (coordinator, client, store, _dir) = setup();
        client.add_pending("s1", "10.0.0.5", "1234");

        let outcome = coordinator.pair("s1", "9999").await.unwrap();
        assert_eq!(outcome, rejected(RejectReason::WrongPin));
        assert!(store.get_paired_client("s1").unwrap().is_none());

        assert!(coordinator.pair("s1", "1234").await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn concurrent_attempt_is_in_progress() {
        let (coordinator, client, _store, _dir) = setup();
        client.add_pending("s1", "10.0.0.5", "1234");

        coordinator.in_flight.lock().insert("s1".to_string());
        let outcome = coordinator.pair("s1", "1234").await.unwrap();
        assert_eq!(outcome, rejected(RejectReason::InProgress));

        coordinator.in_flight.lock().clear();
        assert!(coordinator.pair("s1", "1234").await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn status_merges_sidecar_and_local_clients() {
        let (coordinator, client, store, _dir) = setup();
        client.add_pending("s1", "10.0.0.5", "1234");
        client.add_pending("s2", "10.0.0.6", "0000");
        coordinator.pair("s1", "1234").await.unwrap();

        store
            .put_paired_client(&PairedClient {
                pair_secret: "old".into(),
                client_ip: "10.0.0.9".into(),
                paired_at: Utc::now(),
            })
            .unwrap();

        let status = coordinator.status().await;
        assert!(status.reachable);
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.pending[0].pair_secret, "s2");

        assert_eq!(status.clients.len(), 2);
        let on_sidecar = status.clients.iter().find(|c| c.on_sidecar).unwrap();
        assert_eq!(on_sidecar.client_ip.as_deref(), Some("10.0.0.5"));
        assert!(on_sidecar.paired_at.is_some());
        let local_only = status.clients.iter().find(|c| !c.on_sidecar).unwrap();
        assert_eq!(local_only.id, "old");
    }

    #[tokio::test]
    async fn status_survives_unreachable_sidecar() {
        let (coordinator, client, store, _dir) = setup();
        store
            .put_paired_client(&PairedClient {
                pair_secret: "old".into(),
                client_ip: "10.0.0.9".into(),
                paired_at: Utc::now(),
            })
            .unwrap();
        client.set_unreachable(true);

        let status = coordinator.status().await;
        assert!(!status.reachable);
        assert!(status.pending.is_empty());
        assert_eq!(status.clients.len(), 1);
    }

    #[tokio::test]
    async fn clear_reports_sidecar_failure() {
        let (coordinator, client, store, _dir) = setup();
        client.add_pending("s1", "10.0.0.5", "1234");
        coordinator.pair("s1", "1234").await.unwrap();
        client.set_unreachable(true);

        let report = coordinator.clear().await.unwrap();
        assert!(!report.sidecar_cleared);
        assert!(report.sidecar_error.is_some());
        assert_eq!(report.local_removed, 1);
        assert!(store.list_paired_clients().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pairs_against_http_sidecar() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pair/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requests": [{"pair_secret": "abc", "client_ip": "192.168.1.20"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/pair/client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let client = Arc::new(HttpSidecarClient::with_client(
            reqwest::Client::new(),
            server.uri(),
        ));
        let coordinator = PairingCoordinator::new(client, Arc::clone(&store));

        assert!(coordinator.pair("abc", "4321").await.unwrap().is_accepted());
        assert_eq!(
            store.get_paired_client("abc").unwrap().unwrap().client_ip,
            "192.168.1.20"
        );
    }

    #[tokio::test]
    async fn invalid_pin_sends_no_http_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let client = Arc::new(HttpSidecarClient::with_client(
            reqwest::Client::new(),
            server.uri(),
        ));
        let coordinator = PairingCoordinator::new(client, store);

        assert!(coordinator.pair("abc", "12a4").await.is_err());
    }
}
