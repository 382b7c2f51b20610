//! # arcadia-pairing
//!
//! PIN pairing between streaming clients and the streaming sidecar.
//!
//! A client that wants to stream asks the sidecar to pair and shows a four-digit
//! PIN. The sidecar lists the request under an opaque pairing secret; the user
//! enters the PIN here and the coordinator forwards it.
//!
//! ## Pairing flow
//!
//! ```text
//! pair(secret, pin)
//!   │
//!   ├─ PIN not 4 digits ─────────────► InvalidPin (sidecar not contacted)
//!   ├─ secret already accepted ──────► Rejected(already_used)
//!   ├─ attempt running for secret ───► Rejected(in_progress)
//!   ├─ GET  /api/v1/pair/pending
//!   │    └─ secret not listed ───────► Rejected(unknown_secret)
//!   └─ POST /api/v1/pair/client
//!        ├─ success=false ───────────► Rejected(wrong_pin)   (secret stays usable)
//!        └─ success=true ────────────► Accepted              (client persisted)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use arcadia_pairing::{HttpSidecarClient, PairingConfig, PairingCoordinator};
//! use arcadia_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/var/lib/arcadia/db")?);
//! let client = Arc::new(HttpSidecarClient::new(&PairingConfig::from_env())?);
//! let pairing = PairingCoordinator::new(client, store);
//!
//! let outcome = pairing.pair("secret-from-sidecar", "1234").await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod coordinator;
pub mod error;
pub mod types;

pub use client::{HttpSidecarClient, SidecarClient};
pub use coordinator::PairingCoordinator;
pub use error::{PairingError, Result};
pub use types::{
    ClearReport, PairedClientView, PairingConfig, PairingOutcome, PairingStatus,
    PendingPairing, Pin, RejectReason, SidecarClientInfo,
};

#[cfg(any(test, feature = "test-utils"))]
pub use client::mock::MockSidecarClient;

// Re-export commonly used types from dependencies
pub use arcadia_store::PairedClient;
