//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

pub mod containers;
pub mod downloads;
pub mod games;
pub mod health;
pub mod images;
pub mod maintenance;
pub mod pairing;
pub mod sessions;

use axum::response::sse::Event;
use serde::Serialize;

/// Encode a value as a named SSE event.
pub(crate) fn sse_event<T: Serialize>(name: &'static str, value: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(value)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}
