//! WebSocket transport adapter (spec §4.A, realized).
//!
//! One route, `GET /sync`, upgraded to a WebSocket via `axum`. Each
//! accepted connection runs as its own `tokio` task — the "worker" in the
//! spec's worker-pool model — and is torn down independently of every
//! other connection.

pub mod ws;

pub use ws::{serve, SessionSink};
