//! Network layer subsystem.
//!
//! # Responsibilities
//! - Load and pre-validate TLS material for direct termination
//!
//! Plain-HTTP listening is handled by Tokio's `TcpListener` directly in
//! the server; requests served over the TLS listener are what the
//! transport guard treats as its trusted secure-channel flag.

pub mod tls;
