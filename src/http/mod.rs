//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (correlation ID)
//!     → transport guard → WAF gate
//!     → server.rs forward_handler (EMR backend)
//! ```

pub mod request;
pub mod server;

pub use request::{RequestId, RequestIdLayer, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
