//! EMR Security Gateway Library
//!
//! Request-inspection pipeline (HTTPS enforcement + WAF) fronting an EMR
//! backend. The matching client session SDK lives in `sdk/rust`.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod transport;
pub mod waf;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
