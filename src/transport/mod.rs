//! Transport guard subsystem.
//!
//! # Responsibilities
//! - Decide, per request, whether insecure transport must redirect
//! - Recognize the secure-channel hints a deployment can present
//! - Form the `https://` equivalent of the original URL
//!
//! # Design Decisions
//! - Enforcement is an explicit deployment switch, off by default, so
//!   plain-HTTP development setups keep working
//! - The decision is state-free; nothing is remembered across requests

pub mod guard;

pub use guard::{transport_guard, SecureTransport};
