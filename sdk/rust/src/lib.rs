//! Client SDK for EMR sessions.
//!
//! Two pieces: a REST client for the session endpoints (`client`) and the
//! session lifecycle controller (`session`) that drives idle detection,
//! proactive token refresh and the forced-logout UI lock.

pub mod client;
pub mod session;

pub use client::{ApiError, RefreshedSession, SessionClient, SESSION_EXPIRED};
pub use session::{SessionApi, SessionConfig, SessionController, SessionSnapshot};
