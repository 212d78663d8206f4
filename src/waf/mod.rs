//! Request-inspection subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → gate.rs (allow-list short-circuit, orchestrates scans, 403 on findings)
//!     → scanner.rs (path / query / body scanning)
//!     → patterns.rs (per-category compiled matchers, built once at startup)
//! ```
//!
//! # Design Decisions
//! - No shared mutable state: the registry is immutable, the gate stateless
//! - No adaptive learning or IP reputation; each request judged on its own
//! - Fail safe toward availability: a broken rule is dropped, not fatal

pub mod gate;
pub mod patterns;
pub mod scanner;

pub use gate::{waf_gate, BLOCK_CODE};
pub use patterns::{PatternRegistry, Rule, RuleCategory};
pub use scanner::{RequestScanner, ScanFinding, ScanVerdict};
