//! Error taxonomy for Bulwark
//!
//! This module provides the structured error type shared by every resilience
//! pattern in the crate, together with causal-chain traversal, JSON snapshots
//! and conversions from foreign errors.
//!
//! ## Error Handling Philosophy
//!
//! ### 1. Structured Error Types
//! Every error carries enough structure to be handled without parsing text:
//! - **Identity**: a UUID and a creation timestamp
//! - **Classification**: kind, category, severity and a machine-readable code
//! - **Retryability**: a first-class flag, not inferred from the type
//! - **Cause Chain**: the full chain from the surfaced error to its root cause
//!
//! ### 2. Wrap Once, Propagate Unchanged
//! Foreign errors are wrapped with [`wrap_error`] at the boundary where they
//! are first caught. Wrapping an error that is already part of the taxonomy
//! returns it untouched, so layers above can wrap defensively.
//!
//! ### 3. Trust Boundaries
//! Only [`PublicErrorJson`] may leave the process. The internal snapshot
//! produced by `to_json` carries context and stack traces and is meant for
//! logs only.
//!
//! ## Error Kinds
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ kind           category        severity  status  retryable       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Generic        unknown         MEDIUM    500     no              │
//! │ Validation     validation      LOW       400     no              │
//! │ Configuration  configuration   HIGH      500     no              │
//! │ Network        network         MEDIUM    503     yes             │
//! │ Permission     permission      MEDIUM    403     no              │
//! │ Resource       resource        MEDIUM    404     no              │
//! │ BusinessLogic  business-logic  MEDIUM    422     no              │
//! │ Integration    integration     HIGH      502     yes             │
//! │ Multiple       unknown         max       500     no              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod chain;
pub mod constructors;
pub mod conversions;
pub mod json;
pub mod types;

#[cfg(test)]
mod tests;

pub use chain::ChainLink;
pub use conversions::{is_retryable_error, is_transient_io_error, wrap_error, wrap_error_with};
pub use json::PublicErrorJson;
pub use types::{
    format_errors, BoxError, ErrorCategory, ErrorCause, ErrorContextMap, ErrorKind, ErrorOptions,
    ErrorSeverity, KindDefaults, ResilienceError, Result,
};
