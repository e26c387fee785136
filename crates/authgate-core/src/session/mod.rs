//! Session lifecycle: token acquisition, persistence, expiry and logout.
//!
//! This module provides:
//! - `SessionManager`: owns the live token, its persisted mirror and the
//!   expiration watchdog
//! - `SessionStatus` / `SessionEvent`: what the UI shell observes
//!
//! Tokens are valid for a fixed client-side window (1 hour by default)
//! measured from when this device first saw them.

pub mod manager;
pub mod types;
mod watchdog;

pub use manager::SessionManager;
pub use types::{SessionEvent, SessionSettings, SessionStatus, TIMESTAMP_KEY, TOKEN_KEY};
