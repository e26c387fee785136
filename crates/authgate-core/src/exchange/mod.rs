//! Credential exchange with the remote identity provider.
//!
//! The session core only needs "credentials in, opaque token out"; the
//! `IdentityToolkitClient` is the reference implementation that talks to an
//! Identity Toolkit style REST endpoint.

pub mod client;

use async_trait::async_trait;

use crate::error::SessionResult;

pub use client::IdentityToolkitClient;

/// Whether the exchange creates a new account or signs in to an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Register,
    Login,
}

impl AuthMode {
    /// Endpoint segment for this mode (`accounts:{segment}`)
    pub fn endpoint(&self) -> &'static str {
        match self {
            AuthMode::Register => "signUp",
            AuthMode::Login => "signInWithPassword",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AuthMode::Register => "Sign up",
            AuthMode::Login => "Log in",
        }
    }
}

/// Exchanges an email and password for a token.
///
/// Fails with `SessionError::AuthRejected` on bad credentials or network
/// failure. Implementations do not retry.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self, mode: AuthMode, email: &str, password: &str) -> SessionResult<String>;
}
