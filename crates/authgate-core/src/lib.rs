//! authgate-core - client-side authentication session lifecycle.
//!
//! Obtains a token from an identity provider, mirrors it to durable storage,
//! restores it on the next launch while it is still inside its validity
//! window, and forces a logout when the window elapses.
//!
//! The UI shell owns one [`SessionManager`], calls [`SessionManager::bootstrap`]
//! once at startup and gates its first screen on the resulting status.

pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, StoreBackend};
pub use error::{SessionError, SessionResult};
pub use exchange::{AuthMode, CredentialExchange, IdentityToolkitClient};
pub use session::{SessionEvent, SessionManager, SessionSettings, SessionStatus};
pub use store::{DurableStore, FileStore, KeyringStore, MemoryStore};
