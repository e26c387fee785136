//! Screen flow for the authgate shell.
//!
//! The shell owns the `SessionManager` and picks a screen from its status on
//! every turn of the loop: nothing is shown until `bootstrap()` has resolved,
//! then the auth screen or the welcome screen.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Local;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use authgate_core::{
    AuthMode, Config, IdentityToolkitClient, SessionError, SessionEvent, SessionManager,
    SessionStatus, SystemClock,
};

/// Maximum length for email input.
const MAX_EMAIL_LENGTH: usize = 254;

/// Minimum password length accepted by the identity provider.
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Auth,
    Welcome,
}

impl Screen {
    /// Which screen set a status maps to; `None` while still resolving
    pub fn for_status(status: SessionStatus) -> Option<Self> {
        match status {
            SessionStatus::Unknown => None,
            SessionStatus::Unauthenticated => Some(Screen::Auth),
            SessionStatus::Authenticated => Some(Screen::Welcome),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Authenticate(AuthMode),
    Logout,
    Quit,
}

impl Action {
    /// Parse a menu choice for the given screen
    pub fn parse(screen: Screen, input: &str) -> Option<Self> {
        match (screen, input.trim().to_lowercase().as_str()) {
            (_, "q" | "quit") => Some(Action::Quit),
            (Screen::Auth, "l" | "login") => Some(Action::Authenticate(AuthMode::Login)),
            (Screen::Auth, "s" | "signup") => Some(Action::Authenticate(AuthMode::Register)),
            (Screen::Welcome, "o" | "logout") => Some(Action::Logout),
            _ => None,
        }
    }
}

pub struct App {
    config: Config,
    session: SessionManager,
    exchange: Option<IdentityToolkitClient>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = config.open_store()?;
        let session = SessionManager::new(store, Arc::new(SystemClock), config.session_settings());

        // Missing API key only matters once the user tries to log in
        let exchange = match config.exchange_client() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "Credential exchange unavailable");
                None
            }
        };

        Ok(Self {
            config,
            session,
            exchange,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("Loading...");
        let status = self.session.bootstrap().await;
        debug!(?status, "Bootstrap resolved");

        self.spawn_expiry_notices();

        loop {
            let Some(screen) = Screen::for_status(self.session.status()) else {
                bail!("Session status unresolved after bootstrap");
            };
            let action = match screen {
                Screen::Auth => self.auth_screen().await?,
                Screen::Welcome => self.welcome_screen().await?,
            };

            match action {
                Some(Action::Quit) => return Ok(()),
                Some(Action::Logout) => self.session.logout().await,
                Some(Action::Authenticate(mode)) => self.attempt_login(mode).await?,
                None => println!("Unrecognized choice."),
            }
        }
    }

    fn spawn_expiry_notices(&self) {
        let mut events = self.session.subscribe_events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Expired) => println!("\n{}", SessionError::SessionExpired),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Session event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    async fn auth_screen(&self) -> Result<Option<Action>> {
        println!("\n=== authgate ===");
        println!("[l] Log in   [s] Sign up   [q] Quit");
        let choice = prompt("> ").await?;
        Ok(Action::parse(Screen::Auth, &choice))
    }

    async fn welcome_screen(&self) -> Result<Option<Action>> {
        println!("\n=== Welcome! ===");
        println!("You authenticated successfully!");
        if let Some(deadline) = self.session.watchdog_deadline() {
            println!(
                "Session valid until {}",
                deadline.with_timezone(&Local).format("%H:%M:%S")
            );
        }
        println!("[o] Log out   [q] Quit");
        let choice = prompt("> ").await?;
        Ok(Action::parse(Screen::Welcome, &choice))
    }

    /// Collect credentials and exchange them; rejections are shown, not fatal
    async fn attempt_login(&mut self, mode: AuthMode) -> Result<()> {
        let Some(exchange) = self.exchange.as_ref() else {
            println!("Cannot {}: no API key configured.", mode.display_name().to_lowercase());
            return Ok(());
        };

        println!("\n--- {} ---", mode.display_name());
        let email = match self.config.last_email.as_deref() {
            Some(last) => {
                let input = prompt(format!("Email [{}]: ", last)).await?;
                if input.is_empty() {
                    last.to_string()
                } else {
                    input
                }
            }
            None => prompt("Email: ").await?,
        };
        let password =
            tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: ")).await??;

        if let Err(message) = validate_credentials(mode, &email, &password) {
            println!("Invalid input: {}", message);
            return Ok(());
        }

        println!("Authenticating...");
        match self.session.login(exchange, mode, &email, &password).await {
            Ok(()) => {
                if self.config.last_email.as_deref() != Some(email.as_str()) {
                    self.config.last_email = Some(email);
                    if let Err(e) = self.config.save() {
                        warn!(error = %e, "Failed to save config");
                    }
                }
            }
            Err(SessionError::AuthRejected(reason)) => {
                println!("Authentication failed! {}", reason);
            }
            Err(e) => println!("Authentication failed! {}", e),
        }
        Ok(())
    }
}

/// Print `label` and read one line from stdin off the async workers
async fn prompt(label: impl Into<String>) -> Result<String> {
    let label = label.into();
    let input = tokio::task::spawn_blocking(move || -> io::Result<String> {
        print!("{}", label);
        io::stdout().flush()?;
        read_trimmed(io::stdin().lock())
    })
    .await??;
    Ok(input)
}

fn read_trimmed(mut reader: impl BufRead) -> io::Result<String> {
    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
    }
    Ok(input.trim().to_string())
}

/// Check credentials before sending them to the identity provider
pub fn validate_credentials(mode: AuthMode, email: &str, password: &str) -> Result<(), &'static str> {
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH || !email.contains('@') {
        return Err("please enter a valid email address");
    }
    if email.chars().any(char::is_control) {
        return Err("email contains invalid characters");
    }
    if mode == AuthMode::Register && password.len() < MIN_PASSWORD_LENGTH {
        return Err("password must be at least 6 characters");
    }
    if password.is_empty() {
        return Err("password is required");
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_gated_on_resolved_status() {
        assert_eq!(Screen::for_status(SessionStatus::Unknown), None);
        assert_eq!(Screen::for_status(SessionStatus::Unauthenticated), Some(Screen::Auth));
        assert_eq!(Screen::for_status(SessionStatus::Authenticated), Some(Screen::Welcome));
    }

    #[test]
    fn test_action_parse_per_screen() {
        assert_eq!(
            Action::parse(Screen::Auth, "l"),
            Some(Action::Authenticate(AuthMode::Login))
        );
        assert_eq!(
            Action::parse(Screen::Auth, " SignUp "),
            Some(Action::Authenticate(AuthMode::Register))
        );
        assert_eq!(Action::parse(Screen::Welcome, "o"), Some(Action::Logout));
        assert_eq!(Action::parse(Screen::Welcome, "q"), Some(Action::Quit));
        // Logout is not offered on the auth screen
        assert_eq!(Action::parse(Screen::Auth, "o"), None);
        assert_eq!(Action::parse(Screen::Welcome, "l"), None);
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials(AuthMode::Login, "a@b.c", "x").is_ok());
        assert!(validate_credentials(AuthMode::Login, "", "secret").is_err());
        assert!(validate_credentials(AuthMode::Login, "no-at-sign", "secret").is_err());
        assert!(validate_credentials(AuthMode::Login, "a@b.c", "").is_err());
        assert!(validate_credentials(AuthMode::Register, "a@b.c", "short").is_err());
        assert!(validate_credentials(AuthMode::Register, "a@b.c", "longenough").is_ok());
        assert!(validate_credentials(AuthMode::Login, "a@\nb.c", "x").is_err());
    }

    #[test]
    fn test_read_trimmed_takes_one_line() {
        let input = io::Cursor::new("  user@example.com \nsecond line\n");
        assert_eq!(read_trimmed(input).unwrap(), "user@example.com");
    }

    #[test]
    fn test_read_trimmed_fails_on_closed_input() {
        let err = read_trimmed(io::Cursor::new("")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        // An empty line is still an answer
        assert_eq!(read_trimmed(io::Cursor::new("\n")).unwrap(), "");
    }
}
