//! Session authorization and the reset that ends an archive visit.

use serde::Serialize;
use tracing::info;

/// Route of the public landing page.
pub const PUBLIC_ROOT: &str = "/";

/// The collaborator that owns authorization and routing.
pub trait SessionHost: Send {
    fn is_authorized(&self) -> bool;

    fn set_authorized(&mut self, authorized: bool);

    /// Request navigation to `route`.
    fn navigate(&mut self, route: &str);
}

/// Session kept in memory, recording every navigation request.
#[derive(Debug, Clone, Default)]
pub struct InMemorySession {
    authorized: bool,
    history: Vec<String>,
}

impl InMemorySession {
    #[must_use]
    pub fn new(authorized: bool) -> Self {
        Self {
            authorized,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn authorized() -> Self {
        Self::new(true)
    }

    /// Navigation requests, oldest first.
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

impl SessionHost for InMemorySession {
    fn is_authorized(&self) -> bool {
        self.authorized
    }

    fn set_authorized(&mut self, authorized: bool) {
        self.authorized = authorized;
    }

    fn navigate(&mut self, route: &str) {
        self.history.push(route.to_string());
    }
}

/// Result of a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetOutcome {
    /// Whether authorization was set before the reset.
    pub was_authorized: bool,
    pub route: &'static str,
}

/// Clears authorization and sends the visitor back to the public root.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionReset;

impl SessionReset {
    /// Idempotent; a repeated call only repeats the navigation request.
    pub fn perform<H: SessionHost + ?Sized>(host: &mut H) -> ResetOutcome {
        let was_authorized = host.is_authorized();
        host.set_authorized(false);
        host.navigate(PUBLIC_ROOT);
        info!(was_authorized, route = PUBLIC_ROOT, "Session reset");
        ResetOutcome {
            was_authorized,
            route: PUBLIC_ROOT,
        }
    }
}
