//! Per-request cancellation scopes.
//!
//! A scope hook, or the router's handler timeout, derives a [`RequestScope`]
//! for every request. Handlers of routes without parameters then run in their
//! own task, and the router stops waiting for them as soon as the scope's
//! token is cancelled or its deadline passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Request;

/// Derives the scope of a request.
pub type ScopeHook = Arc<dyn Fn(&Request) -> RequestScope + Send + Sync>;

/// Cancellation token plus optional deadline for one request.
///
/// The token handed to the handler (through
/// [`Context::cancellation`](crate::Context::cancellation)) is a child of the
/// scope's token, so cancelling the scope reaches the handler, and the router
/// can cancel the handler without touching a token the host may share.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope bound to an existing token, e.g. one cancelled when the client
    /// disconnects.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Scope expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    #[must_use]
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
