//! Authenticated session state.

use crate::transport::Transport;
use time::OffsetDateTime;

/// Identity details harvested from the post-login landing page.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Portal company the account belongs to, when the landing page
    /// exposes it.
    pub company_id: Option<String>,
    /// Display name the portal greets the account with.
    pub login_user: Option<String>,
}

/// A live portal session: the cookie-carrying transport plus the
/// anti-forgery token harvested at login.
///
/// Handles are cheap to clone; clones share the underlying cookie jar.
/// Dropping every clone ends the session as far as this process is
/// concerned, though the portal-side cookie simply expires on its own.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    transport: Transport,
    verification_token: String,
    context: SessionContext,
    acquired_at: OffsetDateTime,
}

impl SessionHandle {
    pub(crate) fn new(
        transport: Transport,
        verification_token: String,
        context: SessionContext,
    ) -> Self {
        Self {
            transport,
            verification_token,
            context,
            acquired_at: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Anti-forgery token captured at login. Chart pages carry fresher
    /// tokens which take precedence for bridge calls.
    #[must_use]
    pub fn verification_token(&self) -> &str {
        &self.verification_token
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// How long ago the session was negotiated. Informational; the
    /// portal signals expiry through login redirects, never a timer.
    #[must_use]
    pub fn age(&self) -> time::Duration {
        OffsetDateTime::now_utc() - self.acquired_at
    }
}
