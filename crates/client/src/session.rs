//! Session store: who the current actor is.
//!
//! # State machine
//!
//! ```text
//! Uninitialized --restore_session--> Loading --profile ok--> Authenticated
//!       |                               \--profile err--> Anonymous (tokens purged)
//!       \--no stored token-------------------------------> Anonymous
//!
//! Authenticated | Anonymous --login/register--> Authenticated
//! Authenticated --logout | rejected refresh----> Anonymous
//! ```
//!
//! Nothing re-enters `Loading` after boot. Tokens are written to durable
//! storage only after the server confirms a login or registration. Every
//! storage write or purge happens inside the same state update as the
//! transition it belongs to, so storage and session never disagree.
//!
//! A token refresh applies only to the session it started from. If that
//! session was replaced or ended while the request was in flight, the result
//! is dropped.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use shopfront_core::Role;

use crate::api::{AccessToken, AuthResponse, CommerceApi, Identity, RefreshToken, TokenPair};
use crate::error::{ApiError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::storage::{StorageError, StoredTokens, TokenStorage};

/// Coarse session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Boot-time restore has not run yet.
    Uninitialized,
    /// A stored token is being verified.
    Loading,
    /// A verified user is signed in.
    Authenticated,
    /// No user is signed in.
    Anonymous,
}

/// Current session.
///
/// A user and an access token exist exactly when the session is
/// authenticated; the enum makes any other combination unrepresentable.
#[derive(Debug, Clone, Default)]
pub enum Session {
    #[default]
    Uninitialized,
    Loading,
    Authenticated {
        user: Identity,
        tokens: TokenPair,
    },
    Anonymous,
}

impl Session {
    /// Coarse status of this session.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        match self {
            Self::Uninitialized => SessionStatus::Uninitialized,
            Self::Loading => SessionStatus::Loading,
            Self::Authenticated { .. } => SessionStatus::Authenticated,
            Self::Anonymous => SessionStatus::Anonymous,
        }
    }

    /// Signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    /// Bearer token for API calls, if signed in.
    #[must_use]
    pub const fn access_token(&self) -> Option<&AccessToken> {
        match self {
            Self::Authenticated { tokens, .. } => Some(&tokens.access_token),
            _ => None,
        }
    }

    /// Refresh token, if signed in and one was issued.
    #[must_use]
    pub const fn refresh_token(&self) -> Option<&RefreshToken> {
        match self {
            Self::Authenticated { tokens, .. } => tokens.refresh_token.as_ref(),
            _ => None,
        }
    }

    /// Returns true if the signed-in user is an admin.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(Identity::is_admin)
    }

    /// Returns true once the session is known (signed in or not).
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Authenticated { .. } | Self::Anonymous)
    }
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The auth boundary rejected the request or could not be reached.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Tokens could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Operation requires a signed-in user.
    #[error("not signed in")]
    NotAuthenticated,

    /// The session carries no refresh token.
    #[error("session has no refresh token")]
    NoRefreshToken,

    /// The session changed while the operation was in flight.
    #[error("session changed while refreshing")]
    Superseded,
}

/// Single source of truth for the current actor.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    api: Arc<dyn CommerceApi>,
    storage: Arc<dyn TokenStorage>,
    state: watch::Sender<Session>,
}

impl SessionStore {
    /// Create an uninitialized store. Call [`Self::restore_session`] once at boot.
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, storage: Arc<dyn TokenStorage>) -> Self {
        let (state, _) = watch::channel(Session::Uninitialized);
        Self {
            inner: Arc::new(SessionStoreInner {
                api,
                storage,
                state,
            }),
        }
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn current(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Current coarse status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status()
    }

    /// Current bearer token, if signed in.
    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.inner.state.borrow().access_token().cloned()
    }

    /// Subscribe to session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` if the credentials are rejected or the
    /// boundary is unreachable, and `SessionError::Storage` if the issued
    /// tokens cannot be persisted. In both cases the session is unchanged.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let response = self.inner.api.login(email, password).await?;
        self.establish(response, "login")
    }

    /// Create an account and sign it in.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::login`].
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<Identity, SessionError> {
        let response = self
            .inner
            .api
            .register(email, password, role.as_ref())
            .await?;
        self.establish(response, "register")
    }

    /// Sign out. Clears both persisted tokens; always succeeds.
    #[instrument(skip(self))]
    pub fn logout(&self) {
        self.end_session(|_| true);
    }

    /// Resolve the persisted session. Runs once per process.
    ///
    /// With a stored access token the session becomes `Loading` while the
    /// profile is fetched; any failure purges both tokens and leaves the
    /// session `Anonymous`. Without one it becomes `Anonymous` directly.
    /// Later calls return the current status without side effects.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> SessionStatus {
        let mut stored: Option<StoredTokens> = None;
        let claimed = self.inner.state.send_if_modified(|session| {
            if !matches!(session, Session::Uninitialized) {
                return false;
            }
            let tokens = self.load_tokens();
            *session = if tokens.access_token.is_some() {
                Session::Loading
            } else {
                Session::Anonymous
            };
            stored = Some(tokens);
            true
        });

        if !claimed {
            debug!("Session already restored");
            return self.status();
        }

        let Some(StoredTokens {
            access_token: Some(access_token),
            refresh_token,
        }) = stored
        else {
            debug!("No stored session");
            return SessionStatus::Anonymous;
        };

        let result = self.inner.api.profile(&access_token).await;

        // A login that completed while the profile was in flight wins.
        let mut outcome = SessionStatus::Anonymous;
        let mut rejected = None;
        self.inner.state.send_if_modified(|session| {
            if !matches!(session, Session::Loading) {
                outcome = session.status();
                return false;
            }
            match &result {
                Ok(user) => {
                    *session = Session::Authenticated {
                        user: user.clone(),
                        tokens: TokenPair {
                            access_token: access_token.clone(),
                            refresh_token: refresh_token.clone(),
                        },
                    };
                    outcome = SessionStatus::Authenticated;
                }
                Err(e) => {
                    self.purge_tokens();
                    *session = Session::Anonymous;
                    rejected = Some(e.clone());
                }
            }
            true
        });

        if let Some(err) = rejected {
            warn!(error = %err, kind = ?err.kind(), "Stored session rejected, discarding tokens");
        } else if let Ok(user) = &result
            && outcome == SessionStatus::Authenticated
        {
            set_sentry_user(&user.id, Some(user.email.as_str()));
            info!(user_id = %user.id, "Session restored");
        }

        outcome
    }

    /// Exchange the refresh token for a new token pair.
    ///
    /// An auth-classified rejection ends the session (`Anonymous`, tokens
    /// purged). Other failures are returned and leave the session as is.
    /// Never retried.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` or `SessionError::NoRefreshToken`
    /// if there is nothing to refresh, `SessionError::Api` if the boundary
    /// fails, `SessionError::Superseded` if a logout or another login replaced
    /// the session meanwhile, and `SessionError::Storage` if the new tokens
    /// cannot be persisted (the in-memory session still switches to them).
    #[instrument(skip(self))]
    pub async fn refresh_tokens(&self) -> Result<(), SessionError> {
        let refresh = {
            let session = self.inner.state.borrow();
            if !matches!(*session, Session::Authenticated { .. }) {
                return Err(SessionError::NotAuthenticated);
            }
            session
                .refresh_token()
                .cloned()
                .ok_or(SessionError::NoRefreshToken)?
        };

        let mut tokens = match self.inner.api.refresh_session(&refresh).await {
            Ok(tokens) => tokens,
            Err(e) if e.is_auth() => {
                if self.end_session(|session| holds_refresh(session, &refresh)) {
                    warn!(error = %e, "Refresh token rejected, session ended");
                } else {
                    debug!(error = %e, "Refresh token rejected for a replaced session");
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh.clone());
        }

        let mut persisted = Ok(());
        let applied = self.inner.state.send_if_modified(|session| {
            if !holds_refresh(session, &refresh) {
                return false;
            }
            persisted = self.inner.storage.save(&tokens);
            if let Session::Authenticated { tokens: current, .. } = session {
                *current = tokens;
            }
            true
        });

        if !applied {
            debug!("Session replaced while refreshing, dropping new tokens");
            return Err(SessionError::Superseded);
        }
        debug!("Session tokens refreshed");
        persisted.map_err(SessionError::from)
    }

    fn establish(&self, response: AuthResponse, action: &str) -> Result<Identity, SessionError> {
        let AuthResponse { tokens, user } = response;

        let mut persisted = Ok(());
        self.inner.state.send_if_modified(|session| {
            persisted = self.inner.storage.save(&tokens);
            if persisted.is_err() {
                return false;
            }
            *session = Session::Authenticated {
                user: user.clone(),
                tokens,
            };
            true
        });
        persisted?;

        set_sentry_user(&user.id, Some(user.email.as_str()));
        let user_id = user.id.to_string();
        add_breadcrumb("session", action, Some(&[("user_id", user_id.as_str())]));
        info!(user_id = %user.id, action, "Signed in");
        Ok(user)
    }

    /// Purge tokens and go `Anonymous` if `current` accepts the session.
    fn end_session(&self, current: impl FnOnce(&Session) -> bool) -> bool {
        let ended = self.inner.state.send_if_modified(|session| {
            if !current(session) {
                return false;
            }
            self.purge_tokens();
            *session = Session::Anonymous;
            true
        });

        if ended {
            clear_sentry_user();
            add_breadcrumb("session", "Signed out", None);
            info!("Signed out");
        }
        ended
    }

    fn load_tokens(&self) -> StoredTokens {
        match self.inner.storage.load() {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Unreadable token storage, treating as signed out");
                self.purge_tokens();
                StoredTokens::default()
            }
        }
    }

    fn purge_tokens(&self) {
        if let Err(e) = self.inner.storage.clear() {
            warn!(error = %e, "Failed to clear persisted tokens");
        }
    }
}

/// Returns true if `session` is still the one holding `refresh`.
fn holds_refresh(session: &Session, refresh: &RefreshToken) -> bool {
    session
        .refresh_token()
        .is_some_and(|held| held.expose() == refresh.expose())
}
