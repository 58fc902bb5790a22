//! Boundary error taxonomy with Sentry integration.
//!
//! Every call across the commerce API boundary fails with an [`ApiError`].
//! Callers branch on [`ApiError::kind`], never on message text.

use thiserror::Error;

/// Structured classification of a boundary failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad credentials, or an expired, invalid or missing token.
    Auth,
    /// Transport failure or timeout.
    Network,
    /// Request rejected by the boundary (bad quantity, unknown line, ...).
    Validation,
    /// Discount code invalid, expired or not applicable.
    Discount,
    /// Any other non-success response.
    Unexpected,
    /// Response body could not be decoded.
    Decode,
}

/// Errors returned by the commerce API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Authentication failed or the token was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Request could not be delivered or timed out.
    #[error("Network error: {0}")]
    Network(String),

    /// Request was rejected by the API.
    #[error("{0}")]
    Validation(String),

    /// Discount code was rejected.
    #[error("{0}")]
    Discount(String),

    /// API answered with an unexpected status.
    #[error("Unexpected response ({status}): {message}")]
    Unexpected {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Response body was malformed.
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Network(_) => ErrorKind::Network,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Discount(_) => ErrorKind::Discount,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Returns true if the failure means "not (or no longer) authenticated".
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self.kind(), ErrorKind::Auth)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart and
/// session actions leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
