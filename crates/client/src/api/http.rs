//! `reqwest` implementation of the commerce API boundary.
//!
//! Bodies are read as text first for better error diagnostics, then decoded.
//! Non-success statuses are classified into [`ApiError`] variants by status
//! code and endpoint, never by message text.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use shopfront_core::{CartItemId, Role};

use super::CommerceApi;
use super::types::{
    AccessToken, AuthResponse, CartCount, CartSnapshot, CredentialsRequest, DiscountRequest,
    DiscountResult, Identity, MaintenanceStatus, NewCartItem, ProfileResponse, QuantityUpdate,
    RefreshRequest, RefreshToken, TokenPair,
};
use crate::config::ApiConfig;
use crate::error::ApiError;

/// Maximum characters of a response body copied into logs.
const LOG_BODY_LIMIT: usize = 500;

/// Which error channel a non-success response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    General,
    Discount,
}

/// Client for the commerce REST API.
#[derive(Clone)]
pub struct HttpCommerceApi {
    inner: Arc<HttpCommerceApiInner>,
}

struct HttpCommerceApiInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCommerceApi {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the HTTP client cannot be built
    /// (e.g., TLS backend initialization fails).
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: Arc::new(HttpCommerceApiInner {
                client: builder.build()?,
                base_url: config.base_url.clone(),
            }),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&AccessToken>,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self
            .inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Decode(format!("invalid endpoint path {path}: {e}")))?;

        let builder = self.inner.client.request(method, url);
        Ok(match token {
            Some(token) => builder.bearer_auth(token.expose()),
            None => builder,
        })
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder, channel: Channel) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let message = error_message(status, &body);
        let err = classify(status, message, channel);
        if err.is_auth() {
            debug!(status = %status, "API rejected credentials");
        } else {
            tracing::error!(
                status = %status,
                body = %body.chars().take(LOG_BODY_LIMIT).collect::<String>(),
                "API returned non-success status"
            );
        }
        Err(err)
    }

    /// Send a request and decode a JSON body.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        channel: Channel,
    ) -> Result<T, ApiError> {
        let body = self.send(request, channel).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(LOG_BODY_LIMIT).collect::<String>(),
                "Failed to parse API response"
            );
            ApiError::from(e)
        })
    }

    /// Send a request whose response body carries no data.
    async fn execute_void(
        &self,
        request: RequestBuilder,
        channel: Channel,
    ) -> Result<(), ApiError> {
        self.send(request, channel).await.map(drop)
    }
}

#[async_trait]
impl CommerceApi for HttpCommerceApi {
    #[instrument(skip(self, password))]
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = CredentialsRequest {
            email,
            password,
            role: None,
        };
        let request = self.request(Method::POST, "auth/login", None)?.json(&body);
        self.execute(request, Channel::General).await
    }

    #[instrument(skip(self, password))]
    async fn register(
        &self,
        email: &str,
        password: &str,
        role: Option<&Role>,
    ) -> Result<AuthResponse, ApiError> {
        let body = CredentialsRequest {
            email,
            password,
            role,
        };
        let request = self.request(Method::POST, "auth/register", None)?.json(&body);
        self.execute(request, Channel::General).await
    }

    #[instrument(skip_all)]
    async fn profile(&self, token: &AccessToken) -> Result<Identity, ApiError> {
        let request = self.request(Method::GET, "auth/profile", Some(token))?;
        let profile: ProfileResponse = self.execute(request, Channel::General).await?;
        Ok(profile.user)
    }

    #[instrument(skip_all)]
    async fn refresh_session(&self, refresh: &RefreshToken) -> Result<TokenPair, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh.expose(),
        };
        let request = self.request(Method::POST, "auth/refresh", None)?.json(&body);
        self.execute(request, Channel::General).await
    }

    #[instrument(skip_all)]
    async fn get_cart(&self, token: Option<&AccessToken>) -> Result<CartSnapshot, ApiError> {
        let request = self.request(Method::GET, "cart", token)?;
        self.execute(request, Channel::General).await
    }

    #[instrument(skip_all)]
    async fn get_cart_count(&self, token: Option<&AccessToken>) -> Result<u32, ApiError> {
        let request = self.request(Method::GET, "cart/count", token)?;
        let count: CartCount = self.execute(request, Channel::General).await?;
        Ok(count.count)
    }

    #[instrument(skip(self, token, item), fields(variant_id = %item.product_variant_id, quantity = item.quantity))]
    async fn add_cart_item(
        &self,
        token: Option<&AccessToken>,
        item: &NewCartItem,
    ) -> Result<(), ApiError> {
        let request = self.request(Method::POST, "cart/items", token)?.json(item);
        self.execute_void(request, Channel::General).await
    }

    #[instrument(skip(self, token))]
    async fn update_cart_item(
        &self,
        token: Option<&AccessToken>,
        id: CartItemId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let path = format!("cart/items/{id}");
        let request = self
            .request(Method::PATCH, &path, token)?
            .json(&QuantityUpdate { quantity });
        self.execute_void(request, Channel::General).await
    }

    #[instrument(skip(self, token))]
    async fn remove_cart_item(
        &self,
        token: Option<&AccessToken>,
        id: CartItemId,
    ) -> Result<(), ApiError> {
        let path = format!("cart/items/{id}");
        let request = self.request(Method::DELETE, &path, token)?;
        self.execute_void(request, Channel::General).await
    }

    #[instrument(skip_all)]
    async fn clear_cart(&self, token: Option<&AccessToken>) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, "cart", token)?;
        self.execute_void(request, Channel::General).await
    }

    #[instrument(skip(self, token))]
    async fn apply_discount(
        &self,
        token: Option<&AccessToken>,
        code: &str,
    ) -> Result<DiscountResult, ApiError> {
        let request = self
            .request(Method::POST, "cart/discount", token)?
            .json(&DiscountRequest { code });
        self.execute(request, Channel::Discount).await
    }

    #[instrument(skip_all)]
    async fn remove_discount(&self, token: Option<&AccessToken>) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, "cart/discount", token)?;
        self.execute_void(request, Channel::Discount).await
    }

    #[instrument(skip_all)]
    async fn maintenance_status(&self) -> Result<MaintenanceStatus, ApiError> {
        let request = self.request(Method::GET, "maintenance-status", None)?;
        self.execute(request, Channel::General).await
    }
}

// =============================================================================
// Error Classification
// =============================================================================

/// Error body shape: `{ "message": "..." }` or `{ "message": ["...", "..."] }`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Extract a human-readable message from an error response body.
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<ErrorBody>(body).ok().and_then(|b| {
        let message = match b.message {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        };
        message.or(b.error).filter(|m| !m.is_empty())
    });

    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        } else {
            trimmed.chars().take(200).collect()
        }
    })
}

/// Map a non-success status to the error taxonomy.
fn classify(status: StatusCode, message: String, channel: Channel) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::CONFLICT
        | StatusCode::GONE
        | StatusCode::UNPROCESSABLE_ENTITY => match channel {
            Channel::Discount => ApiError::Discount(message),
            Channel::General => ApiError::Validation(message),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiError::Network(message),
        _ => ApiError::Unexpected {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_string() {
        let msg = error_message(
            StatusCode::BAD_REQUEST,
            r#"{"message":"Quantity must be positive"}"#,
        );
        assert_eq!(msg, "Quantity must be positive");
    }

    #[test]
    fn test_error_message_array() {
        let msg = error_message(
            StatusCode::BAD_REQUEST,
            r#"{"message":["email must be an email","password too short"],"error":"Bad Request"}"#,
        );
        assert_eq!(msg, "email must be an email; password too short");
    }

    #[test]
    fn test_error_message_falls_back_to_error_field() {
        let msg = error_message(StatusCode::UNAUTHORIZED, r#"{"error":"Unauthorized"}"#);
        assert_eq!(msg, "Unauthorized");
    }

    #[test]
    fn test_error_message_plain_and_empty_bodies() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }

    #[test]
    fn test_classify_auth_statuses() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = classify(status, "Invalid token".to_string(), Channel::General);
            assert!(err.is_auth());
            let err = classify(status, "Invalid token".to_string(), Channel::Discount);
            assert!(err.is_auth());
        }
    }

    #[test]
    fn test_classify_rejections_by_channel() {
        let err = classify(
            StatusCode::NOT_FOUND,
            "Unknown code".to_string(),
            Channel::Discount,
        );
        assert_eq!(err, ApiError::Discount("Unknown code".to_string()));

        let err = classify(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Bad quantity".to_string(),
            Channel::General,
        );
        assert_eq!(err, ApiError::Validation("Bad quantity".to_string()));
    }

    #[test]
    fn test_classify_server_errors_are_not_auth() {
        let err = classify(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication failed".to_string(),
            Channel::General,
        );
        assert!(!err.is_auth());
        assert!(matches!(err, ApiError::Unexpected { status: 500, .. }));
    }

    #[test]
    fn test_request_urls_join_base_path() {
        let config = ApiConfig::from_base_url("http://localhost:4000/api", None).unwrap();
        let api = HttpCommerceApi::new(&config).unwrap();
        let request = api
            .request(Method::GET, "/cart/count", None)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:4000/api/cart/count");
        assert!(request.headers().get("authorization").is_none());

        let token = AccessToken::new("abc");
        let request = api
            .request(Method::DELETE, "cart/items/4", Some(&token))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.method(), &Method::DELETE);
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer abc"
        );
    }
}
