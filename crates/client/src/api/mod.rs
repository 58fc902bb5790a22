//! Commerce API boundary.
//!
//! # Architecture
//!
//! - [`CommerceApi`] is the only way the client talks to the backend
//! - The backend is the source of truth for carts and totals - NO local arithmetic
//! - Authenticated calls take the bearer token explicitly; the boundary never
//!   reads session state on its own
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | login | `POST /auth/login` |
//! | register | `POST /auth/register` |
//! | profile | `GET /auth/profile` |
//! | refresh session | `POST /auth/refresh` |
//! | cart snapshot / count | `GET /cart`, `GET /cart/count` |
//! | add / update / remove line | `POST /cart/items`, `PATCH /cart/items/{id}`, `DELETE /cart/items/{id}` |
//! | clear cart | `DELETE /cart` |
//! | apply / remove discount | `POST /cart/discount`, `DELETE /cart/discount` |
//! | maintenance status | `GET /maintenance-status` |

mod http;
pub mod types;

pub use http::HttpCommerceApi;
pub use types::*;

use async_trait::async_trait;

use shopfront_core::{CartItemId, Role};

use crate::error::ApiError;

/// Request/response boundary to the commerce backend.
///
/// Implementations perform exactly one request per call and never retry.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Exchange credentials for tokens and the user's identity.
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    /// Create an account and sign it in.
    async fn register(
        &self,
        email: &str,
        password: &str,
        role: Option<&Role>,
    ) -> Result<AuthResponse, ApiError>;

    /// Fetch the identity owning an access token.
    async fn profile(&self, token: &AccessToken) -> Result<Identity, ApiError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh_session(&self, refresh: &RefreshToken) -> Result<TokenPair, ApiError>;

    /// Fetch the full cart snapshot.
    async fn get_cart(&self, token: Option<&AccessToken>) -> Result<CartSnapshot, ApiError>;

    /// Fetch the cart item count.
    async fn get_cart_count(&self, token: Option<&AccessToken>) -> Result<u32, ApiError>;

    /// Add a line to the cart.
    async fn add_cart_item(
        &self,
        token: Option<&AccessToken>,
        item: &NewCartItem,
    ) -> Result<(), ApiError>;

    /// Set the quantity of a cart line.
    async fn update_cart_item(
        &self,
        token: Option<&AccessToken>,
        id: CartItemId,
        quantity: u32,
    ) -> Result<(), ApiError>;

    /// Remove a cart line.
    async fn remove_cart_item(
        &self,
        token: Option<&AccessToken>,
        id: CartItemId,
    ) -> Result<(), ApiError>;

    /// Remove every line from the cart.
    async fn clear_cart(&self, token: Option<&AccessToken>) -> Result<(), ApiError>;

    /// Apply a discount code to the cart.
    async fn apply_discount(
        &self,
        token: Option<&AccessToken>,
        code: &str,
    ) -> Result<DiscountResult, ApiError>;

    /// Remove the applied discount code.
    async fn remove_discount(&self, token: Option<&AccessToken>) -> Result<(), ApiError>;

    /// Fetch whether the storefront is in maintenance mode.
    async fn maintenance_status(&self) -> Result<MaintenanceStatus, ApiError>;
}
