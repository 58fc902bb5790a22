//! Wire types for the commerce API.
//!
//! These mirror the JSON bodies exchanged with the backend (camelCase
//! field names). Amounts are `Decimal` and are never recomputed locally.

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use shopfront_core::{CartItemId, Email, Role, UserId, VariantId};

// =============================================================================
// Tokens
// =============================================================================

/// Bearer token sent with authenticated requests.
///
/// The secret is redacted from `Debug` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "String")]
pub struct AccessToken(SecretString);

/// Long-lived token exchanged for a new access token.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "String")]
pub struct RefreshToken(SecretString);

impl AccessToken {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token for transport or storage.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl RefreshToken {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token for transport or storage.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<String> for RefreshToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

/// Access and refresh token issued together by the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Bearer token for API calls.
    pub access_token: AccessToken,
    /// Refresh token, if the backend issued one.
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
}

// =============================================================================
// Identity
// =============================================================================

/// The authenticated user as reported by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// User ID.
    pub id: UserId,
    /// Account email.
    pub email: Email,
    /// Account role; absent means a regular customer.
    #[serde(default)]
    pub role: Role,
    /// First name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Identity {
    /// Returns true if this identity may access admin routes.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Name to greet the user with, falling back to the email.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            _ => self.email.to_string(),
        }
    }
}

/// Body of a successful login or registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Issued tokens.
    #[serde(flatten)]
    pub tokens: TokenPair,
    /// Authenticated user.
    pub user: Identity,
}

/// Body of `GET /auth/profile`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    /// The token's owner.
    pub user: Identity,
}

/// Login or registration request.
#[derive(Debug, Serialize)]
pub struct CredentialsRequest<'a> {
    /// Account email.
    pub email: &'a str,
    /// Account password.
    pub password: &'a str,
    /// Requested role (registration only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'a Role>,
}

/// Token refresh request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    /// Raw refresh token.
    pub refresh_token: &'a str,
}

// =============================================================================
// Cart
// =============================================================================

/// Reference to the product variant a cart line holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRef {
    /// Variant ID.
    pub id: VariantId,
    /// Display name (e.g., "Mango / 12oz").
    #[serde(default)]
    pub name: Option<String>,
    /// SKU.
    #[serde(default)]
    pub sku: Option<String>,
}

/// A line item in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Cart line ID.
    pub id: CartItemId,
    /// Product variant.
    pub product_variant: VariantRef,
    /// Quantity (at least 1).
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Line total as computed by the server.
    pub line_total: Decimal,
}

/// Server-authoritative cart state.
///
/// The client replaces its copy wholesale on every refresh; totals are
/// never computed or patched locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Lines in server order.
    pub items: Vec<CartLine>,
    /// Sum of line quantities.
    pub total_items: u32,
    /// Total before discounts.
    pub subtotal: Decimal,
    /// Discount applied to the subtotal.
    pub discount_amount: Decimal,
    /// `subtotal - discount_amount`.
    pub total_price: Decimal,
}

impl CartSnapshot {
    /// The guest cart: no lines, all totals zero.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the cart has no lines.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a line by ID.
    #[must_use]
    pub fn line(&self, id: CartItemId) -> Option<&CartLine> {
        self.items.iter().find(|line| line.id == id)
    }

    /// Check the totals relationships the server guarantees.
    ///
    /// `total_price = subtotal - discount_amount` and
    /// `total_items = sum of line quantities`. Used for diagnostics only.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let quantity: u64 = self.items.iter().map(|line| u64::from(line.quantity)).sum();
        self.total_price == self.subtotal - self.discount_amount
            && quantity == u64::from(self.total_items)
    }
}

/// Body of `GET /cart/count`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CartCount {
    /// Number of items in the cart.
    pub count: u32,
}

/// Input for adding a line to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartItem {
    /// Product variant to add.
    pub product_variant_id: VariantId,
    /// Quantity to add.
    pub quantity: u32,
}

/// Body of `PATCH /cart/items/{id}`.
#[derive(Debug, Serialize)]
pub struct QuantityUpdate {
    /// New quantity.
    pub quantity: u32,
}

// =============================================================================
// Discounts
// =============================================================================

/// Body of `POST /cart/discount`.
#[derive(Debug, Serialize)]
pub struct DiscountRequest<'a> {
    /// Discount code as typed by the shopper.
    pub code: &'a str,
}

/// Result of applying a discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountResult {
    /// The accepted code.
    pub code: String,
    /// Amount the code takes off the current subtotal.
    pub discount_amount: Decimal,
    /// Optional message from the backend (e.g., "10% off applied").
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Maintenance
// =============================================================================

/// Body of `GET /maintenance-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceStatus {
    /// Whether the storefront is in maintenance mode.
    pub maintenance_active: bool,
}
