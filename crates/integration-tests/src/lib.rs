//! Integration tests for shopfront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopfront-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_lifecycle` - login, logout, boot restore, token refresh
//! - `cart_sync` - mutate-then-refresh, guest fallback, discount channel, races
//! - `access_gate` - maintenance decision table end to end
//! - `http_boundary` - status classification over a real socket
//!
//! Everything except `http_boundary` runs against the in-memory backend from
//! `shopfront_client::testing`, with tokens persisted to a temporary file so
//! a second [`Fixture::storefront`] behaves like a restarted process.

use std::sync::Arc;

use rust_decimal::Decimal;
use shopfront_client::Storefront;
use shopfront_client::api::NewCartItem;
use shopfront_client::config::RouteConfig;
use shopfront_client::storage::{FileTokenStorage, StoredTokens, TokenStorage};
use shopfront_client::testing::InMemoryCommerce;
use shopfront_core::{Role, UserId, VariantId};
use tempfile::TempDir;

/// Password shared by every seeded account.
pub const PASSWORD: &str = "hunter22";

/// Seeded customer account.
pub const CUSTOMER: &str = "ana@example.com";

/// Seeded admin account.
pub const ADMIN: &str = "root@example.com";

/// $4.50 variant.
pub const MANGO: VariantId = VariantId::new(100);

/// $10.00 variant.
pub const GUAVA: VariantId = VariantId::new(200);

/// 10% off discount code.
pub const SAVE10: &str = "SAVE10";

/// Seeded backend plus durable token storage on disk.
pub struct Fixture {
    pub backend: Arc<InMemoryCommerce>,
    pub storage: Arc<FileTokenStorage>,
    pub customer: UserId,
    pub admin: UserId,
    _dir: TempDir,
}

impl Fixture {
    /// Seed a backend with one customer, one admin, two variants and a code.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let backend = Arc::new(InMemoryCommerce::new());
        let customer = backend.add_user(CUSTOMER, PASSWORD, Role::default());
        let admin = backend.add_user(ADMIN, PASSWORD, Role::Admin);
        backend.add_variant(MANGO, "Mango / 12oz", Decimal::new(450, 2));
        backend.add_variant(GUAVA, "Guava / 12oz", Decimal::new(1000, 2));
        backend.add_discount(SAVE10, Decimal::TEN);

        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let storage = Arc::new(FileTokenStorage::new(dir.path().join("tokens.json")));

        Self {
            backend,
            storage,
            customer,
            admin,
            _dir: dir,
        }
    }

    /// A fresh composition over the shared backend and storage, as a new
    /// process would build it. Not booted.
    #[must_use]
    pub fn storefront(&self) -> Storefront {
        Storefront::from_parts(
            self.backend.clone(),
            self.storage.clone(),
            RouteConfig::default(),
        )
    }

    /// What is currently on disk.
    ///
    /// # Panics
    ///
    /// Panics if the token file is unreadable.
    #[must_use]
    pub fn stored(&self) -> StoredTokens {
        self.storage.load().expect("token file must be readable")
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A cart line input.
#[must_use]
pub const fn item(variant: VariantId, quantity: u32) -> NewCartItem {
    NewCartItem {
        product_variant_id: variant,
        quantity,
    }
}
