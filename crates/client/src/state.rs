//! Root composition shared across the front-end.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::api::{CommerceApi, HttpCommerceApi};
use crate::cart::CartSynchronizer;
use crate::config::{ClientConfig, RouteConfig};
use crate::error::ApiError;
use crate::gate::{AccessDecision, AccessGate};
use crate::session::SessionStore;
use crate::storage::{FileTokenStorage, TokenStorage};

/// Session, cart and access gate wired over one API boundary.
///
/// This struct is cheaply cloneable via `Arc`. The cart and the gate read
/// session state through a subscription; neither touches token storage.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    session: SessionStore,
    cart: CartSynchronizer,
    gate: AccessGate,
}

impl Storefront {
    /// Build the HTTP-backed composition from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let api: Arc<dyn CommerceApi> = Arc::new(HttpCommerceApi::new(&config.api)?);
        let storage: Arc<dyn TokenStorage> = Arc::new(FileTokenStorage::new(&config.token_file));
        Ok(Self::from_parts(api, storage, config.routes.clone()))
    }

    /// Wire the composition over an arbitrary boundary and storage.
    #[must_use]
    pub fn from_parts(
        api: Arc<dyn CommerceApi>,
        storage: Arc<dyn TokenStorage>,
        routes: RouteConfig,
    ) -> Self {
        let session = SessionStore::new(api.clone(), storage);
        let cart = CartSynchronizer::new(api.clone(), session.subscribe());
        let gate = AccessGate::new(api, routes);

        Self {
            inner: Arc::new(StorefrontInner {
                session,
                cart,
                gate,
            }),
        }
    }

    /// Get a reference to the session store.
    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Get a reference to the cart synchronizer.
    #[must_use]
    pub fn cart(&self) -> &CartSynchronizer {
        &self.inner.cart
    }

    /// Get a reference to the access gate.
    #[must_use]
    pub fn gate(&self) -> &AccessGate {
        &self.inner.gate
    }

    /// Startup sequence: restore the session and fetch maintenance status
    /// concurrently, then fetch the cart for whoever the session resolved to.
    #[instrument(skip(self))]
    pub async fn boot(&self) {
        let (status, maintenance) = tokio::join!(
            self.inner.session.restore_session(),
            self.inner.gate.resolve_maintenance()
        );
        self.inner.cart.refresh().await;
        info!(?status, ?maintenance, "Storefront booted");
    }

    /// Access decision for `path` given the current session and maintenance state.
    #[must_use]
    pub fn decide(&self, path: &str) -> AccessDecision {
        self.inner
            .gate
            .evaluate(&self.inner.session.current(), path)
    }

    /// Refresh the cart whenever the signed-in user changes (login, logout,
    /// a different account). Token rotation for the same user is ignored.
    ///
    /// The task ends when the session store is dropped.
    pub fn spawn_session_sync(&self) -> JoinHandle<()> {
        let mut changes = self.inner.session.subscribe();
        let cart = self.inner.cart.clone();

        tokio::spawn(async move {
            let mut last = changes.borrow_and_update().user().map(|u| u.id);
            while changes.changed().await.is_ok() {
                let current = changes.borrow_and_update().user().map(|u| u.id);
                if current != last {
                    tracing::debug!(?current, "Signed-in user changed, refreshing cart");
                    last = current;
                    cart.refresh().await;
                }
            }
        })
    }

    /// Re-poll maintenance status every `every` in the background.
    pub fn spawn_maintenance_poll(&self, every: Duration) -> JoinHandle<()> {
        let gate = self.inner.gate.clone();
        tokio::spawn(async move { gate.poll(every).await })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use shopfront_core::{Role, VariantId};

    use super::*;
    use crate::api::NewCartItem;
    use crate::gate::MaintenanceState;
    use crate::session::SessionStatus;
    use crate::storage::{MemoryTokenStorage, keys};
    use crate::testing::InMemoryCommerce;

    #[tokio::test]
    async fn test_boot_restores_session_and_cart() {
        let backend = Arc::new(InMemoryCommerce::new());
        let user = backend.add_user("ana@example.com", "hunter22", Role::default());
        backend.add_variant(VariantId::new(1), "Mango", Decimal::new(450, 2));
        let tokens = backend.issue_tokens(user);
        let item = NewCartItem {
            product_variant_id: VariantId::new(1),
            quantity: 2,
        };
        backend
            .add_cart_item(Some(&tokens.access_token), &item)
            .await
            .unwrap();

        let storage = Arc::new(MemoryTokenStorage::with_entries([(
            keys::ACCESS_TOKEN,
            tokens.access_token.expose(),
        )]));
        let storefront = Storefront::from_parts(backend, storage, RouteConfig::default());
        assert_eq!(storefront.decide("/"), AccessDecision::Placeholder);

        storefront.boot().await;

        assert_eq!(storefront.session().status(), SessionStatus::Authenticated);
        assert_eq!(storefront.gate().maintenance(), MaintenanceState::Inactive);
        assert_eq!(storefront.cart().state().count, 2);
        assert_eq!(storefront.decide("/products"), AccessDecision::Render);
    }

    #[tokio::test]
    async fn test_session_sync_refreshes_cart_on_login_and_logout() {
        let backend = Arc::new(InMemoryCommerce::new());
        let user = backend.add_user("ana@example.com", "hunter22", Role::default());
        backend.add_variant(VariantId::new(1), "Mango", Decimal::ONE);
        let tokens = backend.issue_tokens(user);
        let item = NewCartItem {
            product_variant_id: VariantId::new(1),
            quantity: 3,
        };
        backend
            .add_cart_item(Some(&tokens.access_token), &item)
            .await
            .unwrap();

        let storefront = Storefront::from_parts(
            backend,
            Arc::new(MemoryTokenStorage::new()),
            RouteConfig::default(),
        );
        storefront.boot().await;
        let sync = storefront.spawn_session_sync();
        let mut cart = storefront.cart().subscribe();

        storefront
            .session()
            .login("ana@example.com", "hunter22")
            .await
            .unwrap();
        cart.wait_for(|state| state.count == 3).await.unwrap();

        storefront.session().logout();
        cart.wait_for(|state| state.count == 0 && !state.is_loading())
            .await
            .unwrap();
        assert!(storefront.cart().state().snapshot.is_empty());

        sync.abort();
    }
}
