//! Cart synchronizer.
//!
//! Keeps a local copy of the server-authoritative cart under a
//! mutate-then-refetch discipline: every mutation issues its own request and,
//! only once that succeeds, a full refresh whose result replaces local state
//! wholesale. Totals are never computed here.
//!
//! Two error channels are kept apart. The general channel covers fetches and
//! line mutations; the discount channel covers discount codes, so a rejected
//! code never blanks the cart view.
//!
//! Independent mutations fired back to back may race their refreshes. The
//! last refresh to resolve wins; a later refresh always reconciles with the
//! server. A refresh that resolves after the signed-in user changed is
//! dropped, so one account's cart is never shown under another session.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::instrument;

use shopfront_core::{CartItemId, UserId};

use crate::api::{AccessToken, CartSnapshot, CommerceApi, DiscountResult, NewCartItem};
use crate::error::{ApiError, add_breadcrumb};
use crate::session::Session;

/// State of the discount-code channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscountState {
    /// Message from the last failed discount operation.
    pub error: Option<String>,
    in_flight: usize,
}

impl DiscountState {
    /// Returns true while a discount operation is pending.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }
}

/// Read-only view of the cart as last fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    /// Last snapshot received from the server.
    pub snapshot: CartSnapshot,
    /// Item count as reported by the count endpoint.
    pub count: u32,
    /// General error channel: last failed fetch or mutation.
    pub error: Option<String>,
    /// Discount channel.
    pub discount: DiscountState,
    in_flight: usize,
}

impl CartState {
    /// Returns true while a refresh is pending.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }
}

/// Owner of the local cart state.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct CartSynchronizer {
    inner: Arc<CartInner>,
}

struct CartInner {
    api: Arc<dyn CommerceApi>,
    session: watch::Receiver<Session>,
    state: watch::Sender<CartState>,
}

impl CartSynchronizer {
    /// Create a synchronizer reading the bearer token from `session`.
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, session: watch::Receiver<Session>) -> Self {
        let (state, _) = watch::channel(CartState::default());
        Self {
            inner: Arc::new(CartInner {
                api,
                session,
                state,
            }),
        }
    }

    /// Snapshot of the current cart state.
    #[must_use]
    pub fn state(&self) -> CartState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to cart state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }

    fn token(&self) -> Option<AccessToken> {
        self.inner.session.borrow().access_token().cloned()
    }

    fn owner(&self) -> Option<UserId> {
        self.inner.session.borrow().user().map(|user| user.id)
    }

    /// Fetch snapshot and count concurrently and replace local state.
    ///
    /// An auth-classified failure is the normal guest state: the cart resets
    /// to empty and no error is shown. Any other failure is surfaced in the
    /// general channel and the previous snapshot stays visible.
    #[instrument(skip(self))]
    pub async fn refresh(&self) {
        let (owner, token) = (self.owner(), self.token());
        self.inner.state.send_modify(|s| s.in_flight += 1);

        let api = &self.inner.api;
        let result = tokio::try_join!(
            api.get_cart(token.as_ref()),
            api.get_cart_count(token.as_ref())
        );

        if self.owner() != owner {
            tracing::debug!("Signed-in user changed during refresh, dropping result");
            self.inner
                .state
                .send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));
            return;
        }

        match &result {
            Ok((snapshot, _)) if !snapshot.is_consistent() => {
                tracing::warn!("Cart totals from server do not add up");
            }
            Err(e) if e.is_auth() => tracing::debug!("No authenticated cart, using guest cart"),
            Err(e) => tracing::warn!("Failed to refresh cart: {e}"),
            Ok(_) => {}
        }

        self.inner.state.send_modify(move |s| {
            s.in_flight = s.in_flight.saturating_sub(1);
            match result {
                Ok((snapshot, count)) => {
                    s.snapshot = snapshot;
                    s.count = count;
                    s.error = None;
                }
                Err(e) if e.is_auth() => {
                    s.snapshot = CartSnapshot::empty();
                    s.count = 0;
                    s.error = None;
                }
                Err(e) => s.error = Some(e.to_string()),
            }
        });
    }

    /// Add a line, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the boundary error if the add fails; no refresh is attempted.
    #[instrument(skip(self, item), fields(variant_id = %item.product_variant_id, quantity = item.quantity))]
    pub async fn add_to_cart(&self, item: NewCartItem) -> Result<(), ApiError> {
        let token = self.token();
        let result = self.inner.api.add_cart_item(token.as_ref(), &item).await;
        self.settle("Added to cart", result).await
    }

    /// Set a line's quantity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the boundary error if the update fails; no refresh is attempted.
    #[instrument(skip(self))]
    pub async fn update_cart_item(&self, id: CartItemId, quantity: u32) -> Result<(), ApiError> {
        let token = self.token();
        let result = self
            .inner
            .api
            .update_cart_item(token.as_ref(), id, quantity)
            .await;
        self.settle("Updated cart quantity", result).await
    }

    /// Remove a line, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the boundary error if the removal fails; no refresh is attempted.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, id: CartItemId) -> Result<(), ApiError> {
        let token = self.token();
        let result = self.inner.api.remove_cart_item(token.as_ref(), id).await;
        self.settle("Removed from cart", result).await
    }

    /// Remove every line, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the boundary error if the clear fails; no refresh is attempted.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), ApiError> {
        let token = self.token();
        let result = self.inner.api.clear_cart(token.as_ref()).await;
        self.settle("Cleared cart", result).await
    }

    /// Apply a discount code, then refresh for the new totals.
    ///
    /// # Errors
    ///
    /// Returns the boundary error if the code is rejected. Only the discount
    /// channel records it.
    #[instrument(skip(self))]
    pub async fn apply_discount(&self, code: &str) -> Result<DiscountResult, ApiError> {
        let token = self.token();
        self.begin_discount();
        let result = self.inner.api.apply_discount(token.as_ref(), code).await;
        self.settle_discount("Applied discount", result).await
    }

    /// Remove the applied discount code, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the boundary error if the removal fails. Only the discount
    /// channel records it.
    #[instrument(skip(self))]
    pub async fn remove_discount(&self) -> Result<(), ApiError> {
        let token = self.token();
        self.begin_discount();
        let result = self.inner.api.remove_discount(token.as_ref()).await;
        self.settle_discount("Removed discount", result).await
    }

    async fn settle<T>(&self, action: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                add_breadcrumb("cart", action, None);
                self.refresh().await;
                Ok(value)
            }
            Err(e) => {
                tracing::error!("Cart mutation failed: {e}");
                let message = e.to_string();
                self.inner.state.send_modify(|s| s.error = Some(message));
                Err(e)
            }
        }
    }

    fn begin_discount(&self) {
        self.inner.state.send_modify(|s| {
            s.discount.in_flight += 1;
            s.discount.error = None;
        });
    }

    async fn settle_discount<T>(
        &self,
        action: &str,
        result: Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let error = result.as_ref().err().map(ToString::to_string);
        self.inner.state.send_modify(|s| {
            s.discount.in_flight = s.discount.in_flight.saturating_sub(1);
            s.discount.error.clone_from(&error);
        });

        match result {
            Ok(value) => {
                add_breadcrumb("cart", action, None);
                self.refresh().await;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!("Discount operation rejected: {e}");
                Err(e)
            }
        }
    }
}
