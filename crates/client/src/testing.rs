//! In-memory commerce backend for tests.
//!
//! [`InMemoryCommerce`] implements [`CommerceApi`] the way the real backend
//! behaves: carts are per user, totals are recomputed on every read, guest
//! cart calls are rejected as unauthenticated. Tests can inject failures,
//! count calls per endpoint and hold requests at the boundary to force a
//! particular interleaving.
//!
//! ```ignore
//! let backend = Arc::new(InMemoryCommerce::new());
//! let gate = backend.hold(Endpoint::GetCart);
//! // ... start a refresh, then let one request through
//! gate.add_permits(1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::Semaphore;

use shopfront_core::{CartItemId, Email, Role, UserId, VariantId};

use crate::api::{
    AccessToken, AuthResponse, CartLine, CartSnapshot, CommerceApi, DiscountResult, Identity,
    MaintenanceStatus, NewCartItem, RefreshToken, TokenPair, VariantRef,
};
use crate::error::ApiError;

/// Boundary operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Register,
    Profile,
    RefreshSession,
    GetCart,
    GetCartCount,
    AddCartItem,
    UpdateCartItem,
    RemoveCartItem,
    ClearCart,
    ApplyDiscount,
    RemoveDiscount,
    MaintenanceStatus,
}

#[derive(Debug)]
struct Account {
    identity: Identity,
    password: String,
}

#[derive(Debug, Clone)]
struct Variant {
    name: String,
    sku: String,
    price: Decimal,
}

#[derive(Debug, Default)]
struct Cart {
    lines: Vec<(CartItemId, VariantId, u32)>,
    discount: Option<String>,
}

#[derive(Debug, Default)]
struct Backend {
    accounts: Vec<Account>,
    access_tokens: HashMap<String, UserId>,
    refresh_tokens: HashMap<String, UserId>,
    carts: HashMap<UserId, Cart>,
    variants: HashMap<VariantId, Variant>,
    /// Code -> percent off the subtotal.
    discounts: HashMap<String, Decimal>,
    maintenance: bool,
    failures: HashMap<Endpoint, VecDeque<ApiError>>,
    calls: HashMap<Endpoint, usize>,
    holds: HashMap<Endpoint, Arc<Semaphore>>,
    next_id: i64,
}

impl Backend {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_tokens(&mut self, user: UserId) -> TokenPair {
        let n = self.next_id();
        let access = format!("at-{user}-{n}");
        let refresh = format!("rt-{user}-{n}");
        self.access_tokens.insert(access.clone(), user);
        self.refresh_tokens.insert(refresh.clone(), user);
        TokenPair {
            access_token: AccessToken::new(access),
            refresh_token: Some(RefreshToken::new(refresh)),
        }
    }

    fn identity(&self, user: UserId) -> Option<&Identity> {
        self.accounts
            .iter()
            .map(|a| &a.identity)
            .find(|identity| identity.id == user)
    }

    fn authenticate(&self, token: Option<&AccessToken>) -> Result<UserId, ApiError> {
        token
            .and_then(|t| self.access_tokens.get(t.expose()))
            .copied()
            .ok_or_else(|| ApiError::Auth("Invalid token".to_string()))
    }

    fn snapshot(&self, user: UserId) -> CartSnapshot {
        let Some(cart) = self.carts.get(&user) else {
            return CartSnapshot::empty();
        };

        let mut snapshot = CartSnapshot::empty();
        for &(id, variant_id, quantity) in &cart.lines {
            let Some(variant) = self.variants.get(&variant_id) else {
                continue;
            };
            let line_total = variant.price * Decimal::from(quantity);
            snapshot.items.push(CartLine {
                id,
                product_variant: VariantRef {
                    id: variant_id,
                    name: Some(variant.name.clone()),
                    sku: Some(variant.sku.clone()),
                },
                quantity,
                unit_price: variant.price,
                line_total,
            });
            snapshot.total_items += quantity;
            snapshot.subtotal += line_total;
        }

        snapshot.discount_amount = cart
            .discount
            .as_ref()
            .and_then(|code| self.discounts.get(code))
            .map_or(Decimal::ZERO, |percent| {
                discount_for(snapshot.subtotal, *percent)
            });
        snapshot.total_price = snapshot.subtotal - snapshot.discount_amount;
        snapshot
    }
}

fn discount_for(subtotal: Decimal, percent: Decimal) -> Decimal {
    (subtotal * percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .min(subtotal)
}

/// Fake commerce backend.
#[derive(Debug, Default)]
pub struct InMemoryCommerce {
    backend: Mutex<Backend>,
}

impl InMemoryCommerce {
    /// Create an empty backend: no users, no catalog, maintenance off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an account directly.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid address.
    pub fn add_user(&self, email: &str, password: &str, role: Role) -> UserId {
        let email = Email::parse(email).expect("test account email must be valid");
        let mut backend = self.lock();
        let id = UserId::new(backend.next_id());
        backend.accounts.push(Account {
            identity: Identity {
                id,
                email,
                role,
                first_name: None,
                last_name: None,
            },
            password: password.to_string(),
        });
        id
    }

    /// Issue a fresh token pair for an existing user, as if they had signed
    /// in elsewhere.
    pub fn issue_tokens(&self, user: UserId) -> TokenPair {
        self.lock().issue_tokens(user)
    }

    /// Add a purchasable variant.
    pub fn add_variant(&self, id: VariantId, name: &str, price: Decimal) {
        self.lock().variants.insert(
            id,
            Variant {
                name: name.to_string(),
                sku: format!("SKU-{id}"),
                price,
            },
        );
    }

    /// Add a discount code worth `percent` off the subtotal.
    pub fn add_discount(&self, code: &str, percent: Decimal) {
        self.lock()
            .discounts
            .insert(code.to_ascii_uppercase(), percent);
    }

    /// Toggle maintenance mode.
    pub fn set_maintenance(&self, active: bool) {
        self.lock().maintenance = active;
    }

    /// Fail the next call to `endpoint` with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
        self.lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Number of calls made to `endpoint` so far, including held ones.
    #[must_use]
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Hold every subsequent call to `endpoint` until a permit is added to
    /// the returned semaphore. Each permit lets one call through.
    #[must_use]
    pub fn hold(&self, endpoint: Endpoint) -> Arc<Semaphore> {
        let semaphore = Arc::new(Semaphore::new(0));
        self.lock().holds.insert(endpoint, semaphore.clone());
        semaphore
    }

    /// Stop holding `endpoint` and let every waiting call through.
    pub fn release(&self, endpoint: Endpoint) {
        if let Some(semaphore) = self.lock().holds.remove(&endpoint) {
            semaphore.close();
        }
    }

    /// Let new calls to `endpoint` through again. Calls already parked on
    /// the semaphore from [`Self::hold`] stay parked until it gets permits.
    pub fn unhold(&self, endpoint: Endpoint) {
        self.lock().holds.remove(&endpoint);
    }

    /// Yield until `endpoint` has been called at least `count` times.
    pub async fn wait_for_calls(&self, endpoint: Endpoint, count: usize) {
        while self.calls(endpoint) < count {
            tokio::task::yield_now().await;
        }
    }

    /// Server-side view of a user's cart.
    #[must_use]
    pub fn cart_of(&self, user: UserId) -> CartSnapshot {
        self.lock().snapshot(user)
    }

    /// Record a call, wait out any hold, then pop an injected failure.
    async fn enter(&self, endpoint: Endpoint) -> Result<(), ApiError> {
        let hold = {
            let mut backend = self.lock();
            *backend.calls.entry(endpoint).or_default() += 1;
            backend.holds.get(&endpoint).cloned()
        };

        if let Some(semaphore) = hold
            && let Ok(permit) = semaphore.acquire().await
        {
            permit.forget();
        }

        match self
            .lock()
            .failures
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CommerceApi for InMemoryCommerce {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.enter(Endpoint::Login).await?;
        let mut backend = self.lock();
        let user = backend
            .accounts
            .iter()
            .find(|a| {
                a.identity.email.as_str().eq_ignore_ascii_case(email) && a.password == password
            })
            .map(|a| a.identity.clone())
            .ok_or_else(|| ApiError::Auth("Invalid credentials".to_string()))?;
        let tokens = backend.issue_tokens(user.id);
        Ok(AuthResponse { tokens, user })
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        role: Option<&Role>,
    ) -> Result<AuthResponse, ApiError> {
        self.enter(Endpoint::Register).await?;
        let email = Email::parse(email).map_err(|e| ApiError::Validation(e.to_string()))?;
        if password.len() < 8 {
            return Err(ApiError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let mut backend = self.lock();
        if backend.accounts.iter().any(|a| a.identity.email == email) {
            return Err(ApiError::Validation("Email already registered".to_string()));
        }
        let user = Identity {
            id: UserId::new(backend.next_id()),
            email,
            role: role.cloned().unwrap_or_default(),
            first_name: None,
            last_name: None,
        };
        backend.accounts.push(Account {
            identity: user.clone(),
            password: password.to_string(),
        });
        let tokens = backend.issue_tokens(user.id);
        Ok(AuthResponse { tokens, user })
    }

    async fn profile(&self, token: &AccessToken) -> Result<Identity, ApiError> {
        self.enter(Endpoint::Profile).await?;
        let backend = self.lock();
        let user = backend.authenticate(Some(token))?;
        backend
            .identity(user)
            .cloned()
            .ok_or_else(|| ApiError::Auth("Invalid token".to_string()))
    }

    async fn refresh_session(&self, refresh: &RefreshToken) -> Result<TokenPair, ApiError> {
        self.enter(Endpoint::RefreshSession).await?;
        let mut backend = self.lock();
        let user = backend
            .refresh_tokens
            .remove(refresh.expose())
            .ok_or_else(|| ApiError::Auth("Invalid refresh token".to_string()))?;
        Ok(backend.issue_tokens(user))
    }

    async fn get_cart(&self, token: Option<&AccessToken>) -> Result<CartSnapshot, ApiError> {
        self.enter(Endpoint::GetCart).await?;
        let backend = self.lock();
        let user = backend.authenticate(token)?;
        Ok(backend.snapshot(user))
    }

    async fn get_cart_count(&self, token: Option<&AccessToken>) -> Result<u32, ApiError> {
        self.enter(Endpoint::GetCartCount).await?;
        let backend = self.lock();
        let user = backend.authenticate(token)?;
        Ok(backend.snapshot(user).total_items)
    }

    async fn add_cart_item(
        &self,
        token: Option<&AccessToken>,
        item: &NewCartItem,
    ) -> Result<(), ApiError> {
        self.enter(Endpoint::AddCartItem).await?;
        let mut backend = self.lock();
        let user = backend.authenticate(token)?;
        if item.quantity == 0 {
            return Err(ApiError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        if !backend.variants.contains_key(&item.product_variant_id) {
            return Err(ApiError::Validation(
                "Product variant not found".to_string(),
            ));
        }

        let line_id = CartItemId::new(backend.next_id());
        let cart = backend.carts.entry(user).or_default();
        if let Some(line) = cart
            .lines
            .iter_mut()
            .find(|(_, variant, _)| *variant == item.product_variant_id)
        {
            line.2 += item.quantity;
        } else {
            cart.lines
                .push((line_id, item.product_variant_id, item.quantity));
        }
        Ok(())
    }

    async fn update_cart_item(
        &self,
        token: Option<&AccessToken>,
        id: CartItemId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        self.enter(Endpoint::UpdateCartItem).await?;
        let mut backend = self.lock();
        let user = backend.authenticate(token)?;
        if quantity == 0 {
            return Err(ApiError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        let line = backend
            .carts
            .get_mut(&user)
            .and_then(|cart| cart.lines.iter_mut().find(|(line, _, _)| *line == id))
            .ok_or_else(|| ApiError::Validation("Cart item not found".to_string()))?;
        line.2 = quantity;
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        token: Option<&AccessToken>,
        id: CartItemId,
    ) -> Result<(), ApiError> {
        self.enter(Endpoint::RemoveCartItem).await?;
        let mut backend = self.lock();
        let user = backend.authenticate(token)?;
        let cart = backend.carts.entry(user).or_default();
        let before = cart.lines.len();
        cart.lines.retain(|(line, _, _)| *line != id);
        if cart.lines.len() == before {
            return Err(ApiError::Validation("Cart item not found".to_string()));
        }
        Ok(())
    }

    async fn clear_cart(&self, token: Option<&AccessToken>) -> Result<(), ApiError> {
        self.enter(Endpoint::ClearCart).await?;
        let mut backend = self.lock();
        let user = backend.authenticate(token)?;
        backend.carts.insert(user, Cart::default());
        Ok(())
    }

    async fn apply_discount(
        &self,
        token: Option<&AccessToken>,
        code: &str,
    ) -> Result<DiscountResult, ApiError> {
        self.enter(Endpoint::ApplyDiscount).await?;
        let mut backend = self.lock();
        let user = backend.authenticate(token)?;
        let code = code.trim().to_ascii_uppercase();
        let percent = *backend
            .discounts
            .get(&code)
            .ok_or_else(|| ApiError::Discount("Invalid discount code".to_string()))?;

        let subtotal = backend.snapshot(user).subtotal;
        if subtotal.is_zero() {
            return Err(ApiError::Discount(
                "Discount cannot be applied to an empty cart".to_string(),
            ));
        }
        backend.carts.entry(user).or_default().discount = Some(code.clone());
        Ok(DiscountResult {
            message: Some(format!("{percent}% off applied")),
            discount_amount: discount_for(subtotal, percent),
            code,
        })
    }

    async fn remove_discount(&self, token: Option<&AccessToken>) -> Result<(), ApiError> {
        self.enter(Endpoint::RemoveDiscount).await?;
        let mut backend = self.lock();
        let user = backend.authenticate(token)?;
        match backend.carts.get_mut(&user).and_then(|c| c.discount.take()) {
            Some(_) => Ok(()),
            None => Err(ApiError::Discount("No discount applied".to_string())),
        }
    }

    async fn maintenance_status(&self) -> Result<MaintenanceStatus, ApiError> {
        self.enter(Endpoint::MaintenanceStatus).await?;
        Ok(MaintenanceStatus {
            maintenance_active: self.lock().maintenance,
        })
    }
}
