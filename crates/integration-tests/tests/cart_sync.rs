//! Cart synchronization against the in-memory backend.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use shopfront_client::api::CartSnapshot;
use shopfront_client::testing::Endpoint;
use shopfront_client::{ApiError, ErrorKind, Storefront};
use shopfront_integration_tests::{CUSTOMER, Fixture, GUAVA, MANGO, PASSWORD, SAVE10, item};

async fn signed_in(fixture: &Fixture) -> Storefront {
    let storefront = fixture.storefront();
    storefront.boot().await;
    storefront.session().login(CUSTOMER, PASSWORD).await.unwrap();
    storefront
}

fn assert_server_totals(snapshot: &CartSnapshot) {
    let quantity: u32 = snapshot.items.iter().map(|line| line.quantity).sum();
    assert_eq!(snapshot.total_items, quantity);
    assert_eq!(
        snapshot.total_price,
        snapshot.subtotal - snapshot.discount_amount
    );
}

// =============================================================================
// Mutate then refresh
// =============================================================================

#[tokio::test]
async fn test_totals_hold_after_every_mutation() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    let cart = storefront.cart();

    cart.add_to_cart(item(MANGO, 2)).await.unwrap();
    assert_server_totals(&cart.state().snapshot);

    cart.add_to_cart(item(GUAVA, 1)).await.unwrap();
    assert_server_totals(&cart.state().snapshot);

    cart.apply_discount(SAVE10).await.unwrap();
    assert_server_totals(&cart.state().snapshot);
    assert_eq!(cart.state().snapshot.discount_amount, Decimal::new(190, 2));

    let mango = cart.state().snapshot.items.first().unwrap().id;
    cart.update_cart_item(mango, 5).await.unwrap();
    assert_server_totals(&cart.state().snapshot);

    cart.remove_from_cart(mango).await.unwrap();
    assert_server_totals(&cart.state().snapshot);

    cart.remove_discount().await.unwrap();
    assert_server_totals(&cart.state().snapshot);

    cart.clear_cart().await.unwrap();
    let state = cart.state();
    assert_eq!(state.snapshot, CartSnapshot::empty());
    assert_eq!(state.count, 0);
    assert_eq!(state.snapshot, fixture.backend.cart_of(fixture.customer));
}

#[tokio::test]
async fn test_local_state_matches_server_after_refresh() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;

    storefront.cart().add_to_cart(item(GUAVA, 3)).await.unwrap();

    assert_eq!(
        storefront.cart().state().snapshot,
        fixture.backend.cart_of(fixture.customer)
    );
}

#[tokio::test]
async fn test_refresh_waits_for_mutation() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    let refreshes = fixture.backend.calls(Endpoint::GetCart);
    let hold = fixture.backend.hold(Endpoint::AddCartItem);

    let add = tokio::spawn({
        let storefront = storefront.clone();
        async move { storefront.cart().add_to_cart(item(MANGO, 1)).await }
    });
    fixture.backend.wait_for_calls(Endpoint::AddCartItem, 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(fixture.backend.calls(Endpoint::GetCart), refreshes);

    hold.add_permits(1);
    add.await.unwrap().unwrap();
    assert_eq!(fixture.backend.calls(Endpoint::GetCart), refreshes + 1);
}

#[tokio::test]
async fn test_failed_mutation_keeps_last_snapshot() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    storefront.cart().add_to_cart(item(MANGO, 1)).await.unwrap();
    let before = storefront.cart().state().snapshot;
    let refreshes = fixture.backend.calls(Endpoint::GetCart);

    let line = before.items.first().unwrap().id;
    let err = storefront
        .cart()
        .update_cart_item(line, 0)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    let state = storefront.cart().state();
    assert_eq!(state.snapshot, before);
    assert_eq!(state.error.as_deref(), Some("Quantity must be at least 1"));
    assert_eq!(fixture.backend.calls(Endpoint::GetCart), refreshes);
}

#[tokio::test]
async fn test_successful_refresh_clears_general_error() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    fixture.backend.fail_next(
        Endpoint::GetCartCount,
        ApiError::Unexpected {
            status: 503,
            message: "Service Unavailable".to_string(),
        },
    );

    storefront.cart().refresh().await;
    assert!(storefront.cart().state().error.is_some());

    storefront.cart().refresh().await;
    assert!(storefront.cart().state().error.is_none());
}

// =============================================================================
// Guest fallback
// =============================================================================

#[tokio::test]
async fn test_auth_failure_resets_to_empty_cart_silently() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    storefront.cart().add_to_cart(item(MANGO, 2)).await.unwrap();
    fixture
        .backend
        .fail_next(Endpoint::GetCart, ApiError::Auth("Invalid token".to_string()));

    storefront.cart().refresh().await;

    let state = storefront.cart().state();
    assert!(state.snapshot.items.is_empty());
    assert_eq!(state.snapshot.total_items, 0);
    assert_eq!(state.snapshot.subtotal, Decimal::ZERO);
    assert_eq!(state.snapshot.discount_amount, Decimal::ZERO);
    assert_eq!(state.snapshot.total_price, Decimal::ZERO);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_guest_mutation_is_surfaced() {
    let fixture = Fixture::new();
    let storefront = fixture.storefront();
    storefront.boot().await;

    let err = storefront
        .cart()
        .add_to_cart(item(MANGO, 1))
        .await
        .unwrap_err();

    assert!(err.is_auth());
    assert!(storefront.cart().state().error.is_some());
}

// =============================================================================
// Discount channel
// =============================================================================

#[tokio::test]
async fn test_bad_code_leaves_general_channel_untouched() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    storefront.cart().add_to_cart(item(GUAVA, 1)).await.unwrap();
    let before = storefront.cart().state();

    let err = storefront
        .cart()
        .apply_discount("BADCODE")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Discount);
    let after = storefront.cart().state();
    assert_eq!(after.error, before.error);
    assert_eq!(after.snapshot, before.snapshot);
    assert_eq!(after.discount.error.as_deref(), Some("Invalid discount code"));
}

#[tokio::test]
async fn test_bad_code_keeps_existing_general_error() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    storefront.cart().add_to_cart(item(GUAVA, 1)).await.unwrap();
    storefront
        .cart()
        .remove_from_cart(shopfront_core::CartItemId::new(-1))
        .await
        .unwrap_err();
    let general = storefront.cart().state().error;
    assert!(general.is_some());

    storefront.cart().apply_discount("BADCODE").await.unwrap_err();

    assert_eq!(storefront.cart().state().error, general);
}

#[tokio::test]
async fn test_discount_loading_flag() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    storefront.cart().add_to_cart(item(GUAVA, 1)).await.unwrap();
    let hold = fixture.backend.hold(Endpoint::ApplyDiscount);

    let apply = tokio::spawn({
        let storefront = storefront.clone();
        async move { storefront.cart().apply_discount(SAVE10).await }
    });
    fixture.backend.wait_for_calls(Endpoint::ApplyDiscount, 1).await;
    let pending = storefront.cart().state();
    assert!(pending.discount.is_loading());
    assert!(!pending.is_loading());

    hold.add_permits(1);
    let result = apply.await.unwrap().unwrap();
    assert_eq!(result.discount_amount, Decimal::ONE);
    assert!(!storefront.cart().state().discount.is_loading());
    assert_eq!(storefront.cart().state().snapshot.total_price, Decimal::new(900, 2));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_updates_converge() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    let cart = storefront.cart();
    cart.add_to_cart(item(MANGO, 1)).await.unwrap();
    cart.add_to_cart(item(GUAVA, 1)).await.unwrap();
    let lines = cart.state().snapshot.items;
    let mango = lines.first().unwrap().id;
    let guava = lines.get(1).unwrap().id;

    let (a, b) = tokio::join!(
        cart.update_cart_item(mango, 3),
        cart.update_cart_item(guava, 4)
    );
    a.unwrap();
    b.unwrap();

    let snapshot = cart.state().snapshot;
    assert_eq!(snapshot.line(mango).unwrap().quantity, 3);
    assert_eq!(snapshot.line(guava).unwrap().quantity, 4);
    assert_eq!(snapshot.total_items, 7);
    assert_server_totals(&snapshot);
}

#[tokio::test]
async fn test_late_stale_refresh_is_reconciled_by_next_refresh() {
    let fixture = Fixture::new();
    let storefront = signed_in(&fixture).await;
    let cart = storefront.cart().clone();
    let hold = fixture.backend.hold(Endpoint::GetCart);
    let seen = fixture.backend.calls(Endpoint::GetCart);

    // A plain refresh and the add's own refresh are in flight together
    let stale = tokio::spawn({
        let cart = cart.clone();
        async move { cart.refresh().await }
    });
    fixture.backend.wait_for_calls(Endpoint::GetCart, seen + 1).await;

    let add = tokio::spawn({
        let cart = cart.clone();
        async move { cart.add_to_cart(item(MANGO, 2)).await }
    });
    fixture.backend.wait_for_calls(Endpoint::GetCart, seen + 2).await;
    fixture.backend.release(Endpoint::GetCart);
    stale.await.unwrap();
    add.await.unwrap().unwrap();

    cart.refresh().await;
    assert_eq!(cart.state().snapshot.total_items, 2);
    assert_eq!(cart.state().count, 2);
    drop(hold);
}
