//! Cart and discount commands.
//!
//! Every mutation prints the cart as refreshed from the server afterwards.
//!
//! # Usage
//!
//! ```bash
//! shopfront cart show
//! shopfront cart add -v 42 -q 2
//! shopfront cart update -i 7 -q 3
//! shopfront cart remove -i 7
//! shopfront cart clear
//! shopfront discount apply SAVE10
//! shopfront discount remove
//! ```

use shopfront_client::Storefront;
use shopfront_client::api::NewCartItem;
use shopfront_client::cart::CartState;
use shopfront_core::{CartItemId, VariantId, format_money};

use crate::CliError;

/// Print the cart.
pub fn show(storefront: &Storefront) {
    print_cart(&storefront.cart().state());
}

/// Add a variant to the cart.
pub async fn add(storefront: &Storefront, variant: i64, quantity: u32) -> Result<(), CliError> {
    let item = NewCartItem {
        product_variant_id: VariantId::new(variant),
        quantity,
    };
    storefront.cart().add_to_cart(item).await?;
    show(storefront);
    Ok(())
}

/// Set a line's quantity.
pub async fn update(storefront: &Storefront, item: i64, quantity: u32) -> Result<(), CliError> {
    storefront
        .cart()
        .update_cart_item(CartItemId::new(item), quantity)
        .await?;
    show(storefront);
    Ok(())
}

/// Remove a line.
pub async fn remove(storefront: &Storefront, item: i64) -> Result<(), CliError> {
    storefront
        .cart()
        .remove_from_cart(CartItemId::new(item))
        .await?;
    show(storefront);
    Ok(())
}

/// Empty the cart.
pub async fn clear(storefront: &Storefront) -> Result<(), CliError> {
    storefront.cart().clear_cart().await?;
    show(storefront);
    Ok(())
}

/// Apply a discount code.
#[allow(clippy::print_stdout)]
pub async fn apply_discount(storefront: &Storefront, code: &str) -> Result<(), CliError> {
    let result = storefront.cart().apply_discount(code).await?;
    match result.message {
        Some(message) => println!("{}: {message}", result.code),
        None => println!(
            "{}: {} off",
            result.code,
            format_money(result.discount_amount)
        ),
    }
    show(storefront);
    Ok(())
}

/// Remove the applied discount code.
pub async fn remove_discount(storefront: &Storefront) -> Result<(), CliError> {
    storefront.cart().remove_discount().await?;
    show(storefront);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(state: &CartState) {
    if let Some(error) = &state.error {
        tracing::warn!("Cart may be out of date: {error}");
    }

    let cart = &state.snapshot;
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }

    for line in &cart.items {
        let variant = &line.product_variant;
        let name = variant
            .name
            .clone()
            .unwrap_or_else(|| format!("Variant {}", variant.id));
        println!(
            "#{:<6} {name:<32} {:>3} x {:>10} = {:>10}",
            line.id,
            line.quantity,
            format_money(line.unit_price),
            format_money(line.line_total),
        );
    }

    println!("Items:    {}", cart.total_items);
    println!("Subtotal: {}", format_money(cart.subtotal));
    if !cart.discount_amount.is_zero() {
        println!("Discount: {}", format_money(-cart.discount_amount));
    }
    println!("Total:    {}", format_money(cart.total_price));
}
