//! Shopfront client library.
//!
//! Client-side session, cart synchronization and access gating for a
//! storefront backed by a remote commerce API.
//!
//! # Components
//!
//! - [`session::SessionStore`] - who the current actor is, backed by durable token storage
//! - [`cart::CartSynchronizer`] - server-truthful cart snapshot, mutate-then-refresh
//! - [`gate::AccessGate`] - maintenance mode crossed with role and route
//! - [`state::Storefront`] - wires the three together over one API boundary
//!
//! The commerce API itself sits behind [`api::CommerceApi`]; [`api::HttpCommerceApi`]
//! is the `reqwest` implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod gate;
pub mod session;
pub mod state;
pub mod storage;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{ApiError, ErrorKind};
pub use state::Storefront;
