//! Shopfront Core - Shared types library.
//!
//! This crate provides the types shared by all shopfront components:
//! - `client` - Session, cart synchronization and access gating over the commerce API
//! - `cli` - Command-line front-end driving the client
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, roles and money

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
