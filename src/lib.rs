//! Offline-first store for a cloud RSS reader.
//!
//! Feeds, items, read markers and subscriptions live in a local SQLite
//! database that answers reads and accepts writes immediately. A background
//! sync engine reconciles those tables with the remote API.

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod store;
pub mod sync;
pub mod token;

pub use error::{AppError, Result};
pub use store::{Store, StoreContext, StoreOptions};
