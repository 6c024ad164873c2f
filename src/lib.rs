//! Event-driven state reconciliation for a Uniswap agent app.
//!
//! A [`reconciler::ReconciliationLoop`] consumes ledger events one at a time,
//! runs them through the [`reducer::StateReducer`] and publishes each new
//! [`models::Snapshot`] on a `watch` channel.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod pipelines;
pub mod reconciler;
pub mod reducer;
pub mod utils;
