//! Application layer orchestrating purchases, consumption and catalog queries.
//!
//! `PurchaseCoordinator` is the entry point. It uses an actor-like pattern with
//! `tokio` channels: a single worker task owns the billing adapter and the
//! product cache, and a second task delivers results to the host in order.

pub mod callback;
pub mod confinement;
pub mod coordinator;
