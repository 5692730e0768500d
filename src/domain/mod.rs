//! Domain types and the ports the coordinator talks through.

pub mod catalog;
pub mod connection;
pub mod event;
pub mod ports;
pub mod registry;
pub mod transaction;
