//! Roster Bridge: coordination core between a client roster, a WhatsApp
//! gateway and per-client conversation logs.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod inbox;
pub mod manager;
pub mod reconcile;
pub mod roster;
pub mod store;
pub mod template;

#[cfg(test)]
mod testing;
