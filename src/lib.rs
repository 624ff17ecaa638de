//! Angle Protocol on-chain role audit.
//!
//! For each configured chain, every contract of the chain registry is probed for the principals
//! that control it (`owner()`, `minter()`, `hasRole(..)`, ...). Observed values are checked against
//! the chain's governance addresses, and the resulting anomalies are posted as one report per chain
//! to a chat channel. The `role_audit` binary drives the whole run; `list_contracts` prints a chain's
//! flattened contract list.

pub mod anomaly;
pub mod audit;
pub mod error;
pub mod notify;
pub mod policy;
pub mod probe;
pub mod registry;
pub mod report;
pub mod roles;
pub mod utils;

pub mod config {
    pub mod chains;
}
