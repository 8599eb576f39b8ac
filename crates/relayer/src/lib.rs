//! The relay pipeline: watches the source chain for deposits, gates them on
//! confirmation depth, and executes the matching releases on the destination
//! chain.
//!
//! Everything here is written against the storage traits in `trestle-db` and
//! the chain traits in `trestle-chain`; the binary wires in the SQLite store
//! and the WebSocket clients.

pub mod admin;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod queue;
pub mod recovery;
pub mod worker;
