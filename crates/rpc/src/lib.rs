//! Provides the relay's json-rpc surface.
//!
//! The interface is decomposed into groups: a control surface about the process
//! itself, a monitoring surface over deposits and the job queue, and an operator
//! surface for intervening on individual deposits. Server implementations live in
//! the binary; enabling the `client` feature also generates jsonrpsee clients.

pub mod traits;
pub mod types;
