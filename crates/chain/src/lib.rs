//! Clients for the two chains the relay sits between.
//!
//! The pipeline only ever talks to the traits in [`traits`]; the WebSocket
//! implementations in [`rpc`] are wired in at startup.

pub mod errors;
pub mod rpc;
pub mod subscription;
pub mod traits;
