//! Persistence layer for the relay: the deposit store and the durable job queue,
//! fronted by async traits so the pipeline can be driven against any implementation.

pub mod deposits;
pub mod errors;
pub mod persistent;
pub mod queue;
