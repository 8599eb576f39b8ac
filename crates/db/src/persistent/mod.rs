//! SQLite-backed implementation of the store and queue traits.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod sqlite;
