//! This crate provides test-utilities shared by the other crates in this workspace.
//!
//! These utilities generate fixture deposits and chain events with plausible but
//! random identities, so tests only spell out the fields they actually assert on.

pub mod deposits;
pub mod mock;
pub mod random;
