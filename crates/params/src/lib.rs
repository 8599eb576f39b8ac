//! This crate contains the static bridge parameters that dictate how deposits are
//! gated, validated and relayed. These are loaded once at startup from a TOML file
//! and never change for the lifetime of the process; operators restart the node to
//! apply a change.

pub mod chain;
pub mod limits;
pub mod prelude;
pub mod retry;
pub mod tiers;

pub(crate) mod default;
