//! Re-exports everything a consumer of the params needs.

pub use crate::{chain::*, limits::*, retry::*, tiers::*};
