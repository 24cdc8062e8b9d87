//! Canonical chat request and result types.
//!
//! Everything a caller hands to the runtime, and everything a non-streaming
//! call hands back, is expressed in these types.

mod types;

pub use types::*;
