//! Database models for the fuel-station stock server
//!
//! Re-exports models from the shared crate

pub use shared::models::*;
