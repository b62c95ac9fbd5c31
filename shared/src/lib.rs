//! Shared types and domain rules for fuel-station stock management
//!
//! This crate contains the calibration, ledger and variance rules shared
//! between the backend, the browser client (via WASM), and tests. It does
//! no I/O.

pub mod book;
pub mod calibration;
pub mod error;
pub mod ledger;
pub mod models;
pub mod types;
pub mod validation;
pub mod variance;

pub use book::*;
pub use calibration::*;
pub use error::*;
pub use ledger::*;
pub use models::*;
pub use types::*;
pub use validation::*;
pub use variance::*;
