//! HTTP handlers

pub mod health;
pub mod stock;
pub mod tank;

pub use health::health_check;
pub use stock::*;
pub use tank::*;
