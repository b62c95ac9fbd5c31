//! Domain models for fuel-station stock management

mod delivery;
mod stock;
mod tank;

pub use delivery::*;
pub use stock::*;
pub use tank::*;
