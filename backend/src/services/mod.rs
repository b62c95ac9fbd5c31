//! Business logic services for the fuel-station stock server

pub mod audit;
pub mod initial_state;
pub mod stock_ledger;
pub mod stock_query;
pub mod tank;

pub use audit::AuditService;
pub use initial_state::InitialStateService;
pub use stock_ledger::StockLedgerService;
pub use stock_query::StockQueryService;
pub use tank::TankService;
