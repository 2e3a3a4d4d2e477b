pub mod ledger_world;
pub mod setups;
pub mod steps;

pub use ledger_world::LedgerWorld;
