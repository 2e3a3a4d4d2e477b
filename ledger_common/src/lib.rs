mod amount;

pub mod helpers;
pub mod op;

pub use amount::{Amount, AmountParseError, Currency, CurrencyError, MINOR_UNITS_PER_MAJOR};
