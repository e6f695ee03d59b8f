//! Domain types for QuoteLab

pub mod bar;
pub mod trade;

pub use bar::Bar;
pub use trade::TradeEvent;

/// Symbol type alias
pub type Symbol = String;
