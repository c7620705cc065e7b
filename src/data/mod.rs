pub mod quote;
pub mod loader;
pub mod book;
pub mod generator;

pub use quote::{SymbolQuote, PriceUpdate};
pub use loader::QuoteLoader;
pub use book::QuoteBook;
pub use generator::PriceGenerator;
