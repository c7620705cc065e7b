use std::collections::HashSet;
use std::fs;
use serde::Deserialize;
use uuid::Uuid;
use log::{info, warn};

use crate::data::SymbolQuote;
use crate::error::{StreamError, StreamResult};

/// On-disk shape of a quote. `id` and `currentPrice` may be absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredQuote {
    #[serde(default)]
    id: String,
    symbol: String,
    open_price: f64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    market: String,
    current_price: Option<f64>,
    refresh_interval: u64,
}

impl StoredQuote {
    fn into_quote(self) -> SymbolQuote {
        let id = if self.id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            self.id
        };

        let mut quote = SymbolQuote::new(
            id,
            self.symbol,
            self.name,
            self.market,
            self.open_price,
            self.refresh_interval,
        );
        if let Some(current_price) = self.current_price {
            quote.current_price = current_price;
        }
        quote
    }
}

pub struct QuoteLoader;

impl QuoteLoader {
    pub fn load_from_json(file_path: &str) -> StreamResult<Vec<SymbolQuote>> {
        let raw = fs::read_to_string(file_path)?;
        let quotes = Self::parse(&raw)?;

        info!("Successfully loaded {} symbols from {}", quotes.len(), file_path);
        Ok(quotes)
    }

    pub fn parse(raw: &str) -> StreamResult<Vec<SymbolQuote>> {
        let stored: Vec<StoredQuote> = serde_json::from_str(raw)?;
        if stored.is_empty() {
            warn!("Quote file contains no symbols");
        }

        let quotes: Vec<SymbolQuote> = stored.into_iter().map(StoredQuote::into_quote).collect();
        Self::validate(&quotes)?;
        Ok(quotes)
    }

    fn validate(quotes: &[SymbolQuote]) -> StreamResult<()> {
        let mut ids = HashSet::new();
        let mut symbols = HashSet::new();

        for quote in quotes {
            if quote.symbol.trim().is_empty() {
                return Err(StreamError::InvalidQuote(format!("quote {} has an empty symbol", quote.id)));
            }
            if quote.refresh_interval_secs == 0 {
                return Err(StreamError::InvalidQuote(format!(
                    "{} has a zero refresh interval",
                    quote.symbol
                )));
            }
            if !ids.insert(quote.id.as_str()) {
                return Err(StreamError::InvalidQuote(format!("duplicate id {}", quote.id)));
            }
            if !symbols.insert(quote.symbol.as_str()) {
                return Err(StreamError::InvalidQuote(format!("duplicate symbol {}", quote.symbol)));
            }
        }

        Ok(())
    }
}
