use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::data::{PriceUpdate, SymbolQuote};
use crate::error::{StreamError, StreamResult};

/// Latest emitted value of every quote, keyed by id.
///
/// Fed from the event copies the hub consumes, so readers never touch the
/// generator's own state.
#[derive(Clone, Default)]
pub struct QuoteBook {
    quotes: Arc<RwLock<HashMap<String, SymbolQuote>>>,
}

impl QuoteBook {
    pub fn new(initial: &[SymbolQuote]) -> Self {
        let quotes = initial
            .iter()
            .map(|quote| (quote.id.clone(), quote.clone()))
            .collect();
        Self {
            quotes: Arc::new(RwLock::new(quotes)),
        }
    }

    pub fn apply(&self, update: &PriceUpdate) -> StreamResult<()> {
        let mut quotes = self.quotes.write()
            .map_err(|_| StreamError::LockPoisoned("quote book"))?;
        quotes.insert(update.id.clone(), update.clone());
        Ok(())
    }

    /// All quotes sorted by symbol.
    pub fn snapshot(&self) -> StreamResult<Vec<SymbolQuote>> {
        let quotes = self.quotes.read()
            .map_err(|_| StreamError::LockPoisoned("quote book"))?;
        let mut list: Vec<SymbolQuote> = quotes.values().cloned().collect();
        list.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.quotes.read()
            .map(|quotes| quotes.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let quotes = self.quotes.clone();
        let _ = std::thread::spawn(move || {
            let _guard = quotes.write().unwrap();
            panic!("poison the quote book");
        })
        .join();
    }
}
