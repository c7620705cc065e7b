use serde::{Deserialize, Serialize};

/// One tracked symbol and its latest price.
///
/// Field names on the wire follow the browser client: `openPrice`,
/// `currentPrice`, `refreshInterval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolQuote {
    pub id: String,
    pub symbol: String,
    pub open_price: f64,
    pub name: String,
    pub market: String,
    pub current_price: f64,
    #[serde(rename = "refreshInterval")]
    pub refresh_interval_secs: u64,
}

/// Value copy of a quote taken at the moment of a tick.
pub type PriceUpdate = SymbolQuote;

impl SymbolQuote {
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
        market: impl Into<String>,
        open_price: f64,
        refresh_interval_secs: u64,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            open_price,
            name: name.into(),
            market: market.into(),
            current_price: open_price,
            refresh_interval_secs,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
