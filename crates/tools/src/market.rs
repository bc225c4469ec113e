//! Market data tools: stubs that return mock coin and stock quotes.
//!
//! In production these would call a price API. The stubs derive every
//! number from a hash of the symbol, so results are deterministic but
//! vary between symbols.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ivan_core::error::ToolError;
use ivan_core::tool::Tool;
use serde::Serialize;

/// Which market a tool quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Coin,
    Stock,
}

impl Market {
    fn noun(self) -> &'static str {
        match self {
            Market::Coin => "cryptocurrency",
            Market::Stock => "stock",
        }
    }

    fn example(self) -> &'static str {
        match self {
            Market::Coin => "BTC",
            Market::Stock => "AAPL",
        }
    }

    /// Base price range for the market, in the quote currency.
    fn base_price(self, hash: u32) -> f64 {
        match self {
            Market::Coin => 0.05 + f64::from(hash % 60_000),
            Market::Stock => 5.0 + f64::from(hash % 900),
        }
    }
}

const PRICE_SIGNATURE: &[&str] = &["symbol", "currency"];
const HISTORY_SIGNATURE: &[&str] = &["symbol", "days"];

const DEFAULT_HISTORY_DAYS: u64 = 7;
const MAX_HISTORY_DAYS: u64 = 30;

/// `get_coin_price` / `get_stock_price`.
pub struct PriceTool {
    market: Market,
    default_currency: String,
}

impl PriceTool {
    pub fn new(market: Market, default_currency: impl Into<String>) -> Self {
        Self {
            market,
            default_currency: default_currency.into(),
        }
    }
}

#[async_trait]
impl Tool for PriceTool {
    fn name(&self) -> &str {
        match self.market {
            Market::Coin => "get_coin_price",
            Market::Stock => "get_stock_price",
        }
    }

    fn description(&self) -> &str {
        match self.market {
            Market::Coin => {
                "Retrieves the current price of a specified cryptocurrency. Accepts one argument, which specifies the cryptocurrency (e.g., \"BTC\" for Bitcoin)."
            }
            Market::Stock => {
                "Retrieves the current price of a specified stock. Accepts one argument, which specifies the stock (e.g., \"AAPL\" for Apple)."
            }
        }
    }

    fn signature(&self) -> &[&str] {
        PRICE_SIGNATURE
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": format!("Ticker of the {} (e.g. {})", self.market.noun(), self.market.example())
                },
                "currency": {
                    "type": "string",
                    "description": "Quote currency",
                    "default": self.default_currency
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let symbol = symbol_argument(&arguments)?;
        let currency = arguments["currency"]
            .as_str()
            .unwrap_or(&self.default_currency)
            .to_uppercase();

        let quote = mock_quote(self.market, &symbol, &currency);
        serde_json::to_value(&quote).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

/// `get_coin_history` / `get_stock_history`.
pub struct HistoryTool {
    market: Market,
}

impl HistoryTool {
    pub fn new(market: Market) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for HistoryTool {
    fn name(&self) -> &str {
        match self.market {
            Market::Coin => "get_coin_history",
            Market::Stock => "get_stock_history",
        }
    }

    fn description(&self) -> &str {
        match self.market {
            Market::Coin => {
                "Provides historical pricing data for a cryptocurrency. Accepts one argument, which specifies the cryptocurrency."
            }
            Market::Stock => {
                "Provides historical pricing data for a stock. Accepts one argument, which specifies the stock."
            }
        }
    }

    fn signature(&self) -> &[&str] {
        HISTORY_SIGNATURE
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": format!("Ticker of the {}", self.market.noun())
                },
                "days": {
                    "type": "integer",
                    "description": "Number of daily closes to return (default 7, max 30)",
                    "default": DEFAULT_HISTORY_DAYS
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let symbol = symbol_argument(&arguments)?;
        let days = days_argument(&arguments)?;

        let history = mock_history(self.market, &symbol, days);
        serde_json::to_value(&history).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

fn symbol_argument(arguments: &serde_json::Value) -> Result<String, ToolError> {
    let symbol = arguments["symbol"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'symbol' argument".into()))?;
    Ok(symbol.trim_matches('$').to_uppercase())
}

fn days_argument(arguments: &serde_json::Value) -> Result<u64, ToolError> {
    let days = match &arguments["days"] {
        serde_json::Value::Null => DEFAULT_HISTORY_DAYS,
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().and_then(whole_days))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("'days' must be a whole number of days, got {n}"))
            })?,
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_days))
                .ok_or_else(|| ToolError::InvalidArguments(format!("'days' is not a number: {s}")))?
        }
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "'days' must be an integer, got {other}"
            )));
        }
    };
    Ok(days.clamp(1, MAX_HISTORY_DAYS))
}

/// `7.0` counts as seven days; `7.5` and negatives do not.
fn whole_days(f: f64) -> Option<u64> {
    (f.is_finite() && f.fract() == 0.0 && f >= 0.0).then_some(f as u64)
}

#[derive(Debug, Serialize)]
struct Quote {
    symbol: String,
    market: &'static str,
    price: f64,
    currency: String,
    change_24h_pct: f64,
    volume_24h: u64,
}

#[derive(Debug, Serialize)]
struct History {
    symbol: String,
    market: &'static str,
    closes: Vec<DailyClose>,
}

#[derive(Debug, Serialize)]
struct DailyClose {
    date: String,
    close: f64,
}

fn symbol_hash(symbol: &str) -> u32 {
    symbol
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Generate a deterministic mock quote based on the symbol hash.
fn mock_quote(market: Market, symbol: &str, currency: &str) -> Quote {
    let hash = symbol_hash(symbol);
    Quote {
        symbol: symbol.to_string(),
        market: market.noun(),
        price: round2(market.base_price(hash)),
        currency: currency.to_string(),
        change_24h_pct: round2(f64::from(hash % 2_000) / 100.0 - 10.0),
        volume_24h: 10_000 + u64::from(hash % 5_000_000),
    }
}

/// Daily closes oldest first, ending with today's quote price.
fn mock_history(market: Market, symbol: &str, days: u64) -> History {
    let hash = symbol_hash(symbol);
    let today = Utc::now().date_naive();
    let latest = market.base_price(hash);

    let closes = (0..days)
        .rev()
        .map(|offset| {
            // A small deterministic wobble per day, at most 4% either way.
            let seed = hash.wrapping_add((offset as u32).wrapping_mul(2_654_435_761));
            let wobble = f64::from(seed % 801) / 10_000.0 - 0.04;
            let close = if offset == 0 {
                latest
            } else {
                latest * (1.0 + wobble)
            };
            DailyClose {
                date: (today - Duration::days(offset as i64)).to_string(),
                close: round2(close),
            }
        })
        .collect();

    History {
        symbol: symbol.to_string(),
        market: market.noun(),
        closes,
    }
}
