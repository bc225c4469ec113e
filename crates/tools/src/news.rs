//! News tools: stubs that return mock headlines.
//!
//! In production these would call a news API. The stubs pick headlines
//! from fixed templates so the agent has something to summarise.

use async_trait::async_trait;
use chrono::Utc;
use ivan_core::error::ToolError;
use ivan_core::tool::Tool;
use serde::Serialize;

/// Which feed a [`NewsTool`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsFeed {
    /// Overall financial and cryptocurrency markets (`get_news`)
    General,
    /// Stock markets (`get_market_news`)
    Market,
    /// One cryptocurrency (`get_coin_news`)
    Coin,
}

pub struct NewsTool {
    feed: NewsFeed,
}

impl NewsTool {
    pub fn new(feed: NewsFeed) -> Self {
        Self { feed }
    }
}

#[derive(Debug, Serialize)]
struct Headline {
    date: String,
    headline: String,
    sentiment: &'static str,
}

#[derive(Debug, Serialize)]
struct NewsDigest {
    feed: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
    articles: Vec<Headline>,
}

const COIN_SIGNATURE: &[&str] = &["symbol"];
const NO_SIGNATURE: &[&str] = &[];

const GENERAL_HEADLINES: &[(&str, &str)] = &[
    ("Central banks signal steady rates as inflation cools", "neutral"),
    ("Crypto market cap climbs as institutional inflows return", "positive"),
    ("Bond yields dip on softer jobs data", "neutral"),
];

const MARKET_HEADLINES: &[(&str, &str)] = &[
    ("Tech stocks lead broad rally on strong earnings", "positive"),
    ("Energy sector slips as oil prices retreat", "negative"),
    ("Small caps outperform as volatility eases", "positive"),
];

const COIN_HEADLINES: &[(&str, &str)] = &[
    ("{symbol} network activity hits monthly high", "positive"),
    ("Analysts split on {symbol} after sharp weekly move", "neutral"),
    ("Exchange outflows of {symbol} point to long-term holding", "positive"),
];

#[async_trait]
impl Tool for NewsTool {
    fn name(&self) -> &str {
        match self.feed {
            NewsFeed::General => "get_news",
            NewsFeed::Market => "get_market_news",
            NewsFeed::Coin => "get_coin_news",
        }
    }

    fn description(&self) -> &str {
        match self.feed {
            NewsFeed::General => {
                "Fetches recent news about the overall financial and cryptocurrency markets."
            }
            NewsFeed::Market => "Fetches recent news about the stock markets.",
            NewsFeed::Coin => {
                "Collects recent news specific to a particular cryptocurrency. Accepts one argument, which specifies the cryptocurrency."
            }
        }
    }

    fn signature(&self) -> &[&str] {
        match self.feed {
            NewsFeed::Coin => COIN_SIGNATURE,
            _ => NO_SIGNATURE,
        }
    }

    fn parameters_schema(&self) -> serde_json::Value {
        match self.feed {
            NewsFeed::Coin => serde_json::json!({
                "type": "object",
                "properties": {
                    "symbol": {
                        "type": "string",
                        "description": "Ticker of the cryptocurrency (e.g. BTC)"
                    }
                },
                "required": ["symbol"]
            }),
            _ => serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let today = Utc::now().date_naive().to_string();
        let (feed, symbol, templates) = match self.feed {
            NewsFeed::General => ("general", None, GENERAL_HEADLINES),
            NewsFeed::Market => ("stock_market", None, MARKET_HEADLINES),
            NewsFeed::Coin => {
                let symbol = arguments["symbol"]
                    .as_str()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ToolError::InvalidArguments("Missing 'symbol' argument".into()))?
                    .to_uppercase();
                ("coin", Some(symbol), COIN_HEADLINES)
            }
        };

        let articles = templates
            .iter()
            .map(|&(headline, sentiment)| Headline {
                date: today.clone(),
                headline: match &symbol {
                    Some(s) => headline.replace("{symbol}", s),
                    None => headline.to_string(),
                },
                sentiment,
            })
            .collect();

        let digest = NewsDigest {
            feed,
            symbol,
            articles,
        };
        serde_json::to_value(&digest).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}
