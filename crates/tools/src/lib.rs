//! Built-in tool implementations for IVAN.
//!
//! Market data and news are deterministic offline stubs: the same symbol
//! always yields the same quote, so the agent loop can be exercised
//! end-to-end without network access. `respond_to_user` is the sentinel
//! that ends a run.

pub mod market;
pub mod news;
pub mod respond_to_user;

use ivan_core::tool::ToolRegistry;

pub use market::{HistoryTool, Market, PriceTool};
pub use news::{NewsFeed, NewsTool};
pub use respond_to_user::RespondToUserTool;

/// Create a registry with every built-in tool, quoting in USD.
pub fn default_registry() -> ToolRegistry {
    registry_with_currency("usd")
}

/// Create a registry with every built-in tool, quoting prices in
/// `default_currency` unless an action names one.
pub fn registry_with_currency(default_currency: &str) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(PriceTool::new(Market::Coin, default_currency)));
    registry.register(Box::new(PriceTool::new(Market::Stock, default_currency)));
    registry.register(Box::new(HistoryTool::new(Market::Coin)));
    registry.register(Box::new(HistoryTool::new(Market::Stock)));
    registry.register(Box::new(NewsTool::new(NewsFeed::General)));
    registry.register(Box::new(NewsTool::new(NewsFeed::Market)));
    registry.register(Box::new(NewsTool::new(NewsFeed::Coin)));
    registry.register(Box::new(RespondToUserTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivan_core::action::Action;

    #[test]
    fn default_registry_has_every_tool() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec![
                "get_coin_history",
                "get_coin_news",
                "get_coin_price",
                "get_market_news",
                "get_news",
                "get_stock_history",
                "get_stock_price",
                "respond_to_user",
            ]
        );
    }

    #[test]
    fn signatures_name_the_symbol_first() {
        let sigs = default_registry().signatures();
        assert_eq!(sigs["get_coin_price"][0], "symbol");
        assert_eq!(sigs["get_stock_history"], vec!["symbol", "days"]);
        assert!(sigs["get_news"].is_empty());
        assert_eq!(sigs["respond_to_user"], vec!["message"]);
    }

    #[tokio::test]
    async fn bare_argument_reaches_symbol() {
        let registry = registry_with_currency("eur");
        let result = registry
            .dispatch(&Action::with_text("get_coin_price", "btc"))
            .await;
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.payload["symbol"], "BTC");
        assert_eq!(result.payload["currency"], "EUR");
    }

    #[tokio::test]
    async fn missing_symbol_is_an_error_result() {
        let result = default_registry()
            .dispatch(&Action::named("get_stock_price"))
            .await;
        assert!(!result.is_success());
        assert!(result.error.unwrap().contains("get_stock_price"));
    }
}
