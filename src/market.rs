use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum MarketError {
    /// Transport failure or non-2xx status
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("response body is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    /// Valid JSON without the expected `payload.orders` layout
    #[error("unexpected response shape: {0}")]
    Shape(#[source] serde_json::Error),
}

impl MarketError {
    /// The marketplace answered, but not with an order book for this item.
    pub fn is_item_missing(&self) -> bool {
        matches!(self, MarketError::Shape(_))
    }
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    payload: OrdersPayload,
}

#[derive(Debug, Deserialize)]
struct OrdersPayload {
    orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
struct Order {
    order_type: OrderType,
    #[serde(deserialize_with = "whole_platinum")]
    platinum: u64,
}

/// Accepts `30` as well as `30.0`; fractional or negative amounts are rejected.
fn whole_platinum<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(n) = number.as_u64() {
        return Ok(n);
    }
    match number.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(serde::de::Error::custom(format!(
            "platinum must be a whole non-negative amount, got {number}"
        ))),
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum OrderType {
    Buy,
    Sell,
    #[serde(other)]
    Other,
}

/// First listed buy and sell price, in platinum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriceQuote {
    pub best_buy: Option<u64>,
    pub best_sell: Option<u64>,
}

impl PriceQuote {
    /// Takes the first order of each side in API order. No sorting by price.
    fn from_orders(orders: &[Order]) -> Self {
        let first = |side: OrderType| {
            orders
                .iter()
                .find(|order| order.order_type == side)
                .map(|order| order.platinum)
        };
        Self {
            best_buy: first(OrderType::Buy),
            best_sell: first(OrderType::Sell),
        }
    }

    pub fn parse(body: &str) -> Result<Self, MarketError> {
        let value: serde_json::Value = serde_json::from_str(body).map_err(MarketError::Decode)?;
        let response: OrdersResponse =
            serde_json::from_value(value).map_err(MarketError::Shape)?;
        Ok(Self::from_orders(&response.payload.orders))
    }

    /// `<Title> WTB: <p>p, WTS: <p>p`
    pub fn render(&self, title: &str) -> String {
        let side = |price: Option<u64>, missing: &str| match price {
            Some(p) => p.to_string(),
            None => missing.to_string(),
        };
        format!(
            "{} WTB: {}p, WTS: {}p",
            title,
            side(self.best_buy, "No buy orders found"),
            side(self.best_sell, "No sell orders found")
        )
    }
}

/// Marketplace url slug: spaces become underscores. Percent-encoding happens
/// when the slug is pushed as a path segment.
pub fn item_slug(item: &str) -> String {
    item.replace(' ', "_")
}

/// Human form of an item name: underscores become spaces, each letter that
/// follows a non-letter is upper-cased and all others lower-cased.
pub fn display_name(item: &str) -> String {
    let mut out = String::with_capacity(item.len());
    let mut prev_is_letter = false;
    for c in item.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn quote(&self, item: &str) -> Result<PriceQuote, MarketError>;
}

pub struct MarketClient {
    client: reqwest::Client,
    base_url: Url,
}

impl MarketClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid market base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Market base URL cannot carry a path: {}", base_url);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    fn orders_url(&self, item: &str) -> Url {
        let slug = item_slug(item);
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "items", slug.as_str(), "orders"]);
        }
        url
    }
}

#[async_trait]
impl PriceSource for MarketClient {
    async fn quote(&self, item: &str) -> Result<PriceQuote, MarketError> {
        let url = self.orders_url(item);
        debug!("Fetching orders: {}", url);

        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        PriceQuote::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_body(orders: serde_json::Value) -> String {
        serde_json::json!({ "payload": { "orders": orders } }).to_string()
    }

    #[test]
    fn test_item_slug() {
        assert_eq!(item_slug("soma prime"), "soma_prime");
        assert_eq!(item_slug("primed bane of grineer"), "primed_bane_of_grineer");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("soma prime"), "Soma Prime");
        assert_eq!(display_name("rhino_prime_set"), "Rhino Prime Set");
        assert_eq!(display_name("primed bane of grineer"), "Primed Bane Of Grineer");
        assert_eq!(display_name("nonexistent item"), "Nonexistent Item");
        assert_eq!(display_name("ak-47 mk1"), "Ak-47 Mk1");
    }

    #[test]
    fn test_orders_url_encodes_segment() {
        let client = MarketClient::new("https://api.warframe.market").unwrap();
        assert_eq!(
            client.orders_url("soma prime").as_str(),
            "https://api.warframe.market/v1/items/soma_prime/orders"
        );
        assert_eq!(
            client.orders_url("a/b?c").as_str(),
            "https://api.warframe.market/v1/items/a%2Fb%3Fc/orders"
        );
    }

    #[test]
    fn test_orders_url_keeps_base_path() {
        let client = MarketClient::new("http://localhost:1234/proxy/").unwrap();
        assert_eq!(
            client.orders_url("soma prime").as_str(),
            "http://localhost:1234/proxy/v1/items/soma_prime/orders"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(MarketClient::new("mailto:someone@example.com").is_err());
        assert!(MarketClient::new("not a url").is_err());
    }

    #[test]
    fn test_parse_takes_first_order_not_cheapest() {
        let body = orders_body(serde_json::json!([
            { "order_type": "sell", "platinum": 60, "quantity": 1 },
            { "order_type": "buy", "platinum": 25 },
            { "order_type": "sell", "platinum": 40 },
            { "order_type": "buy", "platinum": 35 },
        ]));
        let quote = PriceQuote::parse(&body).unwrap();
        assert_eq!(quote.best_buy, Some(25));
        assert_eq!(quote.best_sell, Some(60));
    }

    #[test]
    fn test_parse_empty_sides() {
        let quote = PriceQuote::parse(&orders_body(serde_json::json!([]))).unwrap();
        assert_eq!(quote, PriceQuote::default());
        assert_eq!(
            quote.render("Soma Prime"),
            "Soma Prime WTB: No buy orders foundp, WTS: No sell orders foundp"
        );
    }

    #[test]
    fn test_render_one_side_missing() {
        let quote = PriceQuote {
            best_buy: None,
            best_sell: Some(45),
        };
        assert_eq!(
            quote.render("Soma Prime"),
            "Soma Prime WTB: No buy orders foundp, WTS: 45p"
        );
    }

    #[test]
    fn test_parse_accepts_whole_float_platinum() {
        let body = orders_body(serde_json::json!([
            { "order_type": "buy", "platinum": 30.0 },
            { "order_type": "sell", "platinum": 45 },
        ]));
        let quote = PriceQuote::parse(&body).unwrap();
        assert_eq!(quote.best_buy, Some(30));
        assert_eq!(quote.best_sell, Some(45));
    }

    #[test]
    fn test_parse_rejects_fractional_platinum() {
        let body = orders_body(serde_json::json!([
            { "order_type": "buy", "platinum": 30.5 },
        ]));
        assert!(PriceQuote::parse(&body).unwrap_err().is_item_missing());
    }

    #[test]
    fn test_parse_ignores_unknown_order_types() {
        let body = orders_body(serde_json::json!([
            { "order_type": "auction", "platinum": 1 },
            { "order_type": "sell", "platinum": 45 },
        ]));
        let quote = PriceQuote::parse(&body).unwrap();
        assert_eq!(quote.best_buy, None);
        assert_eq!(quote.best_sell, Some(45));
    }

    #[test]
    fn test_parse_missing_payload_is_shape_error() {
        let err = PriceQuote::parse(r#"{"error": "not found"}"#).unwrap_err();
        assert!(err.is_item_missing());
        let err = PriceQuote::parse(r#"{"payload": {"orders": [{"platinum": 3}]}}"#).unwrap_err();
        assert!(err.is_item_missing());
    }

    #[test]
    fn test_parse_invalid_json_is_decode_error() {
        let err = PriceQuote::parse("<html>").unwrap_err();
        assert!(matches!(err, MarketError::Decode(_)));
        assert!(!err.is_item_missing());
    }

    #[test]
    fn test_render() {
        let quote = PriceQuote {
            best_buy: Some(30),
            best_sell: Some(45),
        };
        assert_eq!(quote.render("Soma Prime"), "Soma Prime WTB: 30p, WTS: 45p");
    }

    #[tokio::test]
    async fn test_quote_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/items/soma_prime/orders")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(orders_body(serde_json::json!([
                { "order_type": "buy", "platinum": 30 },
                { "order_type": "sell", "platinum": 45 },
            ])))
            .create_async()
            .await;

        let client = MarketClient::new(&server.url()).unwrap();
        let quote = client.quote("soma prime").await.unwrap();

        assert_eq!(quote.best_buy, Some(30));
        assert_eq!(quote.best_sell, Some(45));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_quote_not_found_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/items/nonexistent_item/orders")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let client = MarketClient::new(&server.url()).unwrap();
        let err = client.quote("nonexistent item").await.unwrap_err();

        assert!(matches!(err, MarketError::Request(_)));
        assert!(!err.is_item_missing());
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_quote_unexpected_shape() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/items/soma_prime/orders")
            .with_status(200)
            .with_body(r#"{"payload": {}}"#)
            .create_async()
            .await;

        let client = MarketClient::new(&server.url()).unwrap();
        let err = client.quote("soma prime").await.unwrap_err();
        assert!(err.is_item_missing());
    }
}
