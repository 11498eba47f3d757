use crate::core::feed::PriceFeed;
use crate::providers::util::with_retry;
use crate::scheduler::RetryPolicy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("cryptorate/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Deserialize, Debug)]
struct SimplePrice {
    usd: Option<f64>,
}

#[async_trait]
impl PriceFeed for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoFetch", skip(self), fields(count = ids.len()))]
    async fn fetch_prices(&self, ids: &[String]) -> Result<HashMap<String, f64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = Url::parse_with_params(
            &format!("{}/simple/price", self.base_url),
            &[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())],
        )
        .with_context(|| format!("Invalid CoinGecko base URL: {}", self.base_url))?;
        debug!("Requesting prices from {}", url);

        let response = with_retry(
            || async {
                self.client
                    .get(url.clone())
                    .send()
                    .await?
                    .error_for_status()
            },
            RetryPolicy::fixed(3, Duration::from_millis(500)),
        )
        .await
        .context("CoinGecko request failed")?;

        let body: HashMap<String, SimplePrice> = response
            .json()
            .await
            .context("Failed to parse CoinGecko response")?;

        let mut prices = HashMap::with_capacity(body.len());
        for (id, quote) in body {
            match quote.usd {
                Some(price) => {
                    prices.insert(id, price);
                }
                None => warn!("No USD quote for {}", id),
            }
        }
        debug!("Fetched {} prices", prices.len());
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(ids: &str, status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", ids))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let mock_response = r#"{"bitcoin": {"usd": 45000.5}, "ethereum": {"usd": 2500.25}}"#;
        let mock_server = create_mock_server("bitcoin,ethereum", 200, mock_response).await;

        let provider = CoinGeckoProvider::new(&mock_server.uri()).unwrap();
        let prices = provider
            .fetch_prices(&ids(&["bitcoin", "ethereum"]))
            .await
            .unwrap();

        assert_eq!(prices.len(), 2);
        assert_eq!(prices["bitcoin"], 45000.5);
        assert_eq!(prices["ethereum"], 2500.25);
    }

    #[tokio::test]
    async fn test_missing_usd_quote_is_skipped() {
        let mock_response = r#"{"bitcoin": {"usd": 45000.0}, "unknowncoin": {}}"#;
        let mock_server = create_mock_server("bitcoin,unknowncoin", 200, mock_response).await;

        let provider = CoinGeckoProvider::new(&mock_server.uri()).unwrap();
        let prices = provider
            .fetch_prices(&ids(&["bitcoin", "unknowncoin"]))
            .await
            .unwrap();

        assert_eq!(prices.len(), 1);
        assert!(prices.contains_key("bitcoin"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_an_error() {
        let mock_server = create_mock_server("bitcoin", 200, "not json").await;

        let provider = CoinGeckoProvider::new(&mock_server.uri()).unwrap();
        let result = provider.fetch_prices(&ids(&["bitcoin"])).await;
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse CoinGecko response")
        );
    }

    #[tokio::test]
    async fn test_server_error_is_an_error() {
        let mock_server = create_mock_server("bitcoin", 503, "").await;

        let provider = CoinGeckoProvider::new(&mock_server.uri()).unwrap();
        let result = provider.fetch_prices(&ids(&["bitcoin"])).await;
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "CoinGecko request failed"
        );
    }

    #[tokio::test]
    async fn test_empty_id_list_skips_request() {
        let provider = CoinGeckoProvider::new("http://127.0.0.1:9").unwrap();
        let prices = provider.fetch_prices(&[]).await.unwrap();
        assert!(prices.is_empty());
    }
}
