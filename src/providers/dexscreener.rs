//! DexScreener-format price feed decoding
//!
//! The gateway's `getPrice` queries `{price_feed}/tokens/{address}` and picks
//! the USD price of the deepest pair on the requested chain where the token is
//! the base asset. Pairs with no reported liquidity rank last.

use serde::Deserialize;

use crate::utils::constants::chain_id_to_dexscreener_name;

/// DexScreener API response
#[derive(Debug, Deserialize)]
pub struct DexScreenerResponse {
    #[serde(default)]
    pub pairs: Option<Vec<DexPair>>,
}

/// A trading pair from DexScreener
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    /// Chain name (e.g., "ethereum", "bsc")
    pub chain_id: String,
    /// DEX identifier (e.g., "uniswap")
    pub dex_id: String,
    pub pair_address: String,
    pub base_token: DexToken,
    pub quote_token: DexToken,
    pub liquidity: Option<DexLiquidity>,
    /// Price in USD, as a decimal string
    pub price_usd: Option<String>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    fn price(&self) -> Option<f64> {
        self.price_usd
            .as_deref()
            .and_then(|p| p.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexLiquidity {
    pub usd: Option<f64>,
}

/// URL for a token lookup
pub fn token_url(base_url: &str, token_address: &str) -> String {
    format!("{}/tokens/{}", base_url.trim_end_matches('/'), token_address)
}

/// Price of `token_address` on `chain_id` from the deepest matching pair
pub fn select_price(response: &DexScreenerResponse, chain_id: u64, token_address: &str) -> Option<f64> {
    let chain_name = chain_id_to_dexscreener_name(chain_id)?;
    let pairs = response.pairs.as_ref()?;

    pairs
        .iter()
        .filter(|p| p.chain_id.eq_ignore_ascii_case(chain_name))
        .filter(|p| p.base_token.address.eq_ignore_ascii_case(token_address))
        .filter_map(|p| p.price().map(|price| (p.liquidity_usd(), price)))
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, price)| price)
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    fn response() -> DexScreenerResponse {
        let raw = r#"{
            "pairs": [
                {
                    "chainId": "ethereum", "dexId": "uniswap", "pairAddress": "0x01",
                    "baseToken": {"address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "symbol": "USDC"},
                    "quoteToken": {"address": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "symbol": "WETH"},
                    "liquidity": {"usd": 1000.0},
                    "priceUsd": "0.9700"
                },
                {
                    "chainId": "ethereum", "dexId": "uniswap", "pairAddress": "0x02",
                    "baseToken": {"address": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "symbol": "USDC"},
                    "quoteToken": {"address": "0xdac17f958d2ee523a2206206994597c13d831ec7", "symbol": "USDT"},
                    "liquidity": {"usd": 5000000.0},
                    "priceUsd": "1.0003"
                },
                {
                    "chainId": "bsc", "dexId": "pancakeswap", "pairAddress": "0x03",
                    "baseToken": {"address": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "symbol": "USDC"},
                    "quoteToken": {"address": "0x00", "symbol": "WBNB"},
                    "liquidity": {"usd": 90000000.0},
                    "priceUsd": "0.5"
                }
            ]
        }"#;
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_selects_deepest_pair_on_chain() {
        let price = select_price(&response(), 1, USDC).unwrap();
        assert!((price - 1.0003).abs() < 1e-9);
    }

    #[test]
    fn test_no_pairs_means_no_price() {
        let empty: DexScreenerResponse = serde_json::from_str(r#"{"pairs": null}"#).unwrap();
        assert!(select_price(&empty, 1, USDC).is_none());
        assert!(select_price(&response(), 999, USDC).is_none());
    }

    #[test]
    fn test_token_url() {
        assert_eq!(
            token_url("https://api.dexscreener.com/latest/dex/", USDC),
            format!("https://api.dexscreener.com/latest/dex/tokens/{}", USDC)
        );
    }
}
