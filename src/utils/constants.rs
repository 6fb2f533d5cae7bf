//! Constants Module - Single Source of Truth
//!
//! Chain ids, venue addresses, provider URLs, and the curated list of
//! well-known tokens live here. No other module hardcodes them.

use alloy_primitives::{Address, U256};
use std::str::FromStr;

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = concat!("RusterRisk/", env!("CARGO_PKG_VERSION"));

// ============================================
// GATEWAY DEFAULTS
// ============================================

/// Default per-call timeout (milliseconds)
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5_000;

/// Default retry attempts after the first call
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default provider rate limit
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.0;

/// Consecutive failures before an endpoint is rotated out
pub const DEFAULT_FAILOVER_THRESHOLD: u32 = 2;

/// Exponential backoff: base delay (doubles per attempt) and cap
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 200;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 5_000;

/// Random jitter applied to each backoff delay (±percent)
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Default price feed (DexScreener-compatible `/tokens/{address}`)
pub const DEFAULT_PRICE_FEED_URL: &str = "https://api.dexscreener.com/latest/dex";

/// Default report cache TTL (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Peg hysteresis history older than this is forgotten (24 hours)
pub const DEFAULT_PEG_STATE_RETENTION_SECS: u64 = 86_400;

// ============================================
// CHAIN IDS
// ============================================

/// Ethereum Mainnet
pub const CHAIN_ID_ETHEREUM: u64 = 1;
/// BNB Smart Chain
pub const CHAIN_ID_BSC: u64 = 56;
/// Polygon
pub const CHAIN_ID_POLYGON: u64 = 137;
/// Arbitrum One
pub const CHAIN_ID_ARBITRUM: u64 = 42161;
/// Optimism
pub const CHAIN_ID_OPTIMISM: u64 = 10;
/// Avalanche C-Chain
pub const CHAIN_ID_AVALANCHE: u64 = 43114;
/// Base
pub const CHAIN_ID_BASE: u64 = 8453;

/// All supported EVM chain IDs
pub const SUPPORTED_CHAIN_IDS: [u64; 7] = [
    CHAIN_ID_ETHEREUM,
    CHAIN_ID_BSC,
    CHAIN_ID_POLYGON,
    CHAIN_ID_ARBITRUM,
    CHAIN_ID_OPTIMISM,
    CHAIN_ID_AVALANCHE,
    CHAIN_ID_BASE,
];

// ============================================
// WRAPPED NATIVE ADDRESSES
// ============================================

/// Get WETH/WBNB/... address for a chain
pub fn get_weth_address(chain_id: u64) -> Option<Address> {
    let addr_str = match chain_id {
        CHAIN_ID_ETHEREUM => "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
        CHAIN_ID_BSC => "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c",
        CHAIN_ID_POLYGON => "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270",
        CHAIN_ID_ARBITRUM => "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1",
        CHAIN_ID_OPTIMISM => "0x4200000000000000000000000000000000000006",
        CHAIN_ID_AVALANCHE => "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7",
        CHAIN_ID_BASE => "0x4200000000000000000000000000000000000006",
        _ => return None,
    };
    Address::from_str(addr_str).ok()
}

// ============================================
// DEX ROUTER ADDRESSES
// ============================================

/// Primary V2-compatible trading venue (name, router address) for a chain
pub fn get_primary_router(chain_id: u64) -> Option<(&'static str, Address)> {
    let (name, addr_str) = match chain_id {
        CHAIN_ID_ETHEREUM => ("Uniswap V2", "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
        CHAIN_ID_BSC => ("PancakeSwap V2", "0x10ED43C718714eb63d5aA57B78B54704E256024E"),
        CHAIN_ID_POLYGON => ("QuickSwap", "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff"),
        CHAIN_ID_ARBITRUM => ("Camelot", "0xc873fEcbd354f5A56E00E710B90EF4201db2448d"),
        CHAIN_ID_OPTIMISM => ("SushiSwap", "0x4C5D5234f232BD2D76B96aA33F5AE4FCF0E4BFAb"),
        CHAIN_ID_AVALANCHE => ("TraderJoe", "0x60aE616a2155Ee3d9A68541Ba4544862310933d4"),
        CHAIN_ID_BASE => ("PancakeSwap V2", "0x02a84c1b3BBD7401a5f7fa98a384EBC70bB5749E"),
        _ => return None,
    };
    Address::from_str(addr_str).ok().map(|address| (name, address))
}

// ============================================
// PUBLIC RPC FALLBACKS
// ============================================

/// Get public RPC fallback URL for a chain
pub fn get_public_rpc_fallback(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("https://eth.llamarpc.com"),
        CHAIN_ID_BSC => Some("https://bsc-dataseed.binance.org"),
        CHAIN_ID_POLYGON => Some("https://polygon-rpc.com"),
        CHAIN_ID_ARBITRUM => Some("https://arb1.arbitrum.io/rpc"),
        CHAIN_ID_OPTIMISM => Some("https://mainnet.optimism.io"),
        CHAIN_ID_AVALANCHE => Some("https://api.avax.network/ext/bc/C/rpc"),
        CHAIN_ID_BASE => Some("https://mainnet.base.org"),
        _ => None,
    }
}

// ============================================
// ALCHEMY NETWORK MAPPING
// ============================================

/// Get Alchemy subdomain for a chain
pub fn get_alchemy_subdomain(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("eth-mainnet"),
        CHAIN_ID_BSC => Some("bnb-mainnet"),
        CHAIN_ID_POLYGON => Some("polygon-mainnet"),
        CHAIN_ID_ARBITRUM => Some("arb-mainnet"),
        CHAIN_ID_OPTIMISM => Some("opt-mainnet"),
        CHAIN_ID_AVALANCHE => Some("avax-mainnet"),
        CHAIN_ID_BASE => Some("base-mainnet"),
        _ => None,
    }
}

/// Build Alchemy URL for a chain
pub fn build_alchemy_url(chain_id: u64, api_key: &str) -> Option<String> {
    get_alchemy_subdomain(chain_id)
        .map(|subdomain| format!("https://{}.g.alchemy.com/v2/{}", subdomain, api_key))
}

/// Mask API keys embedded in provider URLs before logging
pub fn mask_url(url: &str) -> String {
    if let Some((base, _)) = url.split_once("/v2/") {
        return format!("{}/v2/***HIDDEN***", base);
    }
    url.to_string()
}

// ============================================
// CHAIN METADATA
// ============================================

/// Get chain name
pub fn get_chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_ETHEREUM => "Ethereum",
        CHAIN_ID_BSC => "BNB Smart Chain",
        CHAIN_ID_POLYGON => "Polygon",
        CHAIN_ID_ARBITRUM => "Arbitrum One",
        CHAIN_ID_OPTIMISM => "Optimism",
        CHAIN_ID_AVALANCHE => "Avalanche C-Chain",
        CHAIN_ID_BASE => "Base",
        _ => "Unknown",
    }
}

/// Convert numeric chain ID to DexScreener chain name
pub fn chain_id_to_dexscreener_name(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_ID_ETHEREUM => Some("ethereum"),
        CHAIN_ID_BSC => Some("bsc"),
        CHAIN_ID_POLYGON => Some("polygon"),
        CHAIN_ID_ARBITRUM => Some("arbitrum"),
        CHAIN_ID_OPTIMISM => Some("optimism"),
        CHAIN_ID_AVALANCHE => Some("avalanche"),
        CHAIN_ID_BASE => Some("base"),
        _ => None,
    }
}

// ============================================
// CONVERSION UTILITIES
// ============================================

/// Convert ETH to wei
#[inline]
pub fn eth_to_wei(eth: f64) -> U256 {
    U256::from((eth * 1e18) as u128)
}

// ============================================
// WELL-KNOWN TOKENS (impersonation targets)
// ============================================

/// A token commonly impersonated by scam deployments
#[derive(Debug, Clone, Copy)]
pub struct KnownToken {
    pub symbol: &'static str,
    pub name: &'static str,
    /// Canonical deployments as (chain_id, address)
    pub canonical: &'static [(u64, &'static str)],
}

impl KnownToken {
    /// Whether (chain_id, address) is a canonical deployment of this token
    pub fn is_canonical(&self, chain_id: u64, address: &str) -> bool {
        self.canonical
            .iter()
            .any(|(c, a)| *c == chain_id && a.eq_ignore_ascii_case(address.trim()))
    }
}

pub const KNOWN_TOKENS: &[KnownToken] = &[
    KnownToken {
        symbol: "USDT",
        name: "Tether USD",
        canonical: &[
            (CHAIN_ID_ETHEREUM, "0xdAC17F958D2ee523a2206206994597C13D831ec7"),
            (CHAIN_ID_BSC, "0x55d398326f99059fF775485246999027B3197955"),
            (CHAIN_ID_ARBITRUM, "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
            (CHAIN_ID_POLYGON, "0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
        ],
    },
    KnownToken {
        symbol: "USDC",
        name: "USD Coin",
        canonical: &[
            (CHAIN_ID_ETHEREUM, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            (CHAIN_ID_BSC, "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"),
            (CHAIN_ID_ARBITRUM, "0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
            (CHAIN_ID_BASE, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            (CHAIN_ID_POLYGON, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
        ],
    },
    KnownToken {
        symbol: "DAI",
        name: "Dai Stablecoin",
        canonical: &[(CHAIN_ID_ETHEREUM, "0x6B175474E89094C44Da98b954EedeAC495271d0F")],
    },
    KnownToken {
        symbol: "WETH",
        name: "Wrapped Ether",
        canonical: &[
            (CHAIN_ID_ETHEREUM, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            (CHAIN_ID_ARBITRUM, "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
            (CHAIN_ID_OPTIMISM, "0x4200000000000000000000000000000000000006"),
            (CHAIN_ID_BASE, "0x4200000000000000000000000000000000000006"),
        ],
    },
    KnownToken {
        symbol: "WBTC",
        name: "Wrapped BTC",
        canonical: &[(CHAIN_ID_ETHEREUM, "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599")],
    },
    KnownToken {
        symbol: "WBNB",
        name: "Wrapped BNB",
        canonical: &[(CHAIN_ID_BSC, "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c")],
    },
    KnownToken {
        symbol: "LINK",
        name: "ChainLink Token",
        canonical: &[(CHAIN_ID_ETHEREUM, "0x514910771AF9Ca656af840dff83E8264EcF986CA")],
    },
    KnownToken {
        symbol: "UNI",
        name: "Uniswap",
        canonical: &[(CHAIN_ID_ETHEREUM, "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984")],
    },
    KnownToken {
        symbol: "PEPE",
        name: "Pepe",
        canonical: &[(CHAIN_ID_ETHEREUM, "0x6982508145454Ce325dDbE47a25d4ec3d2311933")],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eth_to_wei() {
        let wei = eth_to_wei(1.5);
        assert_eq!(wei, U256::from(1_500_000_000_000_000_000u128));
    }

    #[test]
    fn test_primary_router() {
        let (name, _) = get_primary_router(CHAIN_ID_ETHEREUM).unwrap();
        assert_eq!(name, "Uniswap V2");
        assert!(get_primary_router(999).is_none());
    }

    #[test]
    fn test_mask_url() {
        let masked = mask_url("https://eth-mainnet.g.alchemy.com/v2/secret");
        assert_eq!(masked, "https://eth-mainnet.g.alchemy.com/v2/***HIDDEN***");
        assert_eq!(mask_url("https://eth.llamarpc.com"), "https://eth.llamarpc.com");
    }

    #[test]
    fn test_canonical_lookup_ignores_case() {
        let usdc = KNOWN_TOKENS.iter().find(|t| t.symbol == "USDC").unwrap();
        assert!(usdc.is_canonical(1, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"));
        assert!(!usdc.is_canonical(56, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"));
    }
}
