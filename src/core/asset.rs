//! Tracked ETF families and their fund tickers

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Btc,
    Eth,
    Sol,
}

const BTC_TICKERS: &[&str] = &[
    "IBIT", "FBTC", "BITB", "ARKB", "BTCO", "EZBC", "BRRR", "HODL", "BTCW", "GBTC", "BTC",
];
const ETH_TICKERS: &[&str] = &[
    "ETHA", "FETH", "ETHW", "CETH", "ETHV", "QETH", "EZET", "ETHE", "ETH",
];
const SOL_TICKERS: &[&str] = &["BSOL", "VSOL", "FSOL", "TSOL", "SOEZ", "GSOL"];

impl AssetClass {
    pub const ALL: [AssetClass; 3] = [AssetClass::Btc, AssetClass::Eth, AssetClass::Sol];

    /// Lowercase identifier used in URLs, the database and the API.
    pub fn slug(&self) -> &'static str {
        match self {
            AssetClass::Btc => "btc",
            AssetClass::Eth => "eth",
            AssetClass::Sol => "sol",
        }
    }

    /// Fund tickers that may appear as columns on the source page.
    pub fn tickers(&self) -> &'static [&'static str] {
        match self {
            AssetClass::Btc => BTC_TICKERS,
            AssetClass::Eth => ETH_TICKERS,
            AssetClass::Sol => SOL_TICKERS,
        }
    }

    pub fn is_known_ticker(&self, ticker: &str) -> bool {
        self.tickers()
            .iter()
            .any(|t| t.eq_ignore_ascii_case(ticker.trim()))
    }

    /// Page address for this asset class under the given source base URL.
    pub fn page_url(&self, base_url: &str) -> String {
        format!("{}/{}/", base_url.trim_end_matches('/'), self.slug())
    }
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for AssetClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "btc" => Ok(AssetClass::Btc),
            "eth" => Ok(AssetClass::Eth),
            "sol" => Ok(AssetClass::Sol),
            _ => Err(anyhow::anyhow!(
                "Unsupported ETF type: {} (expected btc, eth or sol)",
                s
            )),
        }
    }
}
