//! Ruster Risk CLI
//!
//! Evaluates one token and prints the report.
//!
//! Usage: ruster_risk <chain_id> <address> <symbol> <name> <decimals> [--peg <target>]
//!
//! Endpoints come from `<CHAIN>_HTTP_URL`, `ALCHEMY_API_KEY`, and the public
//! fallbacks; engine settings from `RISK_*`.

use eyre::{bail, eyre, Result, WrapErr};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ruster_risk::{GatewayConfig, HttpGateway, RiskAggregator, RiskConfig, Subject, TokenRef};

const USAGE: &str =
    "usage: ruster_risk <chain_id> <address> <symbol> <name> <decimals> [--peg <target>]";

fn parse_args(args: &[String]) -> Result<TokenRef> {
    if args.len() < 5 {
        bail!(USAGE);
    }
    let chain_id: u64 = args[0].parse().wrap_err("chain_id must be an integer")?;
    let decimals: u8 = args[4].parse().wrap_err("decimals must be 0-255")?;
    let mut token = TokenRef::new(chain_id, &args[1], &args[2], &args[3], decimals);

    let mut rest = args[5..].iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--peg" => {
                let target = rest.next().ok_or_else(|| eyre!("--peg needs a target price"))?;
                token = token.pegged(target.parse().wrap_err("peg target must be a number")?);
            }
            other => bail!("unknown argument {}\n{}", other, USAGE),
        }
    }
    Ok(token)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let token = parse_args(&args)?;

    info!("🚀 Ruster Risk v{}", env!("CARGO_PKG_VERSION"));

    let gateway = HttpGateway::new(GatewayConfig::from_env())?;
    let aggregator = RiskAggregator::new(Arc::new(gateway), RiskConfig::from_env())?;

    let report = aggregator.evaluate(&Subject::Token(token)).await?;
    println!("{}", report.summary());
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!("📊 {}", aggregator.stats().to_json());
    Ok(())
}
