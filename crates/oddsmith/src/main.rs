use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use oddsmith::exchange::RestMarketClient;
use oddsmith::models::consensus::ConsensusMethod;
use oddsmith::models::dependency::EventPair;
use oddsmith::models::market::Side;
use oddsmith::models::signal::SignalType;
use oddsmith::store::{MarketRecord, PositionRecord, Store};
use oddsmith::trading::{compute_performance_stats, MarketClient};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "oddsmith",
    about = "Multi-model consensus analysis and trading for binary prediction markets"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/oddsmith.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track a market and seed any existing exchange position
    AddMarket { market_id: String },
    /// Show live facts and mid prices for a market
    CheckMarket { market_id: String },
    /// Run (or reuse) the multi-agent consensus analysis
    Analyze {
        #[arg(long, conflicts_with = "all")]
        market: Option<String>,
        /// Analyze every tracked market
        #[arg(long)]
        all: bool,
        /// Specific option within the market
        #[arg(long)]
        option: Option<String>,
        /// Bypass the freshness cache
        #[arg(long)]
        force: bool,
        #[arg(long, default_value_t = 24)]
        cache_hours: i64,
        /// Override the configured aggregation method
        #[arg(long)]
        method: Option<String>,
    },
    /// Scan tracked markets for entry opportunities
    Scan {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        entry_threshold: Option<f64>,
        /// Restrict the scan to specific markets
        #[arg(long)]
        market: Vec<String>,
    },
    /// Check open positions for convergence exits
    Exits {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        exit_threshold: Option<f64>,
    },
    /// Cheap single-agent dependency screening for a pair of markets
    Screen { market_a: String, market_b: String },
    /// Full two-round dependency analysis for a pair of markets
    Depends { market_a: String, market_b: String },
    /// Recent trading signals
    Signals {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Filter by type: entry or exit
        #[arg(long)]
        signal_type: Option<String>,
    },
    /// Trade decision history
    Decisions {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Performance statistics over the decision log
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = oddsmith::load_config(&cli.config)?;

    match cli.command {
        Command::AddMarket { market_id } => {
            let market = RestMarketClient::new(&config.exchange);
            let store = Store::open(&config.store)?;

            let facts = market.market_facts(&market_id).await?;
            store.upsert_market(&MarketRecord {
                id: market_id.clone(),
                title: facts.title.clone(),
                close_time: facts.close_time,
                status: facts.status.clone(),
                category: None,
                metadata: None,
            })?;
            println!("tracking {market_id}: {}", facts.title);

            if let Some(position) = market.position(&market_id).await? {
                if position.contracts != 0 {
                    let quantity = position.contracts.abs();
                    store.upsert_position(&PositionRecord {
                        market_id: market_id.clone(),
                        option: market_id.clone(),
                        side: if position.contracts > 0 { Side::Yes } else { Side::No },
                        quantity,
                        avg_price: if quantity > 0 {
                            position.total_cost / quantity as f64
                        } else {
                            0.0
                        },
                        unrealized_pnl: None,
                    })?;
                    println!("seeded existing position of {} contracts", position.contracts);
                }
            }
        }

        Command::CheckMarket { market_id } => {
            let market = RestMarketClient::new(&config.exchange);
            let facts = market.market_facts(&market_id).await?;
            let yes = market.mid_price(&market_id, Side::Yes).await?;
            let no = market.mid_price(&market_id, Side::No).await?;

            println!("{market_id}: {}", facts.title);
            println!("  status:        {}", facts.status.as_deref().unwrap_or("unknown"));
            println!("  yes mid:       {}", format_price(yes));
            println!("  no mid:        {}", format_price(no));
            println!("  24h volume:    {}", format_metric(facts.volume_24h));
            println!("  liquidity:     {}", format_metric(facts.liquidity));
            println!(
                "  open interest: {}",
                facts.open_interest.map_or("n/a".to_string(), |v| v.to_string())
            );
        }

        Command::Analyze {
            market,
            all,
            option,
            force,
            cache_hours,
            method,
        } => {
            if let Some(method) = method {
                config.agents.consensus_method = method
                    .parse::<ConsensusMethod>()
                    .map_err(|e| anyhow::anyhow!(e))
                    .context("invalid --method")?;
            }

            let exchange: Arc<dyn MarketClient> =
                Arc::new(RestMarketClient::new(&config.exchange));
            let strategy = oddsmith::build_strategy(&config, exchange)?;
            let analyzer = strategy.signal_generator().analyzer();

            let targets: Vec<String> = if all {
                strategy
                    .store()
                    .all_markets()?
                    .into_iter()
                    .map(|m| m.id)
                    .collect()
            } else {
                match market {
                    Some(market_id) => vec![market_id],
                    None => bail!("specify either --market <id> or --all"),
                }
            };
            if targets.is_empty() {
                bail!("no tracked markets to analyze; use add-market first");
            }

            for market_id in targets {
                let outcome = analyzer
                    .analyze(&market_id, option.as_deref(), force, cache_hours)
                    .await
                    .with_context(|| format!("analysis failed for {market_id}"))?;
                eprintln!(
                    "{market_id}: yes {:.1}% / no {:.1}% over {} agents{}",
                    outcome.analysis.consensus.yes_confidence * 100.0,
                    outcome.analysis.consensus.no_confidence * 100.0,
                    outcome.analysis.consensus.agent_count,
                    if outcome.from_cache { " (cached)" } else { "" }
                );
                println!("{}", serde_json::to_string_pretty(&outcome.analysis)?);
            }
        }

        Command::Scan {
            force,
            entry_threshold,
            market,
        } => {
            if let Some(threshold) = entry_threshold {
                config.trading.entry_threshold = threshold;
            }
            let exchange: Arc<dyn MarketClient> =
                Arc::new(RestMarketClient::new(&config.exchange));
            let strategy = oddsmith::build_strategy(&config, exchange)?;

            let markets = if market.is_empty() { None } else { Some(market.as_slice()) };
            let signals = strategy.scan(markets, force).await?;
            eprintln!("{} opportunity(ies) found", signals.len());
            println!("{}", serde_json::to_string_pretty(&signals)?);
        }

        Command::Exits { force, exit_threshold } => {
            if let Some(threshold) = exit_threshold {
                config.trading.exit_threshold = threshold;
            }
            let exchange: Arc<dyn MarketClient> =
                Arc::new(RestMarketClient::new(&config.exchange));
            let strategy = oddsmith::build_strategy(&config, exchange)?;

            let signals = strategy.monitor_exits(force).await?;
            eprintln!("{} position(s) ready to exit", signals.len());
            println!("{}", serde_json::to_string_pretty(&signals)?);
        }

        Command::Screen { market_a, market_b } => {
            let exchange = RestMarketClient::new(&config.exchange);
            let pair = event_pair(&exchange, &market_a, &market_b).await?;
            let detector = oddsmith::build_detector(&config)?;

            let result = detector.screen(&pair).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Depends { market_a, market_b } => {
            let exchange = RestMarketClient::new(&config.exchange);
            let pair = event_pair(&exchange, &market_a, &market_b).await?;
            let detector = oddsmith::build_detector(&config)?;

            let result = detector
                .analyze(&pair)
                .await
                .context("dependency analysis failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Signals { limit, signal_type } => {
            let store = Store::open(&config.store)?;
            let kind = match signal_type.as_deref() {
                None => None,
                Some("entry") => Some(SignalType::Entry),
                Some("exit") => Some(SignalType::Exit),
                Some(other) => bail!("unknown signal type: {other} (expected entry or exit)"),
            };
            let signals = store.recent_signals(limit, kind)?;
            println!("{}", serde_json::to_string_pretty(&signals)?);
        }

        Command::Decisions { limit } => {
            let store = Store::open(&config.store)?;
            let decisions = store.decision_history(limit, None)?;
            println!("{}", serde_json::to_string_pretty(&decisions)?);
        }

        Command::Stats => {
            let store = Store::open(&config.store)?;
            let stats = compute_performance_stats(&store)?;
            println!("signals:        {}", stats.total_signals);
            println!("decisions:      {}", stats.total_decisions);
            println!("approved:       {}", stats.approved);
            println!("executed:       {}", stats.executed);
            println!("closed trades:  {}", stats.closed_trades);
            println!("wins / losses:  {} / {}", stats.wins, stats.losses);
            println!("win rate:       {:.1}%", stats.win_rate * 100.0);
            println!("total pnl:      ${:.2}", stats.total_pnl);
        }
    }

    Ok(())
}

async fn event_pair(
    exchange: &RestMarketClient,
    market_a: &str,
    market_b: &str,
) -> Result<EventPair> {
    let facts_a = exchange
        .market_facts(market_a)
        .await
        .with_context(|| format!("failed to fetch {market_a}"))?;
    let facts_b = exchange
        .market_facts(market_b)
        .await
        .with_context(|| format!("failed to fetch {market_b}"))?;
    Ok(EventPair {
        a_ticker: market_a.to_string(),
        a_title: facts_a.title,
        a_category: None,
        b_ticker: market_b.to_string(),
        b_title: facts_b.title,
        b_category: None,
        same_series: false,
    })
}

fn format_price(price: Option<f64>) -> String {
    price.map_or("n/a".to_string(), |p| format!("${p:.2}"))
}

fn format_metric(value: Option<f64>) -> String {
    value.map_or("n/a".to_string(), |v| format!("{v:.2}"))
}
