use oddsmith_models::config::RiskConfig;
use oddsmith_models::market::MarketFacts;
use oddsmith_models::signal::{SignalType, TradingSignal};
use oddsmith_store::PositionRecord;

/// Evaluate the per-signal risk rules. Pure: no portfolio state.
///
/// Hard failures (liquidity, volume, market status, spread) set
/// `passed = false`. An oversized quantity only warns; the executor
/// clamps rather than rejects.
pub fn apply_filters(
    signal: &TradingSignal,
    facts: &MarketFacts,
    config: &RiskConfig,
) -> (bool, Vec<String>) {
    let mut warnings = Vec::new();
    let mut passed = true;

    let liquidity = signal.liquidity.unwrap_or(0.0);
    if liquidity < config.min_liquidity {
        warnings.push(format!(
            "Low liquidity: {liquidity:.2} < {:.2}",
            config.min_liquidity
        ));
        passed = false;
    }

    let volume = signal.volume_24h.unwrap_or(0.0);
    if volume < config.min_volume_24h {
        warnings.push(format!(
            "Low 24h volume: {volume:.2} < {:.2}",
            config.min_volume_24h
        ));
        passed = false;
    }

    if signal.quantity > config.max_position_size {
        warnings.push(format!(
            "Position too large: {} > {} (will be capped)",
            signal.quantity, config.max_position_size
        ));
    }

    let status = facts.status.as_deref().unwrap_or("unknown");
    if !config.allowed_statuses.iter().any(|allowed| allowed == status) {
        warnings.push(format!(
            "Market status '{status}' not in allowed list: {:?}",
            config.allowed_statuses
        ));
        passed = false;
    }

    // For a fair book, yes + no ≈ 1.0; a large deviation means a wide
    // effective spread.
    if signal.market_yes > 0.0 && signal.market_no > 0.0 {
        let deviation = (signal.market_yes + signal.market_no - 1.0).abs();
        if deviation > config.max_spread {
            warnings.push(format!(
                "Wide spread detected: {:.1}% deviation from fair pricing",
                deviation * 100.0
            ));
            passed = false;
        }
    }

    (passed, warnings)
}

/// Cross-position exposure caps, checked by the orchestrator before
/// execution because they need portfolio-wide state.
pub fn check_position_limits(
    market_id: &str,
    new_quantity: i64,
    positions: &[PositionRecord],
    max_per_market: i64,
    max_total_exposure: i64,
) -> (bool, String) {
    let market_exposure: i64 = positions
        .iter()
        .filter(|p| p.market_id == market_id)
        .map(|p| p.quantity)
        .sum();
    let total_exposure: i64 = positions.iter().map(|p| p.quantity).sum();

    let new_market_exposure = market_exposure + new_quantity;
    if new_market_exposure > max_per_market {
        return (
            false,
            format!(
                "Market limit exceeded: {new_market_exposure} contracts (limit: {max_per_market})"
            ),
        );
    }

    let new_total_exposure = total_exposure + new_quantity;
    if new_total_exposure > max_total_exposure {
        return (
            false,
            format!(
                "Total exposure limit exceeded: {new_total_exposure} contracts (limit: {max_total_exposure})"
            ),
        );
    }

    (true, "Position limits OK".to_string())
}

/// Daily trade-count throttle.
pub fn check_daily_trade_limit(trades_today: i64, max_daily_trades: i64) -> (bool, String) {
    if trades_today >= max_daily_trades {
        return (
            false,
            format!("Daily trade limit reached: {trades_today}/{max_daily_trades} trades"),
        );
    }
    let remaining = max_daily_trades - trades_today;
    (true, format!("Daily limit OK ({remaining} trades remaining)"))
}

/// Exit signals skip entry-only checks.
pub fn needs_exposure_checks(signal: &TradingSignal) -> bool {
    signal.signal_type == SignalType::Entry
}
