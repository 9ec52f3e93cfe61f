use oddsmith_models::config::TradingConfig;

/// Contracts to buy for a given divergence.
///
/// `base_position * (divergence / reference_divergence) ^ scaling_factor`,
/// rounded and capped at `max_position`. Deliberately super-linear: an
/// edge at the reference gets the base size, larger edges get
/// disproportionately more, with the cap bounding tail risk.
pub fn position_size(divergence: f64, config: &TradingConfig) -> i64 {
    if divergence <= 0.0 {
        return 0;
    }
    let ratio = divergence / config.reference_divergence;
    let raw = config.base_position as f64 * ratio.powf(config.scaling_factor);
    (raw.round() as i64).min(config.max_position)
}

/// Expected profit in dollars, rounded to cents.
pub fn expected_profit(quantity: i64, entry_price: f64, target_price: f64) -> f64 {
    let profit = quantity as f64 * (target_price - entry_price);
    (profit * 100.0).round() / 100.0
}
