use oddsmith_models::context::{AnalysisContext, MarketSnapshot};
use oddsmith_models::dependency::{DependencyJudgment, DependencyKind, EventPair};
use oddsmith_models::judgment::{Judgment, PeerJudgment};

/// A peer's round-1 dependency assessment as shown to another agent,
/// anonymized. Constraints are deliberately not included.
#[derive(Debug, Clone)]
pub struct DependencyPeer {
    pub label: String,
    pub score: f64,
    pub is_dependent: bool,
    pub kind: DependencyKind,
    pub reasoning: String,
}

/// Render the snapshot the way every analysis prompt embeds it.
fn snapshot_text(snapshot: &MarketSnapshot) -> String {
    let mut parts = vec![
        format!("Market: {}", snapshot.title),
        format!("Market ID: {}", snapshot.market_id),
    ];

    if let Some(status) = &snapshot.status {
        parts.push(format!("Status: {status}"));
    }
    if let Some(close_time) = &snapshot.close_time {
        parts.push(format!("Closes: {}", close_time.to_rfc3339()));
    }

    if let (Some(yes), Some(no)) = (snapshot.yes_price, snapshot.no_price) {
        parts.push("\nCurrent Prices:".to_string());
        parts.push(format!("  YES: ${yes:.2}"));
        parts.push(format!("  NO: ${no:.2}"));
    }

    if let Some(position) = &snapshot.position {
        parts.push("\nYour Current Position:".to_string());
        parts.push(format!("  Side: {}", position.side));
        parts.push(format!("  Quantity: {}", position.quantity));
        parts.push(format!("  Avg Price: ${:.2}", position.avg_price));
        if let Some(pnl) = position.unrealized_pnl {
            parts.push(format!("  Unrealized P&L: ${pnl:.2}"));
        }
    }

    if snapshot.volume_24h.is_some()
        || snapshot.liquidity.is_some()
        || snapshot.open_interest.is_some()
    {
        parts.push("\nMarket Metrics:".to_string());
        if let Some(volume) = snapshot.volume_24h {
            parts.push(format!("  24h Volume: {volume}"));
        }
        if let Some(liquidity) = snapshot.liquidity {
            parts.push(format!("  Liquidity Depth: {liquidity}"));
        }
        if let Some(open_interest) = snapshot.open_interest {
            parts.push(format!("  Open Interest: {open_interest}"));
        }
    }

    if !snapshot.history.is_empty() {
        parts.push("\nHistorical Analysis:".to_string());
        for (i, digest) in snapshot.history.iter().take(3).enumerate() {
            parts.push(format!("  Analysis #{}:", i + 1));
            parts.push(format!("    Timestamp: {}", digest.analyzed_at.to_rfc3339()));
            parts.push(format!(
                "    Consensus YES: {:.1}%",
                digest.yes_confidence * 100.0
            ));
            parts.push(format!(
                "    Consensus NO: {:.1}%",
                digest.no_confidence * 100.0
            ));
        }
    }

    parts.join("\n")
}

const JUDGMENT_FORMAT: &str = r#"Respond in JSON format:
{
    "yes_confidence": <float between 0 and 1>,
    "no_confidence": <float between 0 and 1>,
    "reasoning": "<your detailed reasoning>"
}"#;

/// Build the prompt for either round of the market analysis protocol.
pub fn analysis_prompt(context: &AnalysisContext) -> String {
    match context {
        AnalysisContext::Plain(snapshot) => round_one_prompt(snapshot),
        AnalysisContext::PeerFed {
            snapshot,
            own_prior,
            peers,
        } => round_two_prompt(snapshot, own_prior, peers),
    }
}

fn round_one_prompt(snapshot: &MarketSnapshot) -> String {
    format!(
        "You are an expert betting analyst. Analyze the following prediction market and \
         provide confidence scores for YES and NO outcomes.\n\n\
         {}\n\n\
         Based on the above information, provide:\n\
         1. Your confidence score for YES (0.0 to 1.0)\n\
         2. Your confidence score for NO (0.0 to 1.0)\n\
         3. Your reasoning for these confidence scores\n\n\
         Consider:\n\
         - Current market prices and sentiment\n\
         - Any historical analysis trends\n\
         - Market metrics like volume and liquidity\n\
         - Time remaining until market close\n\
         - Current position (if any) and its implications\n\n\
         {JUDGMENT_FORMAT}",
        snapshot_text(snapshot)
    )
}

fn round_two_prompt(snapshot: &MarketSnapshot, own: &Judgment, peers: &[PeerJudgment]) -> String {
    let peer_text = peers
        .iter()
        .map(|peer| {
            format!(
                "{}: YES {:.1}%, NO {:.1}%\nReasoning: {}\n",
                peer.label,
                peer.yes_confidence * 100.0,
                peer.no_confidence * 100.0,
                peer.reasoning
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an expert betting analyst. You previously analyzed this market along with \
         other AI analysts. Now you have the opportunity to revise your analysis after \
         reviewing their reasoning.\n\n\
         {}\n\n\
         PEER ANALYSES FROM ROUND 1:\n\
         {peer_text}\n\
         YOUR PREVIOUS ANALYSIS:\n\
         YES {:.1}%, NO {:.1}%\n\
         Reasoning: {}\n\n\
         After considering the other analysts' perspectives, provide your revised \
         confidence scores.\n\n\
         Consider:\n\
         - What insights from other analyses are compelling?\n\
         - Where do you disagree with the consensus and why?\n\
         - Should you adjust your confidence based on new perspectives?\n\
         - Current market prices and sentiment\n\
         - Market metrics like volume and liquidity\n\
         - Time remaining until market close\n\n\
         {JUDGMENT_FORMAT}",
        snapshot_text(snapshot),
        own.yes_confidence * 100.0,
        own.no_confidence * 100.0,
        own.reasoning
    )
}

fn pair_text(pair: &EventPair) -> String {
    let mut text = format!("Event A: {} ({})\n", pair.a_title, pair.a_ticker);
    if let Some(category) = &pair.a_category {
        text.push_str(&format!("Category: {category}\n"));
    }
    text.push_str(&format!("\nEvent B: {} ({})\n", pair.b_title, pair.b_ticker));
    if let Some(category) = &pair.b_category {
        text.push_str(&format!("Category: {category}\n"));
    }
    if pair.same_series {
        text.push_str("\nNote: Both events are in the same series.\n");
    }
    text
}

const DEPENDENCY_FORMAT: &str = r#"Respond in JSON format:
{
    "dependency_score": <0.0 to 1.0>,
    "is_dependent": <true/false>,
    "dependency_type": "causal|correlated|inverse|independent",
    "constraints": [
        {
            "constraint_type": "implication|mutual_exclusion|conjunction",
            "description": "Clear explanation",
            "formal_expression": "A => B or A ∧ B = FALSE",
            "confidence": <0.0 to 1.0>
        }
    ],
    "reasoning": "Detailed explanation of your analysis"
}"#;

/// Round-1 dependency detection prompt.
pub fn dependency_prompt(pair: &EventPair) -> String {
    format!(
        "You are an expert in prediction markets and logical reasoning.\n\
         Analyze if these two events are logically dependent.\n\n\
         {}\n\
         Two events are DEPENDENT if:\n\
         1. One event causally influences the other (causal dependency)\n\
         2. They are mutually exclusive (cannot both happen)\n\
         3. One event implies the other (logical implication)\n\
         4. They share underlying factors that correlate outcomes\n\n\
         {DEPENDENCY_FORMAT}\n\n\
         Guidelines:\n\
         - dependency_score: 0.0 = completely independent, 1.0 = strongly dependent\n\
         - Only include is_dependent=true if dependency_score >= 0.5\n\
         - constraints: List ALL logical constraints you can identify\n\
         - Be conservative - only flag clear dependencies, not weak correlations",
        pair_text(pair)
    )
}

/// Round-2 dependency prompt with anonymized peer assessments.
pub fn dependency_revision_prompt(
    pair: &EventPair,
    peers: &[DependencyPeer],
    own: &DependencyJudgment,
) -> String {
    let peer_text = peers
        .iter()
        .map(|peer| {
            format!(
                "{}:\n- Dependency: {} (score: {:.2})\n- Type: {}\n- Reasoning: {}",
                peer.label,
                peer.is_dependent,
                peer.score,
                peer.kind,
                peer.reasoning
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You previously analyzed these events for dependencies.\n\
         Now review other analysts' perspectives and revise if needed.\n\n\
         {}\n\
         PEER ANALYSES:\n\
         {peer_text}\n\n\
         YOUR PREVIOUS ANALYSIS:\n\
         - Dependency: {} (score: {:.2})\n\
         - Type: {}\n\
         - Reasoning: {}\n\n\
         After considering peer feedback, provide your revised analysis.\n\n\
         Questions to consider:\n\
         - Did any analyst identify constraints you missed?\n\
         - Are there disagreements on dependency type? Which is most accurate?\n\
         - Should you adjust your confidence based on consensus or divergence?\n\n\
         IMPORTANT: {DEPENDENCY_FORMAT}",
        pair_text(pair),
        own.is_dependent,
        own.score,
        own.kind,
        own.reasoning
    )
}

/// Titles-only prompt for the cheap single-agent screening pass.
pub fn screening_prompt(pair: &EventPair) -> String {
    format!(
        "You are analyzing whether two prediction market events are likely dependent.\n\n\
         Event A: {} ({})\n\
         Event B: {} ({})\n\n\
         Two events are DEPENDENT if one's outcome makes the other more or less likely.\n\n\
         Analyze based on TITLES ONLY and respond in JSON:\n\
         {{\n\
             \"dependency_score\": <0.0 to 1.0>,\n\
             \"is_dependent\": <true/false>,\n\
             \"dependency_type\": \"causal|correlated|inverse|independent\",\n\
             \"constraints\": [],\n\
             \"reasoning\": \"<brief explanation>\"\n\
         }}\n\n\
         Be concise. Focus on obvious dependencies.",
        pair.a_title, pair.a_ticker, pair.b_title, pair.b_ticker
    )
}
