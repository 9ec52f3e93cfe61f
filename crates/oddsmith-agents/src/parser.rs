use oddsmith_models::dependency::{Constraint, DependencyJudgment, DependencyKind};
use oddsmith_models::judgment::Judgment;
use oddsmith_models::provider::ProviderId;
use serde::Deserialize;

use crate::error::AgentError;

/// Extract the first JSON object from provider output that may carry
/// incidental formatting: a bare object, a fenced ```json block, or
/// prose around the object.
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    if let Some(inner) = fenced_block(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&inner).is_ok() {
            return Ok(inner);
        }
    }

    if let Some(object) = first_balanced_object(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&object).is_ok() {
            return Ok(object);
        }
    }

    Err(AgentError::Parse(format!(
        "no JSON object found in response ({} bytes)",
        text.len()
    )))
}

/// Contents of the first ``` fenced block, language tag or not.
fn fenced_block(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    // Skip an optional language tag up to the first newline.
    let body_start = after_ticks.find('\n')? + 1;
    let body = &after_ticks[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim().to_string())
}

/// First balanced `{ ... }` span, respecting string literals and escapes.
fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
struct JudgmentWire {
    yes_confidence: f64,
    no_confidence: f64,
    reasoning: String,
}

/// Parse a market judgment from raw provider output. Confidences
/// outside [0, 1] are rejected here, not downstream.
pub fn parse_judgment(raw: &str, source: ProviderId) -> Result<Judgment, AgentError> {
    let json = extract_json(raw)?;
    let wire: JudgmentWire = serde_json::from_str(&json)
        .map_err(|e| AgentError::Parse(format!("judgment from {source}: {e}")))?;

    for (field, value) in [
        ("yes_confidence", wire.yes_confidence),
        ("no_confidence", wire.no_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(AgentError::Parse(format!(
                "{field} out of range from {source}: {value}"
            )));
        }
    }

    Ok(Judgment {
        yes_confidence: wire.yes_confidence,
        no_confidence: wire.no_confidence,
        reasoning: wire.reasoning,
        source,
    })
}

#[derive(Deserialize)]
struct DependencyWire {
    dependency_score: f64,
    is_dependent: bool,
    dependency_type: DependencyKind,
    #[serde(default)]
    constraints: Vec<Constraint>,
    reasoning: String,
}

/// Parse a dependency assessment from raw provider output.
pub fn parse_dependency(raw: &str, source: ProviderId) -> Result<DependencyJudgment, AgentError> {
    let json = extract_json(raw)?;
    let wire: DependencyWire = serde_json::from_str(&json)
        .map_err(|e| AgentError::Parse(format!("dependency judgment from {source}: {e}")))?;

    if !(0.0..=1.0).contains(&wire.dependency_score) || wire.dependency_score.is_nan() {
        return Err(AgentError::Parse(format!(
            "dependency_score out of range from {source}: {}",
            wire.dependency_score
        )));
    }

    Ok(DependencyJudgment {
        score: wire.dependency_score,
        is_dependent: wire.is_dependent,
        kind: wire.dependency_type,
        constraints: wire.constraints,
        reasoning: wire.reasoning,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_clean_json() {
        let input = r#"{"yes_confidence": 0.75, "no_confidence": 0.2, "reasoning": "x"}"#;
        assert_eq!(extract_json(input).unwrap(), input);
    }

    #[test]
    fn extract_from_fenced_block() {
        let input = "Here is my analysis:\n```json\n{\"yes_confidence\": 0.75}\n```\nDone.";
        assert_eq!(extract_json(input).unwrap(), r#"{"yes_confidence": 0.75}"#);
    }

    #[test]
    fn extract_from_fence_without_language() {
        let input = "```\n{\"yes_confidence\": 0.75}\n```";
        assert_eq!(extract_json(input).unwrap(), r#"{"yes_confidence": 0.75}"#);
    }

    #[test]
    fn extract_with_surrounding_prose() {
        let input = "Based on my analysis:\n{\"yes_confidence\": 0.7, \"no_confidence\": 0.3, \"reasoning\": \"bullish\"} hope that helps";
        assert!(extract_json(input).unwrap().contains("bullish"));
    }

    #[test]
    fn extract_handles_braces_inside_strings() {
        let input = r#"{"reasoning": "price moved from {low} to {high}", "yes_confidence": 0.5}"#;
        let parsed: serde_json::Value =
            serde_json::from_str(&extract_json(input).unwrap()).unwrap();
        assert_eq!(parsed["yes_confidence"], 0.5);
    }

    #[test]
    fn extract_plain_text_fails() {
        assert!(extract_json("no JSON here at all").is_err());
    }

    #[test]
    fn parse_full_judgment() {
        let raw = r#"```json
{
    "yes_confidence": 0.82,
    "no_confidence": 0.15,
    "reasoning": "Polling and volume both favor yes"
}
```"#;
        let judgment = parse_judgment(raw, ProviderId::Openai).unwrap();
        assert_eq!(judgment.yes_confidence, 0.82);
        assert_eq!(judgment.source, ProviderId::Openai);
    }

    #[test]
    fn parse_judgment_missing_field() {
        let raw = r#"{"yes_confidence": 0.82, "reasoning": "no no_confidence"}"#;
        assert!(matches!(
            parse_judgment(raw, ProviderId::Claude),
            Err(AgentError::Parse(_))
        ));
    }

    #[test]
    fn parse_judgment_out_of_range() {
        let raw = r#"{"yes_confidence": 1.3, "no_confidence": 0.1, "reasoning": "x"}"#;
        let err = parse_judgment(raw, ProviderId::Claude).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn parse_dependency_with_constraints() {
        let raw = r#"{
            "dependency_score": 0.8,
            "is_dependent": true,
            "dependency_type": "causal",
            "constraints": [
                {"constraint_type": "implication", "description": "A implies B",
                 "formal_expression": "A => B", "confidence": 0.9}
            ],
            "reasoning": "Direct causal chain"
        }"#;
        let judgment = parse_dependency(raw, ProviderId::Grok).unwrap();
        assert!(judgment.is_dependent);
        assert_eq!(judgment.kind, DependencyKind::Causal);
        assert_eq!(judgment.constraints.len(), 1);
    }

    #[test]
    fn parse_dependency_constraints_default_empty() {
        let raw = r#"{
            "dependency_score": 0.1,
            "is_dependent": false,
            "dependency_type": "independent",
            "reasoning": "Unrelated events"
        }"#;
        let judgment = parse_dependency(raw, ProviderId::Gemini).unwrap();
        assert!(judgment.constraints.is_empty());
    }

    #[test]
    fn parse_dependency_unknown_type_fails() {
        let raw = r#"{
            "dependency_score": 0.5,
            "is_dependent": true,
            "dependency_type": "mystical",
            "reasoning": "?"
        }"#;
        assert!(parse_dependency(raw, ProviderId::Claude).is_err());
    }
}
