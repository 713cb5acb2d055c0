//! Synthesis: merging role analyses into one consolidated result.
//!
//! Two independent merge passes run over the successful analyses:
//! bag-of-words near-duplicate detection for insights, and exact-string
//! frequency ranking for recommendations. Both are pure functions over
//! the supplied slice.

use crate::error::PipelineError;
use crate::models::{ExecutiveAnalysis, SynthesisResult};
use std::collections::{HashMap, HashSet};

/// Stop words dropped before comparing insights: articles, conjunctions,
/// copulas, and a few high-frequency function words. Small on purpose -
/// this is near-duplicate detection, not semantic matching.
const STOP_WORDS: [&str; 18] = [
    "a", "an", "the", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being", "of",
    "on", "in", "to", "for",
];

/// Normalized comparison key for an insight: lowercase, split on
/// whitespace, drop stop words, sort the remaining tokens, rejoin.
/// Catches reorderings and minor stop-word differences.
fn insight_key(text: &str) -> String {
    let mut tokens: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.join(" ")
}

/// Deduplicate insights across analyses.
///
/// Traversal order is the order analyses were supplied, then the order
/// within each analysis. The first occurrence of a normalized key wins
/// and is kept in its original (trimmed) form; output order is strictly
/// first-seen order, never re-sorted.
pub fn extract_insights(analyses: &[ExecutiveAnalysis]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut insights = Vec::new();

    for analysis in analyses {
        for insight in &analysis.key_insights {
            let trimmed = insight.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(insight_key(trimmed)) {
                insights.push(trimmed.to_string());
            }
        }
    }

    insights
}

/// Rank recommendations by how many analyses mention them.
///
/// Counts are keyed by the exact trimmed string - deliberately stricter
/// than insight dedup, so near-duplicate phrasing is not merged. The
/// sort is stable: descending frequency, ties keep first-occurrence
/// order.
pub fn prioritize_action_items(analyses: &[ExecutiveAnalysis]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for analysis in analyses {
        for recommendation in &analysis.recommendations {
            let trimmed = recommendation.trim();
            if trimmed.is_empty() {
                continue;
            }
            match counts.get_mut(trimmed) {
                Some(count) => *count += 1,
                None => {
                    counts.insert(trimmed.to_string(), 1);
                    order.push(trimmed.to_string());
                }
            }
        }
    }

    order.sort_by_key(|item| std::cmp::Reverse(counts[item]));
    order
}

/// Merge the successful analyses into one synthesized result.
///
/// Fails with `EmptyInput` for an empty slice - there is nothing to
/// merge, and returning a default would mask the failure.
pub fn synthesize(analyses: &[ExecutiveAnalysis]) -> Result<SynthesisResult, PipelineError> {
    if analyses.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    Ok(SynthesisResult {
        consolidated_insights: extract_insights(analyses),
        action_items: prioritize_action_items(analyses),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn analysis(role: Role, insights: &[&str], recommendations: &[&str]) -> ExecutiveAnalysis {
        ExecutiveAnalysis {
            role,
            analysis: format!("{} analysis", role),
            key_insights: insights.iter().map(|s| s.to_string()).collect(),
            recommendations: recommendations.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_paraphrased_insights_merge() {
        let analyses = vec![
            analysis(Role::Cfo, &["Revenue growth is critical"], &[]),
            analysis(Role::Cmo, &["critical revenue growth"], &[]),
        ];

        let insights = extract_insights(&analyses);
        assert_eq!(insights, vec!["Revenue growth is critical"]);
    }

    #[test]
    fn test_disjoint_insights_survive_in_full() {
        let analyses = vec![
            analysis(Role::Cfo, &["Cash runway under six months"], &[]),
            analysis(Role::Cmo, &["Churn doubled quarter over quarter"], &[]),
            analysis(Role::Coo, &["Fulfillment backlog growing"], &[]),
        ];

        let insights = extract_insights(&analyses);
        assert_eq!(insights.len(), 3);
        assert_eq!(insights[0], "Cash runway under six months");
        assert_eq!(insights[2], "Fulfillment backlog growing");
    }

    #[test]
    fn test_first_seen_order_preserved() {
        let analyses = vec![
            analysis(Role::Cfo, &["b", "a"], &[]),
            analysis(Role::Cmo, &["a"], &[]),
        ];

        assert_eq!(extract_insights(&analyses), vec!["b", "a"]);
    }

    #[test]
    fn test_insights_trimmed_and_blank_dropped() {
        let analyses = vec![analysis(Role::Cfo, &["  margin pressure  ", "   "], &[])];
        assert_eq!(extract_insights(&analyses), vec!["margin pressure"]);
    }

    #[test]
    fn test_unanimous_recommendation_ranks_first() {
        let analyses = vec![
            analysis(Role::Cfo, &[], &["A", "B"]),
            analysis(Role::Cmo, &[], &["A", "C"]),
            analysis(Role::Coo, &[], &["A"]),
        ];

        let items = prioritize_action_items(&analyses);
        assert_eq!(items[0], "A");
        // Singletons keep their relative insertion order.
        assert_eq!(items[1..], ["B", "C"]);
    }

    #[test]
    fn test_action_items_not_normalized() {
        // Near-duplicate phrasing stays distinct here, unlike insights.
        let analyses = vec![
            analysis(Role::Cfo, &[], &["Reduce costs"]),
            analysis(Role::Cmo, &[], &["reduce costs"]),
        ];

        let items = prioritize_action_items(&analyses);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_synthesize_rejects_empty_input() {
        assert!(matches!(synthesize(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn test_synthesize_single_analysis() {
        let analyses = vec![analysis(
            Role::Coo,
            &["Capacity at 95%"],
            &["Hire two operators"],
        )];

        let result = synthesize(&analyses).unwrap();
        assert_eq!(result.consolidated_insights, vec!["Capacity at 95%"]);
        assert_eq!(result.action_items, vec!["Hire two operators"]);
    }
}
