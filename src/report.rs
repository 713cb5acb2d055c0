//! Report composition and rendering.
//!
//! `AnalysisReport` is the final document: the synthesized result plus
//! one section per successful role. Rendering is pure - section
//! functions build strings and elide empty blocks entirely (no empty
//! headers).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ExecutiveAnalysis, SynthesisResult};

/// The composed analysis report for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// The request this report belongs to.
    pub request_id: String,
    /// When synthesis finished.
    pub generated_at: DateTime<Utc>,
    /// Per-role analyses that succeeded, in fixed role order.
    pub roles: Vec<ExecutiveAnalysis>,
    /// The merged cross-role result.
    pub synthesis: SynthesisResult,
}

/// Render the full report as Markdown.
pub fn generate_markdown_report(report: &AnalysisReport) -> String {
    let mut output = String::new();

    output.push_str("# Executive Analysis Report\n\n");
    output.push_str(&format!("- **Request:** `{}`\n", report.request_id));
    output.push_str(&format!(
        "- **Generated:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("- **Analysts:** {}\n\n", analyst_list(report)));

    output.push_str(&generate_synthesis_section(&report.synthesis));

    for analysis in &report.roles {
        output.push_str(&generate_role_section(analysis));
    }

    output.push_str("---\n\n*Generated by Boardroom*\n");

    output
}

/// Render the full report as pretty-printed JSON.
pub fn generate_json_report(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report to JSON")
}

fn analyst_list(report: &AnalysisReport) -> String {
    report
        .roles
        .iter()
        .map(|a| a.role.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generate the synthesized section: consolidated insights and ranked
/// action items.
fn generate_synthesis_section(synthesis: &SynthesisResult) -> String {
    let mut section = String::new();

    section.push_str("## Synthesis\n\n");

    if !synthesis.consolidated_insights.is_empty() {
        section.push_str("### Consolidated Insights\n\n");
        for insight in &synthesis.consolidated_insights {
            section.push_str(&format!("- {}\n", insight));
        }
        section.push('\n');
    }

    if !synthesis.action_items.is_empty() {
        section.push_str("### Action Items\n\n");
        for (index, item) in synthesis.action_items.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", index + 1, item));
        }
        section.push('\n');
    }

    section
}

/// Generate one role's section: heading, prose, and - only when
/// non-empty - bulleted insight and recommendation blocks.
pub fn generate_role_section(analysis: &ExecutiveAnalysis) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "## {} ({})\n\n",
        analysis.role.title(),
        analysis.role
    ));
    section.push_str(&analysis.analysis);
    section.push_str("\n\n");

    if !analysis.key_insights.is_empty() {
        section.push_str("### Key Insights\n\n");
        for insight in &analysis.key_insights {
            section.push_str(&format!("- {}\n", insight));
        }
        section.push('\n');
    }

    if !analysis.recommendations.is_empty() {
        section.push_str("### Recommendations\n\n");
        for recommendation in &analysis.recommendations {
            section.push_str(&format!("- {}\n", recommendation));
        }
        section.push('\n');
    }

    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn sample_report() -> AnalysisReport {
        AnalysisReport {
            request_id: "req-1".to_string(),
            generated_at: Utc::now(),
            roles: vec![ExecutiveAnalysis {
                role: Role::Cfo,
                analysis: "Cash position is tight.".to_string(),
                key_insights: vec!["Runway under six months".to_string()],
                recommendations: vec!["Renegotiate supplier terms".to_string()],
            }],
            synthesis: SynthesisResult {
                consolidated_insights: vec!["Runway under six months".to_string()],
                action_items: vec!["Renegotiate supplier terms".to_string()],
            },
        }
    }

    #[test]
    fn test_role_section_contains_heading_and_blocks() {
        let report = sample_report();
        let section = generate_role_section(&report.roles[0]);

        assert!(section.contains("## Chief Financial Officer (CFO)"));
        assert!(section.contains("Cash position is tight."));
        assert!(section.contains("### Key Insights"));
        assert!(section.contains("- Runway under six months"));
        assert!(section.contains("### Recommendations"));
    }

    #[test]
    fn test_empty_blocks_render_no_headers() {
        let analysis = ExecutiveAnalysis {
            role: Role::Coo,
            analysis: "Operations are stable.".to_string(),
            key_insights: vec![],
            recommendations: vec![],
        };

        let section = generate_role_section(&analysis);
        assert!(section.contains("Operations are stable."));
        assert!(!section.contains("### Key Insights"));
        assert!(!section.contains("### Recommendations"));
    }

    #[test]
    fn test_markdown_report_structure() {
        let markdown = generate_markdown_report(&sample_report());

        assert!(markdown.starts_with("# Executive Analysis Report"));
        assert!(markdown.contains("`req-1`"));
        assert!(markdown.contains("## Synthesis"));
        assert!(markdown.contains("1. Renegotiate supplier terms"));
        assert!(markdown.contains("## Chief Financial Officer (CFO)"));
    }

    #[test]
    fn test_json_report_round_trips() {
        let report = sample_report();
        let json = generate_json_report(&report).unwrap();

        let parsed: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id, report.request_id);
        assert_eq!(
            parsed.synthesis.action_items,
            report.synthesis.action_items
        );
    }
}
