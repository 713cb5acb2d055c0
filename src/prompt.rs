//! Role-specific prompt construction.
//!
//! Pure, deterministic mapping from (document content, role) to the
//! instruction text sent to the inference backend. No I/O, no state.

use crate::error::PipelineError;
use crate::models::Role;

/// Schema instruction appended to every prompt. The backend must answer
/// with a single JSON object in exactly this shape.
const RESPONSE_SCHEMA: &str = r#"Respond with a single JSON object and nothing else, in exactly this shape:
{"analysis": "your analysis as prose", "keyInsights": ["insight", ...], "recommendations": ["recommendation", ...]}"#;

/// Role-specific framing. Each contains the role keyword so callers can
/// verify which persona a prompt was built for.
fn role_framing(role: Role) -> &'static str {
    match role {
        Role::Cfo => {
            "You are the CFO (Chief Financial Officer). Assess the financial health of \
             the business: revenue, margins, cash flow, cost structure, and financial risk."
        }
        Role::Cmo => {
            "You are the CMO (Chief Marketing Officer). Assess market position and growth: \
             customer segments, acquisition, retention, brand, and competitive pressure."
        }
        Role::Coo => {
            "You are the COO (Chief Operating Officer). Assess operations and execution: \
             process efficiency, capacity, supply chain, staffing, and operational risk."
        }
    }
}

/// Build the instruction text for one role's analysis of `content`.
///
/// Fails with `Validation` when the content is empty or whitespace-only.
/// Identical inputs always yield the identical output string.
pub fn build(content: &str, role: Role) -> Result<String, PipelineError> {
    if content.trim().is_empty() {
        return Err(PipelineError::Validation(
            "document content must not be empty".to_string(),
        ));
    }

    let mut prompt = String::new();
    prompt.push_str(role_framing(role));
    prompt.push_str("\n\nAnalyze the following business data from your role's perspective.\n\n");
    prompt.push_str("=== DOCUMENT ===\n");
    prompt.push_str(content);
    prompt.push_str("\n=== END DOCUMENT ===\n\n");
    prompt.push_str(RESPONSE_SCHEMA);

    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = "Q3 revenue: $1.2M\nQ3 costs: $1.4M\nHeadcount: 14";

    #[test]
    fn test_build_is_deterministic() {
        let first = build(CONTENT, Role::Cfo).unwrap();
        let second = build(CONTENT, Role::Cfo).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_embeds_content_and_role_keyword() {
        for role in Role::ALL {
            let prompt = build(CONTENT, role).unwrap();
            assert!(prompt.contains(CONTENT));
            assert!(prompt.contains(role.as_str()));
        }
    }

    #[test]
    fn test_build_embeds_schema_fields() {
        let prompt = build(CONTENT, Role::Coo).unwrap();
        assert!(prompt.contains("\"analysis\""));
        assert!(prompt.contains("\"keyInsights\""));
        assert!(prompt.contains("\"recommendations\""));
    }

    #[test]
    fn test_build_rejects_empty_content() {
        assert!(matches!(
            build("", Role::Cfo),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            build("   \n\t", Role::Cmo),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_prompts_differ_by_role() {
        let cfo = build(CONTENT, Role::Cfo).unwrap();
        let cmo = build(CONTENT, Role::Cmo).unwrap();
        assert_ne!(cfo, cmo);
    }
}
