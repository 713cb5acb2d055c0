//! Data models for the analysis pipeline.
//!
//! This module contains all the core data structures used throughout
//! the application for representing requests, role analyses, and the
//! synthesized result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Executive analyst role. Each role produces an independent analysis
/// of the same document before synthesis merges them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Chief Financial Officer - financial health, margins, cash flow.
    Cfo,
    /// Chief Marketing Officer - market position, customers, growth.
    Cmo,
    /// Chief Operating Officer - operations, efficiency, execution.
    Coo,
}

impl Role {
    /// All roles, in the fixed order used for fan-out and report sections.
    pub const ALL: [Role; 3] = [Role::Cfo, Role::Cmo, Role::Coo];

    /// Short uppercase name used in prompts, reports, and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Cfo => "CFO",
            Role::Cmo => "CMO",
            Role::Coo => "COO",
        }
    }

    /// Full title used as the report section heading.
    pub fn title(&self) -> &'static str {
        match self {
            Role::Cfo => "Chief Financial Officer",
            Role::Cmo => "Chief Marketing Officer",
            Role::Coo => "Chief Operating Officer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CFO" => Ok(Role::Cfo),
            "CMO" => Ok(Role::Cmo),
            "COO" => Ok(Role::Coo),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Lifecycle state of an analysis request.
///
/// Transitions are strictly `Pending -> Processing -> {Completed, Failed}`;
/// both terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    /// Storage representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    /// True for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "processing" => Ok(RequestStatus::Processing),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

/// One analysis request, one per uploaded document.
///
/// Invariant: `completed_at` is set if and only if the status is terminal;
/// `error_message` is set only when the status is `Failed`. The storage
/// layer rejects writes that would violate this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Opaque unique identifier, generated at creation.
    pub request_id: String,
    /// Owner of the request.
    pub user_id: String,
    /// Weak reference into the external blob store.
    pub file_key: String,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set only on the terminal transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set only when the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AnalysisRequest {
    /// Creates a new pending request with a fresh timestamp.
    pub fn new(request_id: String, user_id: String, file_key: String) -> Self {
        Self {
            request_id,
            user_id,
            file_key,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }
}

/// One role's analysis of a document. Request-scoped and transient:
/// consumed by synthesis, never independently persisted.
///
/// The wire shape matches what the backend is instructed to emit:
/// `{"analysis": ..., "keyInsights": [...], "recommendations": [...]}`.
/// The backend JSON carries no role field; the gateway stamps the role
/// after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveAnalysis {
    /// The role that produced this analysis.
    #[serde(default = "Role::default_for_wire")]
    pub role: Role,
    /// Free-text analysis prose.
    pub analysis: String,
    /// Ordered list of key insights.
    #[serde(rename = "keyInsights", default)]
    pub key_insights: Vec<String>,
    /// Ordered list of recommendations.
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Role {
    fn default_for_wire() -> Role {
        Role::Cfo
    }
}

/// Output of the synthesis merge. Transient; embedded into the final
/// report rather than persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    /// Deduplicated insights in first-seen order.
    #[serde(rename = "consolidatedInsights")]
    pub consolidated_insights: Vec<String>,
    /// Recommendations ranked by cross-role frequency, descending,
    /// ties broken by first occurrence.
    #[serde(rename = "actionItems")]
    pub action_items: Vec<String>,
}

/// Per-role fan-out progress as observed by `get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleProgress {
    Pending,
    Completed,
}

/// Snapshot returned by `Orchestrator::get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub status: RequestStatus,
    /// Role -> progress, in fixed role order. A role whose retries were
    /// exhausted stays `Pending` - the gap is visible, not an error.
    pub progress: Vec<(Role, RoleProgress)>,
}
