//! Boardroom - AI executive analysis pipeline.
//!
//! Accepts a business-data document, fans it out to three independent
//! AI "executive analyst" roles (CFO, CMO, COO) in parallel, merges
//! their outputs into one synthesized report, and exposes the result
//! through a polling-style API: `submit` returns immediately, then
//! `get_status` / `get_report` observe the request as it runs to a
//! terminal state.
//!
//! HTTP routing, file parsing, and audio generation live outside this
//! crate; the library boundary is the [`orchestrator::Orchestrator`]
//! plus the [`gateway::InferenceBackend`] and
//! [`documents::DocumentSource`] traits it is composed with.

pub mod admission;
pub mod cli;
pub mod config;
pub mod documents;
pub mod error;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod report;
pub mod store;
pub mod synthesis;

pub use error::PipelineError;
pub use models::{
    AnalysisRequest, ExecutiveAnalysis, RequestStatus, Role, RoleProgress, StatusView,
    SynthesisResult,
};
pub use orchestrator::{Orchestrator, ReportOutcome};
