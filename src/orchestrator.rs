//! Request orchestration: admission, lifecycle, fan-out, fan-in.
//!
//! `submit` is fire-and-continue: it returns the request id as soon as
//! the row is in `processing`, while a tracked background task drives
//! the three role analyses in parallel and writes the terminal state
//! exactly once at the fan-in point. No role's failure cancels the
//! others; synthesis runs over whatever subset succeeded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::admission::AdmissionController;
use crate::documents::DocumentSource;
use crate::error::PipelineError;
use crate::gateway::AnalysisGateway;
use crate::models::{
    ExecutiveAnalysis, RequestStatus, Role, RoleProgress, StatusView,
};
use crate::report::AnalysisReport;
use crate::store::Database;
use crate::synthesis;

type ProgressMap = Arc<Mutex<HashMap<String, HashMap<Role, RoleProgress>>>>;
type ReportMap = Arc<Mutex<HashMap<String, AnalysisReport>>>;

/// Outcome of `get_report`. Absence of a report is a normal,
/// observable intermediate state, not an error.
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    /// The request completed; here is the composed report.
    Ready(AnalysisReport),
    /// The request is still pending or processing.
    InProgress { status: RequestStatus },
    /// The request reached the failed state.
    Failed { error: String },
    /// The row says completed but the in-memory report is gone
    /// (e.g. the process restarted; reports are not persisted).
    Unavailable,
}

/// Drives the full pipeline for every submitted request.
pub struct Orchestrator {
    store: Database,
    admission: AdmissionController,
    gateway: AnalysisGateway,
    documents: Arc<dyn DocumentSource>,
    progress: ProgressMap,
    reports: ReportMap,
    // Tracked per-request tasks so completion can be awaited
    // deterministically.
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        store: Database,
        admission: AdmissionController,
        gateway: AnalysisGateway,
        documents: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            store,
            admission,
            gateway,
            documents,
            progress: Arc::new(Mutex::new(HashMap::new())),
            reports: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Admit, persist, and start analyzing a document. Returns the new
    /// request id without awaiting the analysis.
    ///
    /// On admission rejection or validation failure no state is created.
    pub async fn submit(&self, user_id: &str, file_key: &str) -> Result<String, PipelineError> {
        if user_id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "user id must not be empty".to_string(),
            ));
        }
        if file_key.trim().is_empty() {
            return Err(PipelineError::Validation(
                "file key must not be empty".to_string(),
            ));
        }

        let decision = self.admission.check(user_id).await?;
        if !decision.allowed {
            // reset_at is always set on rejection.
            let reset_at = decision.reset_at.unwrap_or_else(Utc::now);
            return Err(PipelineError::AdmissionRejected {
                remaining: 0,
                reset_at,
            });
        }

        let request_id = Uuid::new_v4().to_string();
        let request = crate::models::AnalysisRequest::new(
            request_id.clone(),
            user_id.to_string(),
            file_key.to_string(),
        );

        self.store.create(&request).await?;
        info!(%request_id, user_id, file_key, "request admitted");

        // Pending exists only momentarily; fan-out starts immediately.
        self.store
            .update_status(&request_id, RequestStatus::Processing, None, None)
            .await?;

        {
            let mut progress = self.progress.lock().unwrap();
            progress.insert(
                request_id.clone(),
                Role::ALL
                    .iter()
                    .map(|role| (*role, RoleProgress::Pending))
                    .collect(),
            );
        }

        let handle = tokio::spawn(run_pipeline(
            self.store.clone(),
            self.gateway.clone(),
            Arc::clone(&self.documents),
            Arc::clone(&self.progress),
            Arc::clone(&self.reports),
            request_id.clone(),
            file_key.to_string(),
        ));

        self.tasks
            .lock()
            .unwrap()
            .insert(request_id.clone(), handle);

        Ok(request_id)
    }

    /// Current status plus the per-role progress map.
    pub async fn get_status(&self, request_id: &str) -> Result<StatusView, PipelineError> {
        let request = self
            .store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(request_id.to_string()))?;

        let by_role = self
            .progress
            .lock()
            .unwrap()
            .get(request_id)
            .cloned()
            .unwrap_or_default();

        let progress = Role::ALL
            .iter()
            .map(|role| {
                (
                    *role,
                    by_role.get(role).copied().unwrap_or(RoleProgress::Pending),
                )
            })
            .collect();

        Ok(StatusView {
            status: request.status,
            progress,
        })
    }

    /// The composed report when completed; otherwise a descriptive
    /// indicator of the current state. `NotFound` only for unknown ids.
    pub async fn get_report(&self, request_id: &str) -> Result<ReportOutcome, PipelineError> {
        let request = self
            .store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(request_id.to_string()))?;

        match request.status {
            RequestStatus::Completed => {
                let report = self.reports.lock().unwrap().get(request_id).cloned();
                match report {
                    Some(report) => Ok(ReportOutcome::Ready(report)),
                    None => Ok(ReportOutcome::Unavailable),
                }
            }
            RequestStatus::Failed => Ok(ReportOutcome::Failed {
                error: request
                    .error_message
                    .unwrap_or_else(|| "analysis failed".to_string()),
            }),
            status => Ok(ReportOutcome::InProgress { status }),
        }
    }

    /// Await the background task for a request, if one is tracked.
    /// Lets tests and the CLI observe completion deterministically.
    pub async fn wait_for(&self, request_id: &str) {
        let handle = self.tasks.lock().unwrap().remove(request_id);
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(%request_id, "pipeline task panicked: {err}");
            }
        }
    }
}

/// The background pipeline for one request: read the document, fan out
/// the three roles, fan in, synthesize, write the terminal state.
/// Only this function writes terminal state, and it writes exactly once.
async fn run_pipeline(
    store: Database,
    gateway: AnalysisGateway,
    documents: Arc<dyn DocumentSource>,
    progress: ProgressMap,
    reports: ReportMap,
    request_id: String,
    file_key: String,
) {
    let content = match documents.read(&file_key) {
        Ok(content) => content,
        Err(err) => {
            warn!(%request_id, "document read failed: {err:#}");
            fail_request(&store, &request_id, format!("could not read document: {err}")).await;
            return;
        }
    };

    // Fan-out: all three roles run concurrently; each marks its own
    // progress on return. Failures are isolated per future.
    let role_futures = Role::ALL.iter().map(|role| {
        let gateway = gateway.clone();
        let progress = Arc::clone(&progress);
        let request_id = request_id.clone();
        let content = content.clone();
        let role = *role;

        async move {
            let result = gateway.invoke(role, &content).await;
            if result.is_ok() {
                if let Some(by_role) = progress.lock().unwrap().get_mut(&request_id) {
                    by_role.insert(role, RoleProgress::Completed);
                }
            }
            result
        }
    });

    // Fan-in: wait for all outstanding roles to settle.
    let results = join_all(role_futures).await;

    let mut analyses: Vec<ExecutiveAnalysis> = Vec::new();
    let mut failures: Vec<String> = Vec::new();
    for result in results {
        match result {
            Ok(analysis) => analyses.push(analysis),
            Err(err) => {
                warn!(%request_id, "{err}");
                failures.push(err.to_string());
            }
        }
    }

    if analyses.is_empty() {
        fail_request(
            &store,
            &request_id,
            format!("no role analysis succeeded: {}", failures.join("; ")),
        )
        .await;
        return;
    }

    if !failures.is_empty() {
        info!(
            request_id,
            succeeded = analyses.len(),
            failed = failures.len(),
            "proceeding with partial results"
        );
    }

    let synthesis = match synthesis::synthesize(&analyses) {
        Ok(result) => result,
        Err(err) => {
            fail_request(&store, &request_id, err.to_string()).await;
            return;
        }
    };

    let report = AnalysisReport {
        request_id: request_id.clone(),
        generated_at: Utc::now(),
        roles: analyses,
        synthesis,
    };
    reports.lock().unwrap().insert(request_id.clone(), report);

    if let Err(err) = store
        .update_status(&request_id, RequestStatus::Completed, Some(Utc::now()), None)
        .await
    {
        // A lifecycle write that fails must not look like success;
        // the row keeps its last honest state and we log loudly.
        error!(%request_id, "failed to record completion: {err}");
        return;
    }

    info!(%request_id, "request completed");
}

async fn fail_request(store: &Database, request_id: &str, message: String) {
    if let Err(err) = store
        .update_status(
            request_id,
            RequestStatus::Failed,
            Some(Utc::now()),
            Some(message),
        )
        .await
    {
        error!(%request_id, "failed to record failure: {err}");
    }
}
