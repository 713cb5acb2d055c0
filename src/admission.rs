//! Per-user admission control.
//!
//! A sliding-window rate limiter derived from the request ledger: count
//! a user's requests inside the trailing window and reject at the
//! ceiling. Counting-via-query, not a token bucket - exactness at the
//! window boundary is not required, only approximate fairness, and a
//! request being created concurrently may be invisible to a
//! simultaneous count (best effort by design).

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::PipelineError;
use crate::store::Database;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    /// Requests left in the current window. Zero when rejected.
    pub remaining: u32,
    /// When the window frees a slot; set only on rejection.
    pub reset_at: Option<DateTime<Utc>>,
}

/// Sliding-window rate limiter gating new requests per user.
#[derive(Clone)]
pub struct AdmissionController {
    store: Database,
    limit: u32,
    window: Duration,
}

impl AdmissionController {
    pub fn new(store: Database, limit: u32, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    /// Check whether `user_id` may submit a new request right now.
    ///
    /// At or above the limit the decision is a rejection with
    /// `remaining = 0` and `reset_at` = oldest in-window request's
    /// creation time plus the window. An empty window always allows.
    pub async fn check(&self, user_id: &str) -> Result<AdmissionDecision, PipelineError> {
        let now = Utc::now();
        let window_start = now - self.window;

        let count = self.store.count_since(user_id, window_start).await?;
        debug!(user_id, count, limit = self.limit, "admission check");

        if count >= self.limit {
            let oldest = self.store.oldest_since(user_id, window_start).await?;
            // The window is non-empty when count > 0; fall back to a
            // full window from now if the row vanished between queries.
            let reset_at = oldest.map(|t| t + self.window).unwrap_or(now + self.window);

            return Ok(AdmissionDecision {
                allowed: false,
                remaining: 0,
                reset_at: Some(reset_at),
            });
        }

        Ok(AdmissionDecision {
            allowed: true,
            remaining: self.limit - count,
            reset_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisRequest;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("requests.db")).unwrap();
        (dir, db)
    }

    async fn seed(db: &Database, user: &str, n: usize) {
        for i in 0..n {
            let request = AnalysisRequest::new(
                format!("req-{user}-{i}"),
                user.to_string(),
                "q3.csv".to_string(),
            );
            db.create(&request).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_empty_window_allows() {
        let (_dir, db) = open_store();
        let controller = AdmissionController::new(db, 10, Duration::minutes(15));

        let decision = controller.check("alice").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 10);
        assert!(decision.reset_at.is_none());
    }

    #[tokio::test]
    async fn test_below_limit_allows() {
        let (_dir, db) = open_store();
        seed(&db, "alice", 9).await;
        let controller = AdmissionController::new(db, 10, Duration::minutes(15));

        let decision = controller.check("alice").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_at_limit_rejects_with_reset() {
        let (_dir, db) = open_store();
        seed(&db, "alice", 10).await;
        let controller = AdmissionController::new(db.clone(), 10, Duration::minutes(15));

        let decision = controller.check("alice").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);

        let reset_at = decision.reset_at.unwrap();
        assert!(reset_at > Utc::now());
        assert!(reset_at <= Utc::now() + Duration::minutes(15));
    }

    #[tokio::test]
    async fn test_windows_are_per_user() {
        let (_dir, db) = open_store();
        seed(&db, "alice", 10).await;
        let controller = AdmissionController::new(db, 10, Duration::minutes(15));

        assert!(!controller.check("alice").await.unwrap().allowed);
        assert!(controller.check("bob").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_old_requests_fall_out_of_window() {
        let (_dir, db) = open_store();

        for i in 0..10 {
            let mut request = AnalysisRequest::new(
                format!("req-{i}"),
                "alice".to_string(),
                "q3.csv".to_string(),
            );
            request.created_at = Utc::now() - Duration::minutes(20);
            db.create(&request).await.unwrap();
        }

        let controller = AdmissionController::new(db, 10, Duration::minutes(15));
        let decision = controller.check("alice").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 10);
    }
}
