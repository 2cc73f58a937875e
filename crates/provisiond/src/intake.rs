// # Job Intake
//
// Minimal HTTP front end over `JobSubmitter`:
//
// ```http
// POST /v1/jobs            {"domain", "serverIp", "projectId"}  -> 202 {"jobId"}
// GET  /v1/jobs/{job_id}   -> 200 job
// ```
//
// Failures answer `{"error": "<kind>", "message": "..."}` with the status
// from `Error::status_code` (409 duplicate, 400 bad input, 404 unknown job).
// Store failures answer 500 without the underlying message.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use provision_core::{Error, JobSubmitter, ProvisioningJob, SubmitRequest, SubmitResponse};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// A submission or lookup failure rendered as JSON
#[derive(Debug)]
struct IntakeError(Error);

impl From<Error> for IntakeError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let (error, message) = match &self.0 {
            Error::DuplicateActiveDomain { .. } => ("duplicate_active_domain", self.0.to_string()),
            Error::InvalidInput(_) => ("invalid_input", self.0.to_string()),
            Error::NotFound(_) => ("not_found", self.0.to_string()),
            other => {
                error!("Intake request failed: {}", other);
                ("internal", "Internal error".to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

/// Build the intake router
pub fn router(submitter: Arc<JobSubmitter>) -> Router {
    Router::new()
        .route("/v1/jobs", post(submit_job))
        .route("/v1/jobs/{job_id}", get(job_status))
        .with_state(submitter)
}

async fn submit_job(
    State(submitter): State<Arc<JobSubmitter>>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), IntakeError> {
    let response = submitter.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn job_status(
    State(submitter): State<Arc<JobSubmitter>>,
    Path(job_id): Path<String>,
) -> Result<Json<ProvisioningJob>, IntakeError> {
    Ok(Json(submitter.status(&job_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use provision_core::traits::JobStore;
    use provision_core::{JobState, MemoryJobStore};
    use tower::ServiceExt;

    fn app(max_attempts: u32) -> (Router, Arc<MemoryJobStore>) {
        let store = Arc::new(MemoryJobStore::new());
        let submitter = Arc::new(JobSubmitter::new(store.clone(), max_attempts));
        (router(submitter), store)
    }

    fn submit_request(domain: &str, server_ip: &str) -> Request<Body> {
        let body = serde_json::json!({
            "domain": domain,
            "serverIp": server_ip,
            "projectId": "project-1"
        });
        Request::post("/v1/jobs")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_submit_queues_job_with_configured_budget() {
        let (app, store) = app(5);

        let response = app
            .oneshot(submit_request("Example.COM", "203.0.113.5"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = json_body(response).await;
        let job_id = body["jobId"].as_str().unwrap();
        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.domain, "example.com");
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.max_attempts, 5);
    }

    #[tokio::test]
    async fn test_status_returns_job() {
        let (app, _store) = app(3);

        let response = app
            .clone()
            .oneshot(submit_request("example.com", "203.0.113.5"))
            .await
            .unwrap();
        let job_id = json_body(response).await["jobId"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(
                Request::get(format!("/v1/jobs/{}", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["id"], job_id.as_str());
        assert_eq!(body["state"], "queued");
        assert_eq!(body["max_attempts"], 3);
    }

    #[tokio::test]
    async fn test_duplicate_domain_is_conflict() {
        let (app, store) = app(3);

        let first = app
            .clone()
            .oneshot(submit_request("example.com", "203.0.113.5"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = app
            .oneshot(submit_request("example.com", "203.0.113.6"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(second).await["error"], "duplicate_active_domain");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_bad_request() {
        let (app, store) = app(3);

        let response = app
            .oneshot(submit_request("example.com", "not-an-ip"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_input");
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (app, _store) = app(3);

        let response = app
            .oneshot(
                Request::get("/v1/jobs/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_store_failure_hides_details() {
        let response = IntakeError(Error::job_store("/var/lib/provision/jobs.json: disk full"))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert_eq!(body["error"], "internal");
        assert!(!body["message"].as_str().unwrap().contains("disk full"));
    }
}
