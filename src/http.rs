//! HTTP API for partner learning progress
//!
//! The upstream identity collaborator authenticates the partner and passes
//! the id in the `X-Partner-Id` header. Every route except `/health` and
//! certificate verification requires it.
//!
//! ## Routes
//! - `GET  /health`
//! - `GET  /courses/{course_id}` - overview with visible chapter statuses
//! - `GET  /courses/{course_id}/certificate` - certificate or 404 not_yet_earned
//! - `GET  /chapters/{chapter_id}` - chapter content + visible status
//! - `POST /chapters/{chapter_id}/start`
//! - `POST /chapters/{chapter_id}/progress` - playback report
//! - `POST /chapters/{chapter_id}/complete`
//! - `GET  /chapters/{chapter_id}/test` - questions without answer keys
//! - `POST /tests/{test_id}/submit`
//! - `GET  /tests/{test_id}/attempts`
//! - `GET  /certificates/{number}` - public verification
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -H "X-Partner-Id: partner-42" \
//!      -d '{"position_seconds": 85, "duration_seconds": 100, "ended": false}' \
//!      http://localhost:8095/chapters/ch-1/progress
//!
//! curl -X POST -H "X-Partner-Id: partner-42" \
//!      -d '{"answers": {"q1": [0], "q2": [0, 1]}}' \
//!      http://localhost:8095/tests/test-2/submit
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::db::PartnerContext;
use crate::error::LearningError;
use crate::services::{self, Answers, Services};

/// Header carrying the authenticated partner id
pub const PARTNER_HEADER: &str = "x-partner-id";

#[derive(Debug, Deserialize)]
struct ProgressRequest {
    position_seconds: f64,
    #[serde(default)]
    duration_seconds: f64,
    #[serde(default)]
    ended: bool,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    answers: Answers,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self { services, bind_addr }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), LearningError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    pub async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        let response = match (&method, segments.as_slice()) {
            (&Method::GET, ["health"]) => services::from_result(self.handle_health().await),
            (&Method::GET, ["certificates", number]) => {
                let number = number.to_string();
                let svc = self.services.clone();
                services::from_option(
                    blocking(move || svc.certificates.verify(&number)).await,
                    "Certificate not found",
                )
            }
            (_, ["courses", ..]) | (_, ["chapters", ..]) | (_, ["tests", ..]) => {
                match partner_context(&req) {
                    Ok(ctx) => self.route_partner(req, &method, &segments, ctx).await,
                    Err(e) => services::error_response(e),
                }
            }
            _ => services::not_found("Not Found"),
        };

        Ok(response)
    }

    async fn route_partner(
        &self,
        req: Request<Incoming>,
        method: &Method,
        segments: &[&str],
        ctx: PartnerContext,
    ) -> Response<Full<Bytes>> {
        let svc = self.services.clone();

        match (method, segments) {
            (&Method::GET, ["courses", id]) => {
                let id = id.to_string();
                services::from_result(blocking(move || svc.progress.course_overview(&ctx, &id)).await)
            }
            (&Method::GET, ["courses", id, "certificate"]) => {
                let id = id.to_string();
                services::from_result(blocking(move || svc.certificates.get_certificate(&ctx, &id)).await)
            }
            (&Method::GET, ["chapters", id]) => {
                let id = id.to_string();
                services::from_result(blocking(move || svc.progress.get_chapter(&ctx, &id)).await)
            }
            (&Method::POST, ["chapters", id, "start"]) => {
                let id = id.to_string();
                services::from_result(blocking(move || svc.progress.start_chapter(&ctx, &id)).await)
            }
            (&Method::POST, ["chapters", id, "complete"]) => {
                let id = id.to_string();
                services::from_result(blocking(move || svc.progress.complete_chapter(&ctx, &id)).await)
            }
            (&Method::POST, ["chapters", id, "progress"]) => {
                let id = id.to_string();
                self.handle_progress(req, ctx, id).await
            }
            (&Method::GET, ["chapters", id, "test"]) => {
                let id = id.to_string();
                services::from_result(blocking(move || svc.assessment.get_test(&ctx, &id)).await)
            }
            (&Method::POST, ["tests", id, "submit"]) => {
                let id = id.to_string();
                self.handle_submit(req, ctx, id).await
            }
            (&Method::GET, ["tests", id, "attempts"]) => {
                let id = id.to_string();
                services::from_result(blocking(move || svc.assessment.list_attempts(&ctx, &id)).await)
            }
            (_, ["courses", _]) | (_, ["courses", _, "certificate"]) | (_, ["chapters", _])
            | (_, ["chapters", _, "test"]) | (_, ["tests", _, "attempts"]) => services::method_not_allowed(),
            _ => services::not_found("Not Found"),
        }
    }

    /// Health check endpoint
    async fn handle_health(&self) -> Result<serde_json::Value, LearningError> {
        let db = self.services.db.clone();
        let stats = blocking(move || db.stats()).await?;
        Ok(serde_json::json!({
            "status": "ok",
            "courses": stats.course_count,
            "progress_records": stats.progress_count,
            "attempts": stats.attempt_count,
            "certificates": stats.certificate_count,
        }))
    }

    /// POST /chapters/{id}/progress - merge a playback report
    async fn handle_progress(
        &self,
        req: Request<Incoming>,
        ctx: PartnerContext,
        chapter_id: String,
    ) -> Response<Full<Bytes>> {
        let body: ProgressRequest = match read_json(req).await {
            Ok(body) => body,
            Err(e) => return services::error_response(e),
        };

        let svc = self.services.clone();
        let result = blocking(move || {
            svc.video.report_progress(
                &ctx,
                &chapter_id,
                body.position_seconds,
                body.duration_seconds,
                body.ended,
            )
        })
        .await;

        match result {
            // Malformed reports are dropped, not surfaced as failures
            Err(LearningError::InvalidProgress(reason)) => services::accepted(&serde_json::json!({
                "recorded": false,
                "reason": reason,
            })),
            other => services::from_result(other),
        }
    }

    /// POST /tests/{id}/submit - score a submission
    async fn handle_submit(
        &self,
        req: Request<Incoming>,
        ctx: PartnerContext,
        test_id: String,
    ) -> Response<Full<Bytes>> {
        let body: SubmitRequest = match read_json(req).await {
            Ok(body) => body,
            Err(e) => return services::error_response(e),
        };

        let svc = self.services.clone();
        let result = blocking(move || svc.assessment.submit_answers(&ctx, &test_id, body.answers)).await;
        services::from_result(result.map(|outcome| outcome.into_result()))
    }
}

/// Partner identity from the request headers
fn partner_context<B>(req: &Request<B>) -> Result<PartnerContext, LearningError> {
    let value = req
        .headers()
        .get(PARTNER_HEADER)
        .ok_or_else(|| LearningError::Unauthorized("missing X-Partner-Id header".into()))?;
    let partner_id = value
        .to_str()
        .map_err(|_| LearningError::Unauthorized("X-Partner-Id is not valid text".into()))?;
    PartnerContext::new(partner_id)
}

/// Read and parse a JSON request body
async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, LearningError> {
    let body = req
        .collect()
        .await
        .map_err(|e| LearningError::InvalidInput(format!("Failed to read body: {}", e)))?;
    serde_json::from_slice(&body.to_bytes())
        .map_err(|e| LearningError::InvalidInput(format!("Invalid JSON body: {}", e)))
}

/// Run database work off the async runtime
async fn blocking<T, F>(f: F) -> Result<T, LearningError>
where
    F: FnOnce() -> Result<T, LearningError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LearningError::Internal(format!("Blocking task failed: {}", e)))?
}
