//! ExternalDNS webhook protocol binding
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /` | domain filter negotiation |
//! | `GET /records` | current records |
//! | `POST /records` | apply a change set |
//! | `POST /adjustendpoints` | normalize desired endpoints |
//! | `GET /healthz` | liveness |
//!
//! Handlers only decode, delegate to the [`Reconciler`] and encode.
//! Vendor-facing handlers run under the write deadline; a call that outlives
//! it is dropped and answered with a structured `transient` error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum::routing::{get, post};
use dnssync_core::capability::SUPPORTED_RECORD_TYPES;
use dnssync_core::{ChangeSet, Endpoint, Error, Reconciler, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Media type of every webhook JSON payload
pub const MEDIA_TYPE: &str = "application/external.dns.webhook+json;version=1";

/// Transport deadlines of the webhook server
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Maximum time to receive a request body
    pub read: Duration,
    /// Maximum time to produce a response
    pub write: Duration,
}

/// Shared handler state
#[derive(Clone)]
struct WebhookState {
    reconciler: Arc<Reconciler>,
    write_timeout: Duration,
}

impl WebhookState {
    /// Run a vendor-facing call under the write deadline
    async fn within_deadline<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.write_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(Error::transient(format!(
                    "write deadline of {:?} exceeded",
                    self.write_timeout
                )))
            })
    }
}

/// Negotiation response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Negotiation<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    exclude: &'a [String],
    supported_record_types: Vec<String>,
}

/// Body of a failed webhook call
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    failures: Vec<FailureBody>,
}

#[derive(Debug, Serialize)]
struct FailureBody {
    subject: String,
    kind: &'static str,
    message: String,
}

impl ErrorBody {
    fn from_error(subject: &str, err: &Error) -> Self {
        let failures = match err {
            Error::Apply(failures) => failures
                .iter()
                .map(|f| FailureBody {
                    subject: f.subject.clone(),
                    kind: f.error.kind(),
                    message: f.error.to_string(),
                })
                .collect(),
            other => vec![FailureBody {
                subject: subject.to_string(),
                kind: other.kind(),
                message: other.to_string(),
            }],
        };

        Self {
            message: err.to_string(),
            failures,
        }
    }
}

/// Build the webhook router around a reconciler
pub fn router(reconciler: Arc<Reconciler>, timeouts: Timeouts) -> Router {
    Router::new()
        .route("/", get(negotiate))
        .route("/records", get(get_records).post(apply_changes))
        .route("/adjustendpoints", post(adjust_endpoints))
        .route("/healthz", get(healthz))
        .layer(RequestBodyTimeoutLayer::new(timeouts.read))
        .layer(TraceLayer::new_for_http())
        .with_state(WebhookState {
            reconciler,
            write_timeout: timeouts.write,
        })
}

async fn negotiate(State(state): State<WebhookState>) -> Response {
    let filter = state.reconciler.domain_filter();
    webhook_json(
        StatusCode::OK,
        &Negotiation {
            include: filter.include(),
            exclude: filter.exclude(),
            supported_record_types: SUPPORTED_RECORD_TYPES.iter().map(|t| t.to_string()).collect(),
        },
    )
}

async fn get_records(State(state): State<WebhookState>) -> Response {
    match state.within_deadline(state.reconciler.records()).await {
        Ok(records) => {
            debug!("Returning {} record(s)", records.len());
            webhook_json(StatusCode::OK, &records)
        }
        Err(e) => {
            error!("Failed to list records: {}", e);
            webhook_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorBody::from_error("list records", &e),
            )
        }
    }
}

async fn apply_changes(State(state): State<WebhookState>, body: Bytes) -> Response {
    let changes: ChangeSet = match decode(&body) {
        Ok(changes) => changes,
        Err(response) => return response,
    };

    if changes.is_empty() {
        debug!("Received empty change set");
    }

    match state.within_deadline(state.reconciler.apply_changes(changes)).await {
        Ok(report) => {
            info!(
                "Applied change set: {} operation(s), {} out of scope{}",
                report.operations.len(),
                report.out_of_scope,
                if report.dry_run { " [DRY-RUN]" } else { "" }
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            warn!("Change set failed: {}", e);
            webhook_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorBody::from_error("apply changes", &e),
            )
        }
    }
}

async fn adjust_endpoints(State(state): State<WebhookState>, body: Bytes) -> Response {
    let endpoints: Vec<Endpoint> = match decode(&body) {
        Ok(endpoints) => endpoints,
        Err(response) => return response,
    };

    webhook_json(StatusCode::OK, &state.reconciler.adjust_endpoints(endpoints))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Decode a JSON request body; `null` decodes like an empty body
fn decode<T: DeserializeOwned + Default>(body: &[u8]) -> std::result::Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    match serde_json::from_slice::<Option<T>>(body) {
        Ok(value) => Ok(value.unwrap_or_default()),
        Err(e) => {
            warn!("Rejected undecodable request body: {}", e);
            let err = Error::from(e);
            Err(webhook_json(
                StatusCode::BAD_REQUEST,
                &ErrorBody::from_error("decode request body", &err),
            ))
        }
    }
}

fn webhook_json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (status, [(header::CONTENT_TYPE, MEDIA_TYPE)], body).into_response(),
        Err(e) => {
            error!("Failed to encode response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
