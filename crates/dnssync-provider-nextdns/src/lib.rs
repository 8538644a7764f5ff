// # NextDNS Rewrite API Client
//
// This crate implements `dnssync_core::RewriteApi` against the NextDNS
// public API.
//
// ## Behaviour
//
// - One HTTP request per trait call, except `list_rules` which follows
//   pagination cursors until the listing is complete
// - Every failure is classified into the core error taxonomy and returned
// - NO retry logic (the orchestrator retries on its next poll)
// - NO caching (every read goes to the vendor)
// - NO dry-run handling (owned by the Reconciler, which makes no calls at all)
//
// ## Security Requirements
//
// - API key NEVER appears in logs, errors or `Debug` output
// - Client construction fails if the key is empty
//
// ## API Reference
//
// - List rewrites: GET `/profiles/:profile/rewrites[?cursor=...]`
// - Create rewrite: POST `/profiles/:profile/rewrites` `{ "name", "content" }`
// - Delete rewrite: DELETE `/profiles/:profile/rewrites/:id`
// - Auth header: `X-Api-Key: <key>`

use async_trait::async_trait;
use dnssync_core::traits::{NewRewriteRule, RewriteApi, RewriteRule};
use dnssync_core::{Error, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::time::Duration;

/// NextDNS API base URL
pub const NEXTDNS_API_BASE: &str = "https://api.nextdns.io";

/// Default HTTP timeout for API requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the API key
const API_KEY_HEADER: &str = "X-Api-Key";

/// NextDNS error code for a rewrite that already exists
const DUPLICATE_CODE: &str = "duplicate";

/// Resource addressed by a request; decides what a 404 means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// The rewrite collection of a profile
    Profile,
    /// One rewrite rule by id
    Rule,
}

/// Standard NextDNS response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    meta: Option<Meta>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ApiError>,
}

impl ApiError {
    fn describe(errors: &[ApiError]) -> String {
        errors
            .iter()
            .map(|e| match &e.detail {
                Some(detail) => format!("{} ({})", e.code, detail),
                None => e.code.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// NextDNS rewrite-rule API client
///
/// Stateless apart from the pooled HTTP connection. All coordination
/// (ordering, idempotence, concurrency) is owned by the `Reconciler`.
pub struct NextDnsClient {
    /// NextDNS API key
    /// ⚠️ NEVER log this value
    api_key: String,

    /// API base URL without trailing slash
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for NextDnsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextDnsClient")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl NextDnsClient {
    /// Create a client for the public NextDNS API
    ///
    /// # Returns
    ///
    /// - `Ok(NextDnsClient)`: ready to use
    /// - `Err(Error::Config)`: if the key is empty or the HTTP client cannot be built
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_base_url(api_key, NEXTDNS_API_BASE, timeout)
    }

    /// Create a client against a custom base URL (self-hosted proxy, tests)
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("NextDNS API key cannot be empty"));
        }

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("NextDNS API URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dnssync-nextdns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rewrites_url(&self, profile_id: &str) -> String {
        format!("{}/profiles/{}/rewrites", self.base_url, profile_id)
    }

    /// Send an authenticated request and classify non-2xx responses
    async fn send(&self, request: RequestBuilder, target: Target, what: &str) -> Result<Response> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| classify_transport(e, what))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        Err(classify_status(status, &body, target, what))
    }

    /// Read a 2xx response body into the standard envelope
    async fn envelope<T: DeserializeOwned>(response: Response, what: &str) -> Result<Envelope<T>> {
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(e, what))?;

        let envelope: Envelope<T> = serde_json::from_str(&text)
            .map_err(|e| Error::fatal(format!("{}: malformed response body: {}", what, e)))?;

        if !envelope.errors.is_empty() {
            return Err(classify_codes(&envelope.errors, what));
        }

        Ok(envelope)
    }
}

/// Map a transport-level failure; the message never contains the request headers
fn classify_transport(err: reqwest::Error, what: &str) -> Error {
    if err.is_timeout() {
        Error::transient(format!("{}: request timed out", what))
    } else if err.is_decode() {
        Error::fatal(format!("{}: malformed response body: {}", what, err))
    } else {
        Error::transient(format!("{}: HTTP request failed: {}", what, err.without_url()))
    }
}

fn classify_status(status: StatusCode, body: &str, target: Target, what: &str) -> Error {
    let errors = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.errors)
        .unwrap_or_default();
    let detail = if errors.is_empty() {
        body.trim().to_string()
    } else {
        ApiError::describe(&errors)
    };

    match status.as_u16() {
        401 | 403 => Error::auth(format!("{}: invalid API key or insufficient permissions ({})", what, status)),
        404 if target == Target::Rule => Error::not_found(format!("{}: {}", what, status)),
        // A missing profile is a configuration problem, never an idempotent success
        404 => Error::fatal(format!("{}: profile not found ({})", what, status)),
        409 => Error::conflict(format!("{}: {}", what, detail)),
        400 if errors.iter().any(|e| e.code == DUPLICATE_CODE) => {
            Error::conflict(format!("{}: {}", what, detail))
        }
        429 => Error::transient(format!("{}: rate limit exceeded ({})", what, status)),
        500..=599 => Error::transient(format!("{}: NextDNS server error {} - {}", what, status, detail)),
        _ => Error::fatal(format!("{}: unexpected status {} - {}", what, status, detail)),
    }
}

/// Errors reported inside a 2xx envelope
fn classify_codes(errors: &[ApiError], what: &str) -> Error {
    let detail = ApiError::describe(errors);
    if errors.iter().any(|e| e.code == DUPLICATE_CODE) {
        Error::conflict(format!("{}: {}", what, detail))
    } else {
        Error::fatal(format!("{}: {}", what, detail))
    }
}

#[async_trait]
impl RewriteApi for NextDnsClient {
    /// List every rewrite of a profile
    ///
    /// ```http
    /// GET /profiles/:profile/rewrites?cursor=...
    /// X-Api-Key: <key>
    /// ```
    async fn list_rules(&self, profile_id: &str) -> Result<Vec<RewriteRule>> {
        let url = self.rewrites_url(profile_id);
        let mut rules = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        loop {
            let mut request = self.client.get(&url);
            if let Some(cursor) = &cursor {
                request = request.query(&[("cursor", cursor)]);
            }

            let response = self.send(request, Target::Profile, "list rewrites").await?;
            let page: Envelope<Vec<RewriteRule>> = Self::envelope(response, "list rewrites").await?;
            let data = page
                .data
                .ok_or_else(|| Error::fatal("list rewrites: response has no data"))?;
            rules.extend(data);

            cursor = page
                .meta
                .and_then(|m| m.pagination)
                .and_then(|p| p.cursor)
                .filter(|c| !c.is_empty());

            match &cursor {
                None => break,
                Some(next) if !seen_cursors.insert(next.clone()) => {
                    return Err(Error::fatal(format!("list rewrites: pagination cursor {} repeated", next)));
                }
                Some(next) => tracing::debug!("Following rewrite pagination cursor {}", next),
            }
        }

        tracing::debug!("Listed {} rewrite(s) for profile {}", rules.len(), profile_id);
        Ok(rules)
    }

    /// Create one rewrite
    ///
    /// ```http
    /// POST /profiles/:profile/rewrites
    /// { "name": "www.example.com", "content": "192.0.2.1" }
    /// ```
    async fn create_rule(&self, profile_id: &str, rule: &NewRewriteRule) -> Result<RewriteRule> {
        let what = format!("create rewrite {}", rule);
        let request = self.client.post(self.rewrites_url(profile_id)).json(rule);

        let response = self.send(request, Target::Profile, &what).await?;
        let created: Envelope<RewriteRule> = Self::envelope(response, &what).await?;

        created
            .data
            .ok_or_else(|| Error::fatal(format!("{}: response has no data", what)))
    }

    /// Delete one rewrite
    ///
    /// ```http
    /// DELETE /profiles/:profile/rewrites/:id
    /// ```
    async fn delete_rule(&self, profile_id: &str, rule_id: &str) -> Result<()> {
        let what = format!("delete rewrite {}", rule_id);
        let url = format!("{}/{}", self.rewrites_url(profile_id), rule_id);

        self.send(self.client.delete(url), Target::Rule, &what).await?;
        Ok(())
    }

    fn api_name(&self) -> &'static str {
        "nextdns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_is_rejected() {
        let result = NextDnsClient::new("  ", DEFAULT_REQUEST_TIMEOUT);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_api_key_not_exposed_in_debug() {
        let client = NextDnsClient::new("secret_key_12345", DEFAULT_REQUEST_TIMEOUT).unwrap();

        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("secret_key"));
        assert!(debug_str.contains("NextDnsClient"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client =
            NextDnsClient::with_base_url("key", "http://localhost:9000/", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000");
        assert_eq!(client.rewrites_url("abc123"), "http://localhost:9000/profiles/abc123/rewrites");
    }

    #[test]
    fn test_status_classification() {
        let kind = |status: u16, body: &str| {
            classify_status(StatusCode::from_u16(status).unwrap(), body, Target::Rule, "test").kind()
        };

        assert_eq!(kind(401, ""), "authentication");
        assert_eq!(kind(403, ""), "authentication");
        assert_eq!(kind(404, ""), "not_found");
        assert_eq!(kind(409, ""), "conflict");
        assert_eq!(kind(400, r#"{"errors":[{"code":"duplicate"}]}"#), "conflict");
        assert_eq!(kind(400, r#"{"errors":[{"code":"invalid","detail":"name"}]}"#), "fatal");
        assert_eq!(kind(429, ""), "transient");
        assert_eq!(kind(502, "bad gateway"), "transient");
        assert_eq!(kind(418, ""), "fatal");
    }

    #[test]
    fn test_missing_profile_is_fatal() {
        let err = classify_status(StatusCode::NOT_FOUND, "", Target::Profile, "list rewrites");
        assert!(matches!(err, Error::Fatal(_)), "got {:?}", err);
        assert!(err.to_string().contains("profile not found"));
    }

    #[test]
    fn test_error_details_are_included() {
        let err = classify_status(
            StatusCode::BAD_REQUEST,
            r#"{"errors":[{"code":"invalid","detail":"content"}]}"#,
            Target::Profile,
            "create rewrite a -> b",
        );
        assert!(err.to_string().contains("invalid (content)"));
    }

    #[test]
    fn test_api_name() {
        let client = NextDnsClient::new("key", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(client.api_name(), "nextdns");
    }
}
