// # Rewrite API Trait
//
// Defines the interface to the vendor's rewrite-rule API.
//
// ## Implementations
//
// - NextDNS: `dnssync-provider-nextdns` crate
// - Tests: in-memory fakes in `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use dnssync_core::RewriteApi;
//
// async fn dump(api: &dyn RewriteApi) -> dnssync_core::Result<()> {
//     for rule in api.list_rules("abc123").await? {
//         println!("{} -> {}", rule.hostname, rule.target);
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A rewrite rule as stored by the vendor: one hostname, one target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RewriteRule {
    /// Opaque vendor id, needed for deletion
    pub id: String,
    /// Hostname the rule answers for
    #[serde(rename = "name")]
    pub hostname: String,
    /// IPv4/IPv6 literal or a hostname (CNAME-like rewrite)
    #[serde(rename = "content")]
    pub target: String,
}

impl RewriteRule {
    pub fn new(
        id: impl Into<String>,
        hostname: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
            target: target.into(),
        }
    }
}

/// A rule to be created; the vendor assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewRewriteRule {
    #[serde(rename = "name")]
    pub hostname: String,
    #[serde(rename = "content")]
    pub target: String,
}

impl NewRewriteRule {
    pub fn new(hostname: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for NewRewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.hostname, self.target)
    }
}

/// Trait for vendor rewrite-rule API clients
///
/// Every call is scoped by a profile id and performs network I/O only; no
/// state is kept between calls.
///
/// Implementations classify failures as:
/// - `Error::Transient`: network failure, timeout, 5xx, 429
/// - `Error::Authentication`: 401/403
/// - `Error::NotFound`: rule already absent (delete)
/// - `Error::Conflict`: identical rule already present (create)
/// - `Error::Fatal`: malformed response body, other 4xx
///
/// Implementations must not retry. Retry authority belongs to the
/// orchestrator's next poll.
#[async_trait]
pub trait RewriteApi: Send + Sync {
    /// List every rewrite rule of a profile, following pagination
    async fn list_rules(&self, profile_id: &str) -> Result<Vec<RewriteRule>, crate::Error>;

    /// Create one rewrite rule and return it with its assigned id
    async fn create_rule(
        &self,
        profile_id: &str,
        rule: &NewRewriteRule,
    ) -> Result<RewriteRule, crate::Error>;

    /// Delete one rewrite rule by id
    async fn delete_rule(&self, profile_id: &str, rule_id: &str) -> Result<(), crate::Error>;

    /// Get the API name (for logging/debugging)
    fn api_name(&self) -> &'static str;
}
