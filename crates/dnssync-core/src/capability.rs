//! Which endpoint shapes the vendor can represent
//!
//! Rewrite rules are flat hostname → address/hostname pairs. There is no
//! TXT, MX or SRV equivalent, no TTL and no weighted routing. Endpoints that
//! fall outside this model are dropped on read and rejected on write.

use std::net::IpAddr;

use tracing::debug;

use crate::domain_filter::DomainFilter;
use crate::endpoint::{Endpoint, RecordType};
use crate::error::{Error, Result};

/// Record types the vendor can store
pub const SUPPORTED_RECORD_TYPES: [RecordType; 3] = [RecordType::A, RecordType::Aaaa, RecordType::Cname];

/// Capability filter bound to one domain filter
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    domain_filter: DomainFilter,
}

impl Capabilities {
    pub fn new(domain_filter: DomainFilter) -> Self {
        Self { domain_filter }
    }

    pub fn domain_filter(&self) -> &DomainFilter {
        &self.domain_filter
    }

    /// Whether the endpoint lies inside the configured domain filter
    pub fn in_scope(&self, endpoint: &Endpoint) -> bool {
        self.domain_filter.matches(&endpoint.dns_name)
    }

    /// Check that the vendor can represent the endpoint
    ///
    /// Scope is not part of this check; callers drop out-of-scope entries
    /// before validating.
    pub fn validate(&self, endpoint: &Endpoint) -> Result<()> {
        let reject = |reason: String| -> Result<()> {
            Err(Error::validation(endpoint.to_string(), reason))
        };

        if endpoint.dns_name.trim().trim_end_matches('.').is_empty() {
            return reject("DNS name is empty".to_string());
        }

        if !SUPPORTED_RECORD_TYPES.contains(&endpoint.record_type) {
            return reject(format!(
                "record type {} is not supported (supported: A, AAAA, CNAME)",
                endpoint.record_type
            ));
        }

        if endpoint.targets.is_empty() {
            return reject("endpoint has no targets".to_string());
        }

        if endpoint.record_type == RecordType::Cname && endpoint.targets.len() > 1 {
            return reject(format!(
                "CNAME must have exactly one target, got {}",
                endpoint.targets.len()
            ));
        }

        for target in &endpoint.targets {
            let parsed = target.trim().parse::<IpAddr>();
            let valid = match endpoint.record_type {
                RecordType::A => matches!(parsed, Ok(IpAddr::V4(_))),
                RecordType::Aaaa => matches!(parsed, Ok(IpAddr::V6(_))),
                _ => parsed.is_err() && !target.trim().is_empty(),
            };
            if !valid {
                return reject(format!(
                    "target {:?} is not valid for a {} record",
                    target, endpoint.record_type
                ));
            }
        }

        Ok(())
    }

    /// In scope and representable
    pub fn is_supported(&self, endpoint: &Endpoint) -> bool {
        self.in_scope(endpoint) && self.validate(endpoint).is_ok()
    }

    /// Keep only supported endpoints, silently dropping the rest
    pub fn retain_supported(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        endpoints
            .into_iter()
            .filter(|endpoint| {
                let supported = self.is_supported(endpoint);
                if !supported {
                    debug!("Dropping unsupported or out-of-scope record {}", endpoint);
                }
                supported
            })
            .collect()
    }

    /// Normalize desired endpoints before the orchestrator plans with them
    ///
    /// The vendor has no TTL, so any requested TTL is cleared; otherwise the
    /// orchestrator would see a TTL difference on every poll.
    pub fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        endpoints
            .into_iter()
            .map(|mut endpoint| {
                endpoint.record_ttl = None;
                endpoint
            })
            .collect()
    }
}
