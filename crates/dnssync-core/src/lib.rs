// # dnssync-core
//
// Core library for the NextDNS rewrite-rule webhook adapter.
//
// ## Architecture Overview
//
// The orchestrator (ExternalDNS) hands this library finished change sets and
// asks it for the current state. Everything between the webhook binding and
// the vendor HTTP client lives here:
//
// - **Endpoint / ChangeSet**: the orchestrator's record model
// - **DomainFilter**: suffix scoping applied on both read and write paths
// - **mapper**: rewrite rule <-> endpoint translation (one rule per target)
// - **Capabilities**: which endpoint shapes the vendor can represent
// - **Reconciler**: `records()` and `apply_changes()`
// - **RewriteApi**: trait implemented by the vendor client crate
//
// ## Design Principles
//
// 1. **Stateless**: every call recomputes truth from the vendor
// 2. **Partial progress**: one failing record never blocks the rest of a batch
// 3. **Injected collaborators**: config and vendor client are passed in, never read from ambient state

pub mod capability;
pub mod config;
pub mod domain_filter;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod traits;

// Re-export core types for convenience
pub use capability::Capabilities;
pub use config::{EngineConfig, ProviderConfig};
pub use domain_filter::DomainFilter;
pub use endpoint::{ChangeSet, Endpoint, ProviderSpecificProperty, RecordType};
pub use engine::{AppliedOperation, ApplyReport, Operation, OperationOutcome, Plan, Reconciler};
pub use error::{ApplyFailures, Error, Failure, Result};
pub use traits::{NewRewriteRule, RewriteApi, RewriteRule};
