//! Reconciliation engine
//!
//! The Reconciler answers the orchestrator's two questions:
//! - `records()`: which in-scope, representable records exist right now
//! - `apply_changes()`: realize a change set with the fewest vendor calls
//!
//! ## Architecture
//!
//! ```text
//!   ChangeSet
//!       │
//!       ▼
//! ┌──────────────┐  scope filter, validation, update diffing
//! │     Plan     │──────────────────────────────────┐
//! └──────────────┘                                  │ ValidationErrors
//!       │ Vec<Operation>                            │
//!       ▼                                           ▼
//! ┌──────────────┐  list_rules snapshot   ┌──────────────────┐
//! │  Reconciler  │───────────────────────▶│  ApplyFailures   │
//! └──────────────┘  per-host groups       └──────────────────┘
//!       │           (bounded concurrency)
//!       ▼
//! ┌──────────────┐
//! │  RewriteApi  │
//! └──────────────┘
//! ```
//!
//! ## Apply Flow
//!
//! 1. Plan: drop out-of-scope entries, validate, diff updates
//! 2. Dry-run: report every planned operation, make no vendor call
//! 3. Live: take one fresh `list_rules` snapshot to resolve ids and skip
//!    rules that already exist
//! 4. Execute per-hostname groups concurrently, operations within a group
//!    sequentially
//! 5. Aggregate every failure into one error, or return the report

mod plan;

pub use plan::{Operation, Plan};

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::capability::Capabilities;
use crate::config::ProviderConfig;
use crate::domain_filter::DomainFilter;
use crate::endpoint::{ChangeSet, Endpoint};
use crate::error::{ApplyFailures, Error, Failure, Result};
use crate::mapper::{self, normalize_hostname, normalize_target};
use crate::traits::RewriteApi;

/// What happened to one planned operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The vendor call was made and succeeded
    Applied,
    /// Create skipped: an identical rule already exists
    AlreadyPresent,
    /// Delete skipped: no matching rule exists
    AlreadyAbsent,
    /// Dry-run: recorded as if it succeeded, no call made
    DryRun,
}

/// A planned operation together with its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOperation {
    pub operation: Operation,
    pub outcome: OperationOutcome,
}

/// Summary of a successful `apply_changes` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Whether the report was produced in dry-run mode
    pub dry_run: bool,
    /// Every planned operation, in plan order
    pub operations: Vec<AppliedOperation>,
    /// Endpoints ignored for being outside the domain filter
    pub out_of_scope: usize,
}

impl ApplyReport {
    /// Number of operations with the given outcome
    pub fn count(&self, outcome: OperationOutcome) -> usize {
        self.operations.iter().filter(|op| op.outcome == outcome).count()
    }
}

/// Existing rule ids of one hostname, keyed by normalized target
type HostRules = HashMap<String, Vec<String>>;

/// Core reconciliation engine
///
/// Holds only immutable configuration and the vendor client. Concurrent
/// `apply_changes` calls are serialized so two change sets touching the same
/// hostname never interleave; `records()` is never blocked.
pub struct Reconciler {
    /// Vendor API client
    api: Arc<dyn RewriteApi>,

    /// Provider configuration (read-only)
    config: ProviderConfig,

    /// Capability filter bound to the configured domain filter
    capabilities: Capabilities,

    /// Serializes apply_changes calls
    apply_lock: Mutex<()>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("api", &self.api.api_name())
            .field("config", &self.config)
            .finish()
    }
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// - `Ok(Reconciler)`: ready to serve requests
    /// - `Err(Error::Config)`: if the configuration is invalid
    pub fn new(api: Arc<dyn RewriteApi>, config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let capabilities = Capabilities::new(config.domain_filter.clone());

        Ok(Self {
            api,
            config,
            capabilities,
            apply_lock: Mutex::new(()),
        })
    }

    pub fn domain_filter(&self) -> &DomainFilter {
        &self.config.domain_filter
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Current in-scope, representable records
    ///
    /// Unsupported rules (out of scope, or not mappable to A/AAAA/CNAME) are
    /// dropped silently. Fails only when listing the vendor rules fails.
    pub async fn records(&self) -> Result<Vec<Endpoint>> {
        let rules = self.api.list_rules(&self.config.profile_id).await?;
        debug!("Fetched {} rewrite rule(s) from {}", rules.len(), self.api.api_name());

        let endpoints = self.capabilities.retain_supported(mapper::to_endpoints(&rules));
        debug!("Returning {} endpoint(s)", endpoints.len());

        Ok(endpoints)
    }

    /// Normalize desired endpoints for the orchestrator's planner
    pub fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        self.capabilities.adjust_endpoints(endpoints)
    }

    /// Plan a change set without executing it
    pub fn plan(&self, changes: &ChangeSet) -> Plan {
        Plan::build(changes, &self.capabilities)
    }

    /// Apply a change set
    ///
    /// Every valid operation is attempted even when others fail.
    ///
    /// # Returns
    ///
    /// - `Ok(ApplyReport)`: every operation succeeded (or was simulated)
    /// - `Err(Error::Apply)`: one entry per rejected endpoint and failed operation
    /// - `Err(e)`: listing the current rules failed and nothing else did
    pub async fn apply_changes(&self, changes: ChangeSet) -> Result<ApplyReport> {
        let _guard = self.apply_lock.lock().await;

        let Plan {
            operations,
            mut failures,
            out_of_scope,
        } = self.plan(&changes);

        info!(
            "Applying {} operation(s) from {} endpoint(s) [mode: {}]",
            operations.len(),
            changes.len(),
            if self.config.dry_run { "DRY-RUN" } else { "LIVE" }
        );
        for failure in &failures {
            warn!("Rejected {}", failure);
        }

        let mut report = ApplyReport {
            dry_run: self.config.dry_run,
            operations: Vec::with_capacity(operations.len()),
            out_of_scope,
        };

        if self.config.dry_run {
            for operation in operations {
                info!("[DRY-RUN] Would {}", operation);
                report.operations.push(AppliedOperation {
                    operation,
                    outcome: OperationOutcome::DryRun,
                });
            }
        } else if !operations.is_empty() {
            match self.snapshot().await {
                Ok(mut snapshot) => {
                    let results = self.execute(operations, &mut snapshot).await;
                    for result in results {
                        match result {
                            Ok(applied) => report.operations.push(applied),
                            Err(failure) => failures.push(failure),
                        }
                    }
                }
                Err(e) if failures.is_empty() => return Err(e),
                Err(e) => failures.push(Failure::new("list rewrite rules", e)),
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            warn!("{} failure(s) while applying changes", failures.len());
            Err(Error::Apply(ApplyFailures::new(failures)))
        }
    }

    /// Fresh view of existing rules, grouped by normalized hostname
    async fn snapshot(&self) -> Result<HashMap<String, HostRules>> {
        let rules = self.api.list_rules(&self.config.profile_id).await?;

        let mut snapshot: HashMap<String, HostRules> = HashMap::new();
        for rule in rules {
            snapshot
                .entry(normalize_hostname(&rule.hostname))
                .or_default()
                .entry(normalize_target(&rule.target))
                .or_default()
                .push(rule.id);
        }

        Ok(snapshot)
    }

    /// Run operations grouped by hostname, groups concurrently
    async fn execute(
        &self,
        operations: Vec<Operation>,
        snapshot: &mut HashMap<String, HostRules>,
    ) -> Vec<std::result::Result<AppliedOperation, Failure>> {
        let mut groups: Vec<(Vec<Operation>, HostRules)> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();

        for operation in operations {
            let host = operation.host_key();
            let slot = match group_index.get(&host) {
                Some(slot) => *slot,
                None => {
                    let existing = snapshot.remove(&host).unwrap_or_default();
                    groups.push((Vec::new(), existing));
                    group_index.insert(host, groups.len() - 1);
                    groups.len() - 1
                }
            };
            groups[slot].0.push(operation);
        }

        let limit = self.config.engine.max_concurrency.max(1);
        stream::iter(groups)
            .map(|(ops, existing)| self.execute_group(ops, existing))
            .buffered(limit)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Run one hostname's operations in plan order
    async fn execute_group(
        &self,
        operations: Vec<Operation>,
        mut existing: HostRules,
    ) -> Vec<std::result::Result<AppliedOperation, Failure>> {
        let mut results = Vec::with_capacity(operations.len());

        for operation in operations {
            let outcome = match &operation {
                Operation::Create(_) => self.create(&operation, &mut existing).await,
                Operation::Delete(_) => self.delete(&operation, &mut existing).await,
            };

            results.push(match outcome {
                Ok(outcome) => Ok(AppliedOperation { operation, outcome }),
                Err(e) => {
                    warn!("Failed to {}: {}", operation, e);
                    Err(Failure::new(operation.to_string(), e))
                }
            });
        }

        results
    }

    async fn create(&self, operation: &Operation, existing: &mut HostRules) -> Result<OperationOutcome> {
        let target = operation.target_key();
        if existing.get(&target).is_some_and(|ids| !ids.is_empty()) {
            debug!("Skipping {}: rule already exists", operation);
            return Ok(OperationOutcome::AlreadyPresent);
        }

        match self.api.create_rule(&self.config.profile_id, operation.rule()).await {
            Ok(created) => {
                info!("Created rewrite {} (id {})", operation.rule(), created.id);
                existing.entry(target).or_default().push(created.id);
                Ok(OperationOutcome::Applied)
            }
            Err(Error::Conflict(msg)) => {
                debug!("Skipping {}: vendor reports duplicate ({})", operation, msg);
                Ok(OperationOutcome::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, operation: &Operation, existing: &mut HostRules) -> Result<OperationOutcome> {
        let ids = existing.remove(&operation.target_key()).unwrap_or_default();
        if ids.is_empty() {
            debug!("Skipping {}: no matching rule", operation);
            return Ok(OperationOutcome::AlreadyAbsent);
        }

        // Every duplicate id is attempted; ids that failed stay in the snapshot
        let mut first_error = None;
        let mut remaining = Vec::new();
        for id in ids {
            match self.api.delete_rule(&self.config.profile_id, &id).await {
                Ok(()) => info!("Deleted rewrite {} (id {})", operation.rule(), id),
                Err(Error::NotFound(_)) => debug!("Rewrite {} already gone", id),
                Err(e) => {
                    debug!("Failed to delete rewrite {}: {}", id, e);
                    remaining.push(id);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            None => Ok(OperationOutcome::Applied),
            Some(e) => {
                existing.insert(operation.target_key(), remaining);
                Err(e)
            }
        }
    }
}
