//! Change-set planning
//!
//! Turns a [`ChangeSet`] into an ordered list of rule-level operations. No
//! I/O happens here: scope filtering, validation and update diffing are pure
//! so the exact calls an apply will make can be inspected up front.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::capability::Capabilities;
use crate::endpoint::{ChangeSet, Endpoint, RecordType};
use crate::error::{Error, Failure};
use crate::mapper::{self, normalize_hostname, normalize_target, rule_key};
use crate::traits::NewRewriteRule;

/// One vendor call, identified by rule content rather than id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Create(NewRewriteRule),
    Delete(NewRewriteRule),
}

impl Operation {
    pub fn rule(&self) -> &NewRewriteRule {
        match self {
            Operation::Create(rule) | Operation::Delete(rule) => rule,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Operation::Create(_))
    }

    /// Normalized hostname used to serialize calls
    pub fn host_key(&self) -> String {
        normalize_hostname(&self.rule().hostname)
    }

    /// Normalized target used to match existing rules
    pub fn target_key(&self) -> String {
        normalize_target(&self.rule().target)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create(rule) => write!(f, "create {}", rule),
            Operation::Delete(rule) => write!(f, "delete {}", rule),
        }
    }
}

/// Result of planning one change set
#[derive(Debug, Default)]
pub struct Plan {
    /// Deletes first, then creates, without duplicates
    pub operations: Vec<Operation>,
    /// Validation failures, one per rejected endpoint
    pub failures: Vec<Failure>,
    /// Number of endpoints dropped for being outside the domain filter
    pub out_of_scope: usize,
}

impl Plan {
    /// Plan the rule-level operations for a change set
    pub fn build(changes: &ChangeSet, capabilities: &Capabilities) -> Self {
        let mut planner = Planner {
            capabilities,
            plan: Plan::default(),
        };

        let delete = planner.admit(&changes.delete);
        let create = planner.admit(&changes.create);
        let update_old = planner.admit(&changes.update_old);
        let update_new = planner.admit(&changes.update_new);

        let mut deletes = Vec::new();
        let mut creates = Vec::new();

        for endpoint in delete {
            deletes.extend(mapper::to_vendor_rules(endpoint).into_iter().map(Operation::Delete));
        }

        for (old, new) in planner.pair_updates(update_old, update_new) {
            let (removed, added) = diff_targets(old, new);
            deletes.extend(removed.into_iter().map(Operation::Delete));
            creates.extend(added.into_iter().map(Operation::Create));
        }

        for endpoint in create {
            creates.extend(mapper::to_vendor_rules(endpoint).into_iter().map(Operation::Create));
        }

        let mut seen = HashSet::new();
        planner.plan.operations = deletes
            .into_iter()
            .chain(creates)
            .filter(|op| seen.insert((op.is_create(), rule_key(&op.rule().hostname, &op.rule().target))))
            .collect();

        planner.plan
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.failures.is_empty()
    }
}

struct Planner<'a> {
    capabilities: &'a Capabilities,
    plan: Plan,
}

type UpdateKey = (String, RecordType);

impl<'a> Planner<'a> {
    /// Drop out-of-scope endpoints, record validation failures, return the rest
    fn admit<'e>(&mut self, endpoints: &'e [Endpoint]) -> Vec<&'e Endpoint> {
        let mut admitted = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            if !self.capabilities.in_scope(endpoint) {
                debug!("Ignoring {}: outside the domain filter", endpoint);
                self.plan.out_of_scope += 1;
                continue;
            }

            match self.capabilities.validate(endpoint) {
                Ok(()) => admitted.push(endpoint),
                Err(e) => self.plan.failures.push(Failure::new(endpoint.to_string(), e)),
            }
        }

        admitted
    }

    /// Pair `UpdateOld`/`UpdateNew` by name and type
    fn pair_updates<'e>(
        &mut self,
        old: Vec<&'e Endpoint>,
        new: Vec<&'e Endpoint>,
    ) -> Vec<(&'e Endpoint, &'e Endpoint)> {
        let key = |e: &Endpoint| -> UpdateKey { (normalize_hostname(&e.dns_name), e.record_type.clone()) };

        let mut new_by_key: HashMap<UpdateKey, &'e Endpoint> = HashMap::new();
        for endpoint in new {
            new_by_key.insert(key(endpoint), endpoint);
        }

        let mut pairs = Vec::new();
        let mut old_keys = HashSet::new();
        for endpoint in old {
            let k = key(endpoint);
            match new_by_key.get(&k) {
                Some(matching) => {
                    old_keys.insert(k);
                    pairs.push((endpoint, *matching));
                }
                None => self.plan.failures.push(Failure::new(
                    endpoint.to_string(),
                    Error::validation(endpoint.to_string(), "update has no matching new endpoint"),
                )),
            }
        }

        let mut unpaired: Vec<&Endpoint> = new_by_key
            .iter()
            .filter(|(k, _)| !old_keys.contains(*k))
            .map(|(_, endpoint)| *endpoint)
            .collect();
        unpaired.sort_by(|a, b| a.dns_name.cmp(&b.dns_name));
        for endpoint in unpaired {
            self.plan.failures.push(Failure::new(
                endpoint.to_string(),
                Error::validation(endpoint.to_string(), "update has no matching old endpoint"),
            ));
        }

        pairs
    }
}

/// Targets only in `old` are removed, targets only in `new` are added,
/// shared targets are left alone.
fn diff_targets(old: &Endpoint, new: &Endpoint) -> (Vec<NewRewriteRule>, Vec<NewRewriteRule>) {
    let old_rules = mapper::to_vendor_rules(old);
    let new_rules = mapper::to_vendor_rules(new);

    let old_targets: HashSet<String> = old_rules.iter().map(|r| normalize_target(&r.target)).collect();
    let new_targets: HashSet<String> = new_rules.iter().map(|r| normalize_target(&r.target)).collect();

    let removed = old_rules
        .into_iter()
        .filter(|r| !new_targets.contains(&normalize_target(&r.target)))
        .collect();
    let added = new_rules
        .into_iter()
        .filter(|r| !old_targets.contains(&normalize_target(&r.target)))
        .collect();

    (removed, added)
}
