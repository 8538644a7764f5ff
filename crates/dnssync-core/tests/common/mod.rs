//! Test doubles and common utilities for reconciliation contract tests
//!
//! `FakeRewriteApi` keeps rewrite rules in memory, counts every call and can
//! be told to fail specific calls.

#![allow(dead_code)]

use dnssync_core::{
    DomainFilter, Endpoint, Error, NewRewriteRule, ProviderConfig, Reconciler, RecordType,
    Result, RewriteApi, RewriteRule,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure to inject into a vendor call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    Transient,
    Auth,
    Fatal,
    Conflict,
}

impl Injected {
    fn to_error(self, what: &str) -> Error {
        match self {
            Injected::Transient => Error::transient(format!("{}: 503 Service Unavailable", what)),
            Injected::Auth => Error::auth(format!("{}: 403 Forbidden", what)),
            Injected::Fatal => Error::fatal(format!("{}: malformed response", what)),
            Injected::Conflict => Error::conflict(format!("{}: duplicate", what)),
        }
    }
}

/// In-memory rewrite API with call counters
#[derive(Default)]
pub struct FakeRewriteApi {
    rules: Mutex<Vec<RewriteRule>>,
    next_id: AtomicUsize,

    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    created: Mutex<Vec<NewRewriteRule>>,
    deleted: Mutex<Vec<String>>,

    fail_list: Mutex<Option<Injected>>,
    fail_creates: Mutex<HashMap<String, Injected>>,
    fail_deletes: Mutex<HashMap<String, Injected>>,
    delay: Mutex<Option<Duration>>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    in_flight_hosts: Mutex<HashSet<String>>,
    same_host_overlap: AtomicUsize,
}

impl FakeRewriteApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a fake pre-populated with `(hostname, target)` rules
    pub fn with_rules(rules: &[(&str, &str)]) -> Arc<Self> {
        let api = Self::default();
        for (hostname, target) in rules {
            api.insert(hostname, target);
        }
        Arc::new(api)
    }

    /// Add a rule directly, bypassing counters
    pub fn insert(&self, hostname: &str, target: &str) -> String {
        let id = format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.rules
            .lock()
            .unwrap()
            .push(RewriteRule::new(id.clone(), hostname, target));
        id
    }

    pub fn fail_list_with(&self, failure: Injected) {
        *self.fail_list.lock().unwrap() = Some(failure);
    }

    pub fn fail_creates_for(&self, hostname: &str, failure: Injected) {
        self.fail_creates
            .lock()
            .unwrap()
            .insert(hostname.to_string(), failure);
    }

    pub fn fail_deletes_for(&self, rule_id: &str, failure: Injected) {
        self.fail_deletes
            .lock()
            .unwrap()
            .insert(rule_id.to_string(), failure);
    }

    /// Make every create/delete take this long
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn rules(&self) -> Vec<RewriteRule> {
        self.rules.lock().unwrap().clone()
    }

    /// Sorted `(hostname, target)` pairs currently stored
    pub fn rule_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .rules()
            .into_iter()
            .map(|r| (r.hostname, r.target))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.create_calls() + self.delete_calls()
    }

    /// Rules passed to create_rule, in call order
    pub fn created(&self) -> Vec<NewRewriteRule> {
        self.created.lock().unwrap().clone()
    }

    /// Ids passed to delete_rule, in call order
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of times a call started while another call for the same host was running
    pub fn same_host_overlap(&self) -> usize {
        self.same_host_overlap.load(Ordering::SeqCst)
    }

    async fn enter(&self, hostname: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.in_flight_hosts.lock().unwrap().insert(hostname.to_string()) {
            self.same_host_overlap.fetch_add(1, Ordering::SeqCst);
        }

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn leave(&self, hostname: &str) {
        self.in_flight_hosts.lock().unwrap().remove(hostname);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl RewriteApi for FakeRewriteApi {
    async fn list_rules(&self, _profile_id: &str) -> Result<Vec<RewriteRule>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.fail_list.lock().unwrap() {
            return Err(failure.to_error("list"));
        }
        Ok(self.rules())
    }

    async fn create_rule(&self, _profile_id: &str, rule: &NewRewriteRule) -> Result<RewriteRule> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(rule.clone());

        self.enter(&rule.hostname).await;
        let result = (|| {
            let failure = self.fail_creates.lock().unwrap().get(&rule.hostname).copied();
            if let Some(failure) = failure {
                return Err(failure.to_error("create"));
            }

            let id = self.insert(&rule.hostname, &rule.target);
            Ok(RewriteRule::new(id, rule.hostname.clone(), rule.target.clone()))
        })();
        self.leave(&rule.hostname);

        result
    }

    async fn delete_rule(&self, _profile_id: &str, rule_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.deleted.lock().unwrap().push(rule_id.to_string());

        let hostname = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == rule_id)
            .map(|r| r.hostname.clone())
            .unwrap_or_default();

        self.enter(&hostname).await;
        let failure = self.fail_deletes.lock().unwrap().get(rule_id).copied();
        let result = if let Some(failure) = failure {
            Err(failure.to_error("delete"))
        } else {
            let mut rules = self.rules.lock().unwrap();
            let before = rules.len();
            rules.retain(|r| r.id != rule_id);
            if rules.len() == before {
                Err(Error::not_found(format!("rewrite {}", rule_id)))
            } else {
                Ok(())
            }
        };
        self.leave(&hostname);

        result
    }

    fn api_name(&self) -> &'static str {
        "fake"
    }
}

/// Reconciler scoped to example.com over the given fake
pub fn reconciler(api: &Arc<FakeRewriteApi>) -> Reconciler {
    reconciler_with(api, |config| config)
}

/// Reconciler over the given fake with a customized configuration
pub fn reconciler_with(
    api: &Arc<FakeRewriteApi>,
    customize: impl FnOnce(ProviderConfig) -> ProviderConfig,
) -> Reconciler {
    let config = ProviderConfig::new("test-key", "abc123")
        .with_domain_filter(DomainFilter::new(["example.com"]));
    Reconciler::new(api.clone(), customize(config)).expect("reconciler construction succeeds")
}

pub fn a(name: &str, targets: &[&str]) -> Endpoint {
    Endpoint::new(name, RecordType::A, targets.iter().copied())
}

pub fn aaaa(name: &str, targets: &[&str]) -> Endpoint {
    Endpoint::new(name, RecordType::Aaaa, targets.iter().copied())
}

pub fn cname(name: &str, target: &str) -> Endpoint {
    Endpoint::new(name, RecordType::Cname, [target])
}

pub fn txt(name: &str, value: &str) -> Endpoint {
    Endpoint::new(name, RecordType::Txt, [value])
}

pub fn pair(hostname: &str, target: &str) -> (String, String) {
    (hostname.to_string(), target.to_string())
}
