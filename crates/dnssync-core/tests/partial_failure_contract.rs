//! Contract Test: Partial Failure Aggregation
//!
//! Constraints verified:
//! - Invalid endpoints are rejected one by one, the valid rest is applied
//! - A failing vendor call does not block other operations
//! - A failing delete of one duplicate rule does not skip the others
//! - Every failure is named in the aggregated error
//! - Listing failures propagate unchanged when nothing else failed
//!
//! If this test fails, one bad record can stall a whole change set.

mod common;

use common::*;
use dnssync_core::{ChangeSet, Error};
use tokio_test::assert_err;

fn apply_failures(err: Error) -> dnssync_core::ApplyFailures {
    match err {
        Error::Apply(failures) => failures,
        other => panic!("expected aggregated apply error, got {:?}", other),
    }
}

#[tokio::test]
async fn three_valid_creates_and_one_unsupported_type() {
    let api = FakeRewriteApi::new();
    let reconciler = reconciler(&api);

    let changes = ChangeSet {
        create: vec![
            a("one.example.com", &["10.0.0.1"]),
            txt("one.example.com", "heritage=external-dns,external-dns/owner=default"),
            aaaa("two.example.com", &["2001:db8::2"]),
            cname("three.example.com", "one.example.com"),
        ],
        ..Default::default()
    };

    let failures = apply_failures(assert_err!(reconciler.apply_changes(changes).await));

    assert_eq!(failures.len(), 1);
    assert_eq!(failures.count_kind("validation"), 1);
    let failure = failures.iter().next().unwrap();
    assert_eq!(failure.subject, "one.example.com (TXT)");
    assert!(failure.to_string().contains("TXT"));

    assert_eq!(api.create_calls(), 3);
    assert_eq!(
        api.rule_pairs(),
        vec![
            pair("one.example.com", "10.0.0.1"),
            pair("three.example.com", "one.example.com"),
            pair("two.example.com", "2001:db8::2"),
        ]
    );
}

#[tokio::test]
async fn vendor_failure_does_not_block_other_hosts() {
    let api = FakeRewriteApi::with_rules(&[("old.example.com", "10.0.0.9")]);
    api.fail_creates_for("flaky.example.com", Injected::Transient);
    let reconciler = reconciler(&api);

    let changes = ChangeSet {
        create: vec![
            a("flaky.example.com", &["10.0.0.1", "10.0.0.2"]),
            a("fine.example.com", &["10.0.0.3"]),
        ],
        delete: vec![a("old.example.com", &["10.0.0.9"])],
        ..Default::default()
    };

    let failures = apply_failures(assert_err!(reconciler.apply_changes(changes).await));

    assert_eq!(failures.len(), 2, "both flaky targets are reported");
    assert_eq!(failures.count_kind("transient"), 2);
    let subjects: Vec<_> = failures.iter().map(|f| f.subject.as_str()).collect();
    assert!(subjects.contains(&"create flaky.example.com -> 10.0.0.1"));
    assert!(subjects.contains(&"create flaky.example.com -> 10.0.0.2"));

    assert_eq!(api.rule_pairs(), vec![pair("fine.example.com", "10.0.0.3")]);
}

#[tokio::test]
async fn validation_and_vendor_failures_are_reported_together() {
    let api = FakeRewriteApi::new();
    api.fail_creates_for("denied.example.com", Injected::Auth);
    let reconciler = reconciler(&api);

    let changes = ChangeSet {
        create: vec![
            a("denied.example.com", &["10.0.0.1"]),
            cname("multi.example.com", "x.example.com"),
            a("bad.example.com", &["not-an-ip.example.com"]),
        ],
        ..Default::default()
    };

    let failures = apply_failures(assert_err!(reconciler.apply_changes(changes).await));

    assert_eq!(failures.len(), 2);
    assert_eq!(failures.count_kind("validation"), 1);
    assert_eq!(failures.count_kind("authentication"), 1);
    assert_eq!(api.rule_pairs(), vec![pair("multi.example.com", "x.example.com")]);
}

#[tokio::test]
async fn listing_failure_propagates_as_is() {
    let api = FakeRewriteApi::new();
    api.fail_list_with(Injected::Auth);
    let reconciler = reconciler(&api);

    let changes = ChangeSet {
        create: vec![a("one.example.com", &["10.0.0.1"])],
        ..Default::default()
    };

    let err = assert_err!(reconciler.apply_changes(changes).await);
    assert!(matches!(err, Error::Authentication(_)));
    assert_eq!(api.create_calls(), 0);

    let err = assert_err!(reconciler.records().await);
    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn listing_failure_is_aggregated_with_validation_failures() {
    let api = FakeRewriteApi::new();
    api.fail_list_with(Injected::Transient);
    let reconciler = reconciler(&api);

    let changes = ChangeSet {
        create: vec![a("one.example.com", &["10.0.0.1"]), txt("one.example.com", "owner")],
        ..Default::default()
    };

    let failures = apply_failures(assert_err!(reconciler.apply_changes(changes).await));

    assert_eq!(failures.count_kind("validation"), 1);
    assert_eq!(failures.count_kind("transient"), 1);
    assert!(failures.iter().any(|f| f.subject == "list rewrite rules"));
}

#[tokio::test]
async fn failed_delete_of_one_duplicate_still_deletes_the_rest() {
    let api = FakeRewriteApi::new();
    let stuck = api.insert("dup.example.com", "10.0.0.1");
    let other = api.insert("dup.example.com", "10.0.0.1");
    api.fail_deletes_for(&stuck, Injected::Transient);
    let reconciler = reconciler(&api);

    let changes = ChangeSet {
        delete: vec![a("dup.example.com", &["10.0.0.1"])],
        ..Default::default()
    };

    let failures = apply_failures(assert_err!(reconciler.apply_changes(changes).await));

    assert_eq!(failures.len(), 1);
    assert_eq!(failures.count_kind("transient"), 1);
    assert_eq!(api.deleted(), vec![stuck.clone(), other]);
    let remaining: Vec<_> = api.rules().into_iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec![stuck]);
}
