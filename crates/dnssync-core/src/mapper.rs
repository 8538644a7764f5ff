//! Translation between vendor rewrite rules and orchestrator endpoints
//!
//! The vendor stores one rule per (hostname, target) pair and has no notion
//! of record type or TTL; the orchestrator works with one endpoint per
//! (name, type) carrying many targets. Rules are grouped by normalized
//! hostname and by the type inferred from the target, so a dual-stack host
//! yields one A and one AAAA endpoint.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::endpoint::{Endpoint, RecordType};
use crate::traits::{NewRewriteRule, RewriteRule};

/// Infer the record type a rewrite target stands for
///
/// IPv4 literal → A, IPv6 literal → AAAA, anything else → CNAME.
pub fn infer_record_type(target: &str) -> RecordType {
    match target.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => RecordType::A,
        Ok(IpAddr::V6(_)) => RecordType::Aaaa,
        Err(_) => RecordType::Cname,
    }
}

/// Lowercase a hostname and strip the trailing root dot
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Canonical form of a target used for comparisons
///
/// IP literals are re-rendered so equivalent spellings of the same IPv6
/// address compare equal; hostnames are normalized like [`normalize_hostname`].
pub fn normalize_target(target: &str) -> String {
    match target.trim().parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => normalize_hostname(target),
    }
}

/// Group vendor rules into endpoints
pub fn to_endpoints(rules: &[RewriteRule]) -> Vec<Endpoint> {
    let mut endpoints: Vec<Endpoint> = Vec::new();
    let mut index: HashMap<(String, RecordType), usize> = HashMap::new();
    let mut seen: HashMap<usize, Vec<String>> = HashMap::new();

    for rule in rules {
        let hostname = normalize_hostname(&rule.hostname);
        let record_type = infer_record_type(&rule.target);
        let target = rule.target.trim().to_string();

        let slot = *index
            .entry((hostname.clone(), record_type.clone()))
            .or_insert_with(|| {
                endpoints.push(Endpoint::new(hostname, record_type, Vec::<String>::new()));
                endpoints.len() - 1
            });

        let key = normalize_target(&target);
        let seen_targets = seen.entry(slot).or_default();
        if !seen_targets.contains(&key) {
            seen_targets.push(key);
            endpoints[slot].targets.push(target);
        }
    }

    endpoints
}

/// Expand an endpoint into one rule per target
pub fn to_vendor_rules(endpoint: &Endpoint) -> Vec<NewRewriteRule> {
    let hostname = normalize_hostname(&endpoint.dns_name);
    endpoint
        .targets
        .iter()
        .map(|target| NewRewriteRule::new(hostname.clone(), target.trim()))
        .collect()
}

/// Key identifying a rule by content rather than by id
pub fn rule_key(hostname: &str, target: &str) -> (String, String) {
    (normalize_hostname(hostname), normalize_target(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn target_set(endpoint: &Endpoint) -> BTreeSet<String> {
        endpoint.targets.iter().map(|t| normalize_target(t)).collect()
    }

    fn materialize(rules: Vec<NewRewriteRule>) -> Vec<RewriteRule> {
        rules
            .into_iter()
            .enumerate()
            .map(|(i, r)| RewriteRule::new(format!("id-{}", i), r.hostname, r.target))
            .collect()
    }

    #[test]
    fn test_infer_record_type() {
        assert_eq!(infer_record_type("192.168.1.10"), RecordType::A);
        assert_eq!(infer_record_type("2001:db8::1"), RecordType::Aaaa);
        assert_eq!(infer_record_type("target.example.com"), RecordType::Cname);
        assert_eq!(infer_record_type("1.2.3"), RecordType::Cname);
    }

    #[test]
    fn test_groups_targets_by_hostname_and_type() {
        let rules = vec![
            RewriteRule::new("1", "www.example.com", "1.1.1.1"),
            RewriteRule::new("2", "www.example.com", "2.2.2.2"),
            RewriteRule::new("3", "WWW.example.com.", "2001:db8::1"),
            RewriteRule::new("4", "alias.example.com", "www.example.com"),
        ];

        let endpoints = to_endpoints(&rules);
        assert_eq!(endpoints.len(), 3);

        assert_eq!(endpoints[0].dns_name, "www.example.com");
        assert_eq!(endpoints[0].record_type, RecordType::A);
        assert_eq!(endpoints[0].targets, vec!["1.1.1.1", "2.2.2.2"]);
        assert_eq!(endpoints[0].record_ttl, None);

        assert_eq!(endpoints[1].dns_name, "www.example.com");
        assert_eq!(endpoints[1].record_type, RecordType::Aaaa);

        assert_eq!(endpoints[2].record_type, RecordType::Cname);
        assert_eq!(endpoints[2].targets, vec!["www.example.com"]);
    }

    #[test]
    fn test_duplicate_rules_collapse_into_one_target() {
        let rules = vec![
            RewriteRule::new("1", "v6.example.com", "2001:db8::1"),
            RewriteRule::new("2", "v6.example.com", "2001:0db8:0:0::1"),
        ];

        let endpoints = to_endpoints(&rules);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].targets.len(), 1);
    }

    #[test]
    fn test_one_rule_per_target() {
        let endpoint = Endpoint::new("www.example.com", RecordType::A, ["1.1.1.1", "2.2.2.2"]);
        let rules = to_vendor_rules(&endpoint);

        assert_eq!(
            rules,
            vec![
                NewRewriteRule::new("www.example.com", "1.1.1.1"),
                NewRewriteRule::new("www.example.com", "2.2.2.2"),
            ]
        );
    }

    #[test]
    fn test_round_trip_preserves_name_type_and_targets() {
        let cases = vec![
            Endpoint::new("a.example.com", RecordType::A, ["10.0.0.2", "10.0.0.1"]).with_ttl(300),
            Endpoint::new("aaaa.example.com", RecordType::Aaaa, ["2001:db8::1", "2001:db8::2"]),
            Endpoint::new("c.example.com", RecordType::Cname, ["target.example.net"]),
        ];

        for original in cases {
            let endpoints = to_endpoints(&materialize(to_vendor_rules(&original)));

            assert_eq!(endpoints.len(), 1, "round trip of {}", original);
            let round_tripped = &endpoints[0];
            assert_eq!(round_tripped.dns_name, original.dns_name);
            assert_eq!(round_tripped.record_type, original.record_type);
            assert_eq!(target_set(round_tripped), target_set(&original));
            assert_eq!(round_tripped.record_ttl, None);
        }
    }

    #[test]
    fn test_rule_key_normalizes_both_sides() {
        assert_eq!(
            rule_key("Host.Example.com.", "2001:DB8::0:1"),
            rule_key("host.example.com", "2001:db8::1")
        );
        assert_ne!(
            rule_key("host.example.com", "1.1.1.1"),
            rule_key("host.example.com", "1.1.1.2")
        );
    }
}
