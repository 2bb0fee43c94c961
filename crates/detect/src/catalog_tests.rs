// SPDX-License-Identifier: MIT

use super::*;
use crate::condition::ConditionAst;
use std::collections::HashSet;

#[test]
fn ships_the_four_packs_in_order() {
    let catalog = PackCatalog::new();
    let ids: Vec<_> = catalog.list_packs().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(
        ids,
        ["startup-reliability", "auth-security", "database-health", "payment-billing"]
    );
}

#[test]
fn lookup_by_id() {
    let catalog = PackCatalog::new();
    assert!(catalog.get_pack_by_id("auth-security").is_some());
    assert!(catalog.get_pack_by_id("nonexistent").is_none());
}

#[test]
fn rule_ids_are_unique_across_the_catalog() {
    let catalog = PackCatalog::new();
    let mut seen = HashSet::new();
    for pack in catalog.list_packs() {
        for rule in &pack.rules {
            assert!(seen.insert(rule.id.clone()), "duplicate rule id {}", rule.id);
        }
    }
}

#[test]
fn every_condition_parses_and_references_real_selections() {
    let catalog = PackCatalog::new();
    for pack in catalog.list_packs() {
        for rule in &pack.rules {
            let ast = ConditionAst::parse(&rule.detection.condition)
                .unwrap_or_else(|e| panic!("rule {}: {e}", rule.id));
            // Evaluating with all-true selections must not hit unknowns.
            let results = rule
                .detection
                .selections
                .keys()
                .map(|k| (k.clone(), true))
                .collect();
            let mut unknowns = Vec::new();
            ast.evaluate(&results, &mut |name: &str| unknowns.push(name.to_string()));
            assert!(unknowns.is_empty(), "rule {}: unknown atoms {unknowns:?}", rule.id);
        }
    }
}

#[test]
fn every_selection_is_non_empty() {
    let catalog = PackCatalog::new();
    for pack in catalog.list_packs() {
        for rule in &pack.rules {
            assert!(!rule.detection.selections.is_empty(), "rule {}", rule.id);
            for (name, sel) in &rule.detection.selections {
                assert!(!sel.is_empty(), "rule {} selection {name}", rule.id);
            }
        }
    }
}

#[test]
fn built_in_rules_carry_expected_severities() {
    let catalog = PackCatalog::new();
    let reliability = catalog.get_pack_by_id("startup-reliability").unwrap();
    assert_eq!(reliability.rule("critical-errors").unwrap().severity, Severity::Critical);
    assert_eq!(reliability.rule("oom-crashes").unwrap().severity, Severity::Critical);
    assert_eq!(reliability.rule("high-error-rate").unwrap().severity, Severity::High);

    let auth = catalog.get_pack_by_id("auth-security").unwrap();
    assert_eq!(auth.rule("failed-login-attempts").unwrap().severity, Severity::Medium);
}

#[test]
fn deprecated_rules_ship_but_are_marked() {
    let catalog = PackCatalog::new();
    let legacy = catalog
        .get_pack_by_id("startup-reliability")
        .unwrap()
        .rule("legacy-error-spike")
        .unwrap();
    assert_eq!(legacy.status, RuleStatus::Deprecated);
    assert!(!legacy.status.is_evaluable());
}
