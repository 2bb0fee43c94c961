// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    instance_suffix = { "failed-login-attempts-2", "failed-login-attempts" },
    plain = { "critical-errors", "critical-errors" },
    non_numeric_tail = { "oom-crashes", "oom-crashes" },
    multi_digit = { "slow-queries-17", "slow-queries" },
    bare = { "deadlock", "deadlock" },
)]
fn family_strips_numeric_instance_suffix(rule_id: &str, family: &str) {
    assert_eq!(rule_family(rule_id), family);
}

#[parameterized(
    experimental = { RuleStatus::Experimental, true },
    test = { RuleStatus::Test, true },
    stable = { RuleStatus::Stable, true },
    deprecated = { RuleStatus::Deprecated, false },
    unsupported = { RuleStatus::Unsupported, false },
)]
fn evaluable_statuses(status: RuleStatus, evaluable: bool) {
    assert_eq!(status.is_evaluable(), evaluable);
}

#[test]
fn logsource_wildcard() {
    assert!(LogSource::default().is_wildcard());
    assert!(!LogSource::service("auth").is_wildcard());
}

#[test]
fn single_detection_names_the_selection() {
    let mut sel = Selection::new();
    sel.insert("level".to_string(), json!("error"));
    let det = Detection::single(sel);
    assert_eq!(det.condition, "selection");
    assert!(det.selections.contains_key("selection"));
}

#[test]
fn selection_order_is_preserved() {
    let mut selections = IndexMap::new();
    for name in ["sel_c", "sel_a", "sel_b"] {
        selections.insert(name.to_string(), Selection::new());
    }
    let det = Detection { selections, condition: "1 of sel_*".to_string() };
    let names: Vec<_> = det.selections.keys().map(String::as_str).collect();
    assert_eq!(names, ["sel_c", "sel_a", "sel_b"]);
}
