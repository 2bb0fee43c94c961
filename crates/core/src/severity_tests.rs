// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[parameterized(
    informational = { Severity::Informational, 1 },
    low = { Severity::Low, 2 },
    medium = { Severity::Medium, 3 },
    high = { Severity::High, 4 },
    critical = { Severity::Critical, 5 },
)]
fn severity_weights(severity: Severity, weight: u8) {
    assert_eq!(severity.weight(), weight);
}

#[test]
fn order_follows_weight() {
    let mut all = [
        Severity::High,
        Severity::Informational,
        Severity::Critical,
        Severity::Low,
        Severity::Medium,
    ];
    all.sort();
    assert_eq!(
        all,
        [
            Severity::Informational,
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ]
    );
}

#[test]
fn max_picks_heavier_severity() {
    assert_eq!(Severity::High.max(Severity::Critical), Severity::Critical);
    assert_eq!(Severity::Medium.max(Severity::Low), Severity::Medium);
}

#[test]
fn parse_and_display_roundtrip() {
    for s in ["informational", "low", "medium", "high", "critical"] {
        let sev: Severity = s.parse().unwrap();
        assert_eq!(sev.to_string(), s);
    }
    assert!("severe".parse::<Severity>().is_err());
}
