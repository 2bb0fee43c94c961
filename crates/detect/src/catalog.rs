// SPDX-License-Identifier: MIT

//! The built-in pack catalog. Static for the process lifetime.

use serde_json::json;
use tw_core::{
    Detection, DetectionPack, DetectionRule, LogSource, PackCategory, RuleStatus, Selection,
    Severity,
};

/// Process-lifetime set of detection packs shipped with the binary.
pub struct PackCatalog {
    packs: Vec<DetectionPack>,
}

impl Default for PackCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PackCatalog {
    pub fn new() -> Self {
        Self {
            packs: vec![
                startup_reliability(),
                auth_security(),
                database_health(),
                payment_billing(),
            ],
        }
    }

    /// All packs, in catalog order.
    pub fn list_packs(&self) -> &[DetectionPack] {
        &self.packs
    }

    pub fn get_pack_by_id(&self, pack_id: &str) -> Option<&DetectionPack> {
        self.packs.iter().find(|p| p.id == pack_id)
    }
}

fn selection(pairs: &[(&str, serde_json::Value)]) -> Selection {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn rule(
    id: &str,
    name: &str,
    description: &str,
    detection: Detection,
    severity: Severity,
) -> DetectionRule {
    DetectionRule {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        logsource: LogSource::default(),
        detection,
        severity,
        status: RuleStatus::Stable,
        tags: Vec::new(),
        references: Vec::new(),
    }
}

fn startup_reliability() -> DetectionPack {
    let mut rules = vec![
        rule(
            "critical-errors",
            "Critical errors",
            "Any log at critical level.",
            Detection::single(selection(&[("level", json!("critical"))])),
            Severity::Critical,
        ),
        rule(
            "oom-crashes",
            "Out-of-memory crashes",
            "Process ran out of heap or was OOM-killed.",
            Detection::single(selection(&[(
                "message|contains",
                json!(["OOM", "out of memory", "heap space", "oom-killed"]),
            )])),
            Severity::Critical,
        ),
        rule(
            "high-error-rate",
            "Error-level logs",
            "Any log at error level; thresholding happens downstream.",
            Detection::single(selection(&[("level", json!("error"))])),
            Severity::High,
        ),
        rule(
            "unhandled-exceptions",
            "Unhandled exceptions",
            "Crash signatures from unhandled exceptions and panics.",
            Detection::single(selection(&[(
                "message|contains",
                json!(["unhandled exception", "panicked at", "uncaught error"]),
            )])),
            Severity::High,
        ),
    ];
    let mut legacy = rule(
        "legacy-error-spike",
        "Error spike (legacy)",
        "Superseded by high-error-rate; kept for existing activations.",
        Detection::single(selection(&[("level", json!("error"))])),
        Severity::Medium,
    );
    legacy.status = RuleStatus::Deprecated;
    rules.push(legacy);

    DetectionPack {
        id: "startup-reliability".to_string(),
        name: "Startup Reliability".to_string(),
        description: "Crashes, OOMs, and error bursts that page a small team.".to_string(),
        category: PackCategory::Reliability,
        icon: "rocket".to_string(),
        author: "Tidewatch".to_string(),
        version: "1.2.0".to_string(),
        rules,
    }
}

fn auth_security() -> DetectionPack {
    let mut failed_login_selections = indexmap::IndexMap::new();
    failed_login_selections.insert(
        "sel_message".to_string(),
        selection(&[(
            "message|contains",
            json!(["failed login", "authentication failed", "invalid credentials"]),
        )]),
    );
    failed_login_selections.insert(
        "sel_level".to_string(),
        selection(&[("level", json!(["warn", "error", "critical"]))]),
    );

    let mut failed_login = rule(
        "failed-login-attempts",
        "Failed login attempts",
        "Failed authentication attempts against any account.",
        Detection {
            selections: failed_login_selections,
            condition: "sel_message and sel_level".to_string(),
        },
        Severity::Medium,
    );
    failed_login.logsource = LogSource::service("auth");

    DetectionPack {
        id: "auth-security".to_string(),
        name: "Auth & Security".to_string(),
        description: "Authentication abuse and privilege-escalation signals.".to_string(),
        category: PackCategory::Security,
        icon: "shield".to_string(),
        author: "Tidewatch".to_string(),
        version: "1.1.0".to_string(),
        rules: vec![
            failed_login,
            rule(
                "brute-force-attempts",
                "Brute-force attempts",
                "Login rate limiting tripped repeatedly.",
                Detection::single(selection(&[(
                    "message|contains",
                    json!(["too many failed attempts", "login rate limit", "brute force"]),
                )])),
                Severity::High,
            ),
            rule(
                "privilege-escalation",
                "Privilege escalation",
                "Attempts to gain admin rights outside normal flows.",
                Detection::single(selection(&[(
                    "message|contains",
                    json!(["privilege escalation", "sudo: authentication failure", "unauthorized admin"]),
                )])),
                Severity::Critical,
            ),
        ],
    }
}

fn database_health() -> DetectionPack {
    let mut net_selections = indexmap::IndexMap::new();
    net_selections.insert(
        "net_refused".to_string(),
        selection(&[("message|contains", json!(["connection refused", "ECONNREFUSED"]))]),
    );
    net_selections.insert(
        "net_reset".to_string(),
        selection(&[("message|contains", json!(["connection reset", "ECONNRESET"]))]),
    );
    net_selections.insert(
        "net_saturated".to_string(),
        selection(&[("message|contains", json!(["too many connections"]))]),
    );

    DetectionPack {
        id: "database-health".to_string(),
        name: "Database Health".to_string(),
        description: "Connectivity, locking, and capacity problems in the data tier.".to_string(),
        category: PackCategory::Database,
        icon: "database".to_string(),
        author: "Tidewatch".to_string(),
        version: "1.0.1".to_string(),
        rules: vec![
            rule(
                "db-connection-errors",
                "Database connection errors",
                "Connections to the database refused, reset, or saturated.",
                Detection {
                    selections: net_selections,
                    condition: "1 of net_*".to_string(),
                },
                Severity::High,
            ),
            rule(
                "slow-queries",
                "Slow queries",
                "Statements crossing the slow-query threshold.",
                Detection::single(selection(&[(
                    "message|contains",
                    json!(["slow query", "query took"]),
                )])),
                Severity::Medium,
            ),
            rule(
                "deadlock-detected",
                "Deadlocks",
                "Transactions aborted by deadlock detection.",
                Detection::single(selection(&[("message|contains", json!("deadlock"))])),
                Severity::High,
            ),
            rule(
                "pool-exhausted",
                "Connection pool exhausted",
                "Application-side pool starvation.",
                Detection::single(selection(&[(
                    "message|contains",
                    json!(["pool exhausted", "connection pool timeout"]),
                )])),
                Severity::High,
            ),
        ],
    }
}

fn payment_billing() -> DetectionPack {
    DetectionPack {
        id: "payment-billing".to_string(),
        name: "Payment & Billing".to_string(),
        description: "Failed charges and billing integration breakage.".to_string(),
        category: PackCategory::Business,
        icon: "credit-card".to_string(),
        author: "Tidewatch".to_string(),
        version: "1.0.0".to_string(),
        rules: vec![
            rule(
                "payment-failures",
                "Payment failures",
                "Charges declined or payment provider errors.",
                Detection::single(selection(&[(
                    "message|contains",
                    json!(["payment failed", "charge declined", "card declined"]),
                )])),
                Severity::High,
            ),
            rule(
                "chargeback-alerts",
                "Chargebacks",
                "Chargeback notifications from the payment provider.",
                Detection::single(selection(&[("message|contains", json!("chargeback"))])),
                Severity::Medium,
            ),
            rule(
                "billing-webhook-errors",
                "Billing webhook errors",
                "Provider webhooks failing to deliver or verify.",
                Detection::single(selection(&[(
                    "message|contains",
                    json!(["webhook delivery failed", "webhook signature mismatch"]),
                )])),
                Severity::Medium,
            ),
        ],
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
