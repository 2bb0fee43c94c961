// SPDX-License-Identifier: MIT

//! The rule evaluator: activated packs against a batch of logs.
//!
//! Rules compile once per tenant (logsource + parsed condition + effective
//! severity) and are cached until a pack activation changes. Evaluation is
//! CPU-bound: the only await is the activation load on a cache miss.

use crate::catalog::PackCatalog;
use crate::condition::ConditionAst;
use crate::matcher::{logsource_matches, selection_matches};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tw_core::{
    excerpt, Clock, DetectionEvent, DetectionEventId, DetectionRule, LogRecord, Severity,
    TenantId,
};
use tw_storage::{ActivationStore, StorageError};

/// One rule ready for evaluation under a tenant's activation.
struct CompiledRule {
    pack_id: String,
    rule: DetectionRule,
    ast: ConditionAst,
    effective_severity: Severity,
}

/// Evaluates active detection rules. One instance per process.
pub struct RuleEvaluator<C: Clock> {
    catalog: Arc<PackCatalog>,
    activations: Arc<dyn ActivationStore>,
    clock: C,
    cache: RwLock<HashMap<String, Arc<Vec<CompiledRule>>>>,
    /// (tenant, rule) pairs whose expression problems were already logged.
    reported: Mutex<HashSet<(String, String)>>,
}

impl<C: Clock> RuleEvaluator<C> {
    pub fn new(catalog: Arc<PackCatalog>, activations: Arc<dyn ActivationStore>, clock: C) -> Self {
        Self {
            catalog,
            activations,
            clock,
            cache: RwLock::new(HashMap::new()),
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Drop the compiled-rule cache for a tenant. Called on every pack
    /// activation change.
    pub fn invalidate(&self, tenant: &TenantId) {
        self.cache.write().remove(tenant.as_str());
    }

    /// Log an expression problem once per (tenant, rule).
    fn report_once(&self, tenant: &TenantId, rule_id: &str, problem: &str) {
        let key = (tenant.as_str().to_string(), rule_id.to_string());
        if self.reported.lock().insert(key) {
            tracing::warn!(tenant = %tenant, rule = rule_id, problem, "detection rule skipped");
        }
    }

    async fn rules_for(&self, tenant: &TenantId) -> Result<Arc<Vec<CompiledRule>>, StorageError> {
        if let Some(compiled) = self.cache.read().get(tenant.as_str()) {
            return Ok(Arc::clone(compiled));
        }

        let activations = self.activations.list_enabled(tenant).await?;
        let by_pack: HashMap<&str, _> =
            activations.iter().map(|a| (a.pack_id.as_str(), a)).collect();

        let mut compiled = Vec::new();
        // Catalog order defines evaluation order across packs.
        for pack in self.catalog.list_packs() {
            let Some(activation) = by_pack.get(pack.id.as_str()) else {
                continue;
            };
            for rule in &pack.rules {
                if !rule.status.is_evaluable() {
                    continue;
                }
                let ast = match ConditionAst::parse(&rule.detection.condition) {
                    Ok(ast) => ast,
                    Err(err) => {
                        self.report_once(tenant, &rule.id, &err.to_string());
                        continue;
                    }
                };
                compiled.push(CompiledRule {
                    pack_id: pack.id.clone(),
                    rule: rule.clone(),
                    ast,
                    effective_severity: activation.effective_severity(rule),
                });
            }
        }

        let compiled = Arc::new(compiled);
        self.cache
            .write()
            .insert(tenant.as_str().to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Evaluate all active rules against a batch of logs.
    ///
    /// Events come out in batch order, then pack order, then rule order
    /// within the pack, matching the order they reach the correlator.
    pub async fn evaluate(
        &self,
        tenant: &TenantId,
        logs: &[LogRecord],
    ) -> Result<Vec<DetectionEvent>, StorageError> {
        let compiled = self.rules_for(tenant).await?;
        if compiled.is_empty() {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for log in logs {
            for entry in compiled.iter() {
                if !logsource_matches(&entry.rule.logsource, log) {
                    continue;
                }

                let results: IndexMap<String, bool> = entry
                    .rule
                    .detection
                    .selections
                    .iter()
                    .map(|(name, sel)| (name.clone(), selection_matches(sel, log)))
                    .collect();

                let mut on_unknown = |atom: &str| {
                    self.report_once(
                        tenant,
                        &entry.rule.id,
                        &format!("condition references unknown selection {atom:?}"),
                    );
                };
                if !entry.ast.evaluate(&results, &mut on_unknown) {
                    continue;
                }

                events.push(DetectionEvent {
                    id: DetectionEventId::generate(),
                    tenant_id: log.tenant_id.clone(),
                    project_id: log.project_id.clone(),
                    rule_id: entry.rule.id.clone(),
                    pack_id: entry.pack_id.clone(),
                    log_id: log.id.clone(),
                    severity: entry.effective_severity,
                    timestamp: self.clock.now(),
                    excerpt: excerpt(&log.message),
                });
            }
        }

        if !events.is_empty() {
            tracing::debug!(tenant = %tenant, events = events.len(), "detections emitted");
        }
        Ok(events)
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
