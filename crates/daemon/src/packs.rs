// SPDX-License-Identifier: MIT

//! Tenant-facing pack administration.
//!
//! Every mutation writes the activation store and invalidates the
//! evaluator's compiled-rule cache for the tenant.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tw_core::{Clock, DetectionPack, PackActivation, RuleOverride, TenantId};
use tw_detect::{PackCatalog, RuleEvaluator};
use tw_storage::{ActivationStore, StorageError};

/// One catalog pack plus the tenant's activation state.
#[derive(Debug, Clone)]
pub struct PackStatus {
    pub pack: DetectionPack,
    pub enabled: bool,
    pub activation: Option<PackActivation>,
}

/// Options accepted on enable.
#[derive(Debug, Clone, Default)]
pub struct EnableOptions {
    pub thresholds: HashMap<String, RuleOverride>,
    pub email_recipients: Vec<String>,
    pub webhook_url: Option<String>,
}

/// Pack administration failures.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("unknown pack: {0:?}")]
    UnknownPack(String),

    #[error("pack {pack:?} has no rule {rule:?}")]
    UnknownRule { pack: String, rule: String },

    #[error("pack {0:?} is not activated for this tenant")]
    NotActivated(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Admin surface over the catalog and activation store.
pub struct PackService<C: Clock> {
    catalog: Arc<PackCatalog>,
    activations: Arc<dyn ActivationStore>,
    evaluator: Arc<RuleEvaluator<C>>,
    clock: C,
}

impl<C: Clock> PackService<C> {
    pub fn new(
        catalog: Arc<PackCatalog>,
        activations: Arc<dyn ActivationStore>,
        evaluator: Arc<RuleEvaluator<C>>,
        clock: C,
    ) -> Self {
        Self { catalog, activations, evaluator, clock }
    }

    /// All packs with the tenant's activation state attached.
    pub async fn list_packs(&self, tenant: &TenantId) -> Result<Vec<PackStatus>, PackError> {
        let mut statuses = Vec::new();
        for pack in self.catalog.list_packs() {
            let activation = self.activations.get(tenant, &pack.id).await?;
            statuses.push(PackStatus {
                pack: pack.clone(),
                enabled: activation.as_ref().map(|a| a.enabled).unwrap_or(false),
                activation,
            });
        }
        Ok(statuses)
    }

    /// Enable a pack, creating or re-enabling its activation.
    pub async fn enable_pack(
        &self,
        tenant: &TenantId,
        pack_id: &str,
        options: EnableOptions,
    ) -> Result<PackActivation, PackError> {
        let pack = self.require_pack(pack_id)?;
        self.validate_thresholds(pack, &options.thresholds)?;

        let now = self.clock.now();
        let mut activation = match self.activations.get(tenant, pack_id).await? {
            Some(mut existing) => {
                existing.enabled = true;
                existing.updated_at = now;
                existing
            }
            None => PackActivation::new(tenant.clone(), pack_id, now),
        };
        activation.thresholds = options.thresholds;
        activation.email_recipients = options.email_recipients;
        activation.webhook_url = options.webhook_url;

        self.activations.upsert(&activation).await?;
        self.evaluator.invalidate(tenant);
        tracing::info!(tenant = %tenant, pack = pack_id, "pack enabled");
        Ok(activation)
    }

    /// Disable a pack. Suppresses all rule evaluation from it.
    pub async fn disable_pack(&self, tenant: &TenantId, pack_id: &str) -> Result<(), PackError> {
        self.require_pack(pack_id)?;
        let mut activation = self
            .activations
            .get(tenant, pack_id)
            .await?
            .ok_or_else(|| PackError::NotActivated(pack_id.to_string()))?;
        activation.enabled = false;
        activation.updated_at = self.clock.now();
        self.activations.upsert(&activation).await?;
        self.evaluator.invalidate(tenant);
        tracing::info!(tenant = %tenant, pack = pack_id, "pack disabled");
        Ok(())
    }

    /// Replace per-rule threshold overrides on an active pack.
    pub async fn update_thresholds(
        &self,
        tenant: &TenantId,
        pack_id: &str,
        thresholds: HashMap<String, RuleOverride>,
    ) -> Result<PackActivation, PackError> {
        let pack = self.require_pack(pack_id)?;
        self.validate_thresholds(pack, &thresholds)?;

        let mut activation = self
            .activations
            .get(tenant, pack_id)
            .await?
            .ok_or_else(|| PackError::NotActivated(pack_id.to_string()))?;
        activation.thresholds = thresholds;
        activation.updated_at = self.clock.now();
        self.activations.upsert(&activation).await?;
        self.evaluator.invalidate(tenant);
        Ok(activation)
    }

    fn require_pack(&self, pack_id: &str) -> Result<&DetectionPack, PackError> {
        self.catalog
            .get_pack_by_id(pack_id)
            .ok_or_else(|| PackError::UnknownPack(pack_id.to_string()))
    }

    fn validate_thresholds(
        &self,
        pack: &DetectionPack,
        thresholds: &HashMap<String, RuleOverride>,
    ) -> Result<(), PackError> {
        for rule_id in thresholds.keys() {
            if pack.rule(rule_id).is_none() {
                return Err(PackError::UnknownRule {
                    pack: pack.id.clone(),
                    rule: rule_id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "packs_tests.rs"]
mod tests;
