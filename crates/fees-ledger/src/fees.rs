//! Fee structure catalog

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use fees_common::{FeeError, FeeResult};

use crate::model::{FeeStructure, TenantId};
use crate::students::StudentDirectory;

/// Details for a new fee structure line
#[derive(Debug, Clone)]
pub struct NewFeeStructure {
    /// Academic year, e.g. "2024/2025"
    pub academic_year: String,
    /// Term, e.g. "Term 1"
    pub term: String,
    /// Fee type, e.g. "Tuition"
    pub fee_type: String,
    /// Amount due
    pub amount: Decimal,
    /// Class level, e.g. "JHS 1" or "All"
    pub level: String,
}

/// Tenant-defined fee structures, unique per
/// (tenant, year, term, fee type, level)
pub struct FeeCatalog {
    structures: Arc<RwLock<HashMap<Uuid, FeeStructure>>>,
}

impl FeeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            structures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a fee structure line
    pub fn create(&self, tenant: TenantId, details: NewFeeStructure) -> FeeResult<FeeStructure> {
        if details.amount <= Decimal::ZERO {
            return Err(FeeError::Validation("fee amount must be positive".into()));
        }

        let mut structures = self.structures.write();
        let duplicate = structures.values().any(|s| {
            s.tenant_id == tenant
                && s.academic_year == details.academic_year
                && s.term == details.term
                && s.fee_type.eq_ignore_ascii_case(&details.fee_type)
                && s.level.eq_ignore_ascii_case(&details.level)
        });
        if duplicate {
            return Err(FeeError::Conflict(format!(
                "fee structure already exists: {} {} {} ({})",
                details.academic_year, details.term, details.fee_type, details.level
            )));
        }

        let structure = FeeStructure {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            academic_year: details.academic_year,
            term: details.term,
            fee_type: details.fee_type,
            amount: details.amount,
            level: details.level,
            created_at: Utc::now(),
        };
        structures.insert(structure.id, structure.clone());
        Ok(structure)
    }

    /// Change the amount on an existing line
    pub fn update_amount(&self, tenant: TenantId, id: Uuid, amount: Decimal) -> FeeResult<FeeStructure> {
        if amount <= Decimal::ZERO {
            return Err(FeeError::Validation("fee amount must be positive".into()));
        }
        let mut structures = self.structures.write();
        let structure = structures
            .get_mut(&id)
            .filter(|s| s.tenant_id == tenant)
            .ok_or_else(|| FeeError::NotFound(format!("fee structure {id}")))?;
        structure.amount = amount;
        Ok(structure.clone())
    }

    /// Delete a line. Refused while any student fee record still
    /// references it.
    pub fn delete(
        &self,
        tenant: TenantId,
        id: Uuid,
        directory: &StudentDirectory,
    ) -> FeeResult<()> {
        let mut structures = self.structures.write();
        if !structures.get(&id).is_some_and(|s| s.tenant_id == tenant) {
            return Err(FeeError::NotFound(format!("fee structure {id}")));
        }
        if directory.references_structure(id) {
            return Err(FeeError::Conflict(
                "fee structure is referenced by student fee records".into(),
            ));
        }
        structures.remove(&id);
        Ok(())
    }

    /// Fetch one line
    pub fn get(&self, tenant: TenantId, id: Uuid) -> FeeResult<FeeStructure> {
        self.structures
            .read()
            .get(&id)
            .filter(|s| s.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| FeeError::NotFound(format!("fee structure {id}")))
    }

    /// All lines for a tenant
    pub fn list(&self, tenant: TenantId) -> Vec<FeeStructure> {
        self.structures
            .read()
            .values()
            .filter(|s| s.tenant_id == tenant)
            .cloned()
            .collect()
    }

    /// Lines matching a (year, term), the set snapshotted at enrolment
    pub fn for_period(&self, tenant: TenantId, year: &str, term: &str) -> Vec<FeeStructure> {
        self.structures
            .read()
            .values()
            .filter(|s| s.tenant_id == tenant && s.academic_year == year && s.term == term)
            .cloned()
            .collect()
    }

    /// Drop all lines owned by a tenant
    pub fn purge_tenant(&self, tenant: TenantId) {
        self.structures.write().retain(|_, s| s.tenant_id != tenant);
    }
}

impl Default for FeeCatalog {
    fn default() -> Self {
        Self::new()
    }
}
