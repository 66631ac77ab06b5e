//! Tenant registry and access guard
//!
//! Every workflow resolves its tenant here first: `authorize` is the
//! single place that enforces the active-subscription rule.

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use fees_common::{FeeError, FeeResult, PlatformConfig};

use crate::model::{SchoolAccount, SubscriptionPlan, SubscriptionStatus, TenantId};

/// Details for registering a new school
#[derive(Debug, Clone)]
pub struct NewSchool {
    /// Display name
    pub name: String,
    /// Unique subdomain
    pub subdomain: String,
    /// Admin contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
    /// Postal address
    pub address: Option<String>,
}

/// Registry of school accounts
pub struct TenantRegistry {
    accounts: Arc<RwLock<HashMap<TenantId, SchoolAccount>>>,
    config: PlatformConfig,
}

impl TenantRegistry {
    /// Create an empty registry
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Register a school on the free trial with the trial SMS grant
    pub fn register(&self, details: NewSchool) -> FeeResult<SchoolAccount> {
        let mut accounts = self.accounts.write();

        if accounts
            .values()
            .any(|a| a.subdomain.eq_ignore_ascii_case(&details.subdomain))
        {
            return Err(FeeError::Conflict(format!(
                "subdomain already taken: {}",
                details.subdomain
            )));
        }

        let now = Utc::now();
        let account = SchoolAccount {
            id: Uuid::new_v4(),
            name: details.name,
            subdomain: details.subdomain.to_lowercase(),
            email: details.email,
            phone: details.phone,
            address: details.address,
            wallet_balance: rust_decimal::Decimal::ZERO,
            sms_balance: self.config.free_trial_sms,
            sender_id: self.config.default_sender_id.clone(),
            plan: SubscriptionPlan::FreeTrial,
            subscription_status: SubscriptionStatus::Active,
            subscription_start: now,
            subscription_end: now + Duration::days(self.config.free_trial_days),
            is_active: true,
            created_at: now,
        };

        info!(tenant = %account.id, subdomain = %account.subdomain, "school registered");
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    /// Resolve a tenant and reject inactive ones. Workflows call this
    /// before touching any other registry.
    pub fn authorize(&self, tenant: TenantId) -> FeeResult<SchoolAccount> {
        let account = self.get(tenant)?;
        if !account.can_transact(Utc::now()) {
            return Err(FeeError::TenantInactive(account.subdomain));
        }
        Ok(account)
    }

    /// Fetch an account without the subscription check
    pub fn get(&self, tenant: TenantId) -> FeeResult<SchoolAccount> {
        self.accounts
            .read()
            .get(&tenant)
            .cloned()
            .ok_or_else(|| FeeError::NotFound(format!("school {tenant}")))
    }

    /// Find an account by subdomain
    pub fn get_by_subdomain(&self, subdomain: &str) -> Option<SchoolAccount> {
        self.accounts
            .read()
            .values()
            .find(|a| a.subdomain.eq_ignore_ascii_case(subdomain))
            .cloned()
    }

    /// Soft-disable a tenant
    pub fn suspend(&self, tenant: TenantId) -> FeeResult<()> {
        self.update(tenant, |a| a.is_active = false)
    }

    /// Re-enable a suspended tenant
    pub fn reactivate(&self, tenant: TenantId) -> FeeResult<()> {
        self.update(tenant, |a| a.is_active = true)
    }

    /// Change the SMS sender id shown to parents
    pub fn set_sender_id(&self, tenant: TenantId, sender_id: &str) -> FeeResult<()> {
        if sender_id.is_empty() || sender_id.len() > 11 {
            return Err(FeeError::Validation(
                "sender id must be 1-11 characters".into(),
            ));
        }
        let sender_id = sender_id.to_string();
        self.update(tenant, move |a| a.sender_id = sender_id)
    }

    /// Move a tenant onto a paid plan for one month
    pub fn change_plan(&self, tenant: TenantId, plan: SubscriptionPlan) -> FeeResult<()> {
        self.update(tenant, move |a| {
            let now = Utc::now();
            a.plan = plan;
            a.subscription_status = SubscriptionStatus::Active;
            a.subscription_start = now;
            a.subscription_end = now + Duration::days(30);
        })
    }

    /// Remove a tenant. Owned rows in the other registries are dropped
    /// by the platform facade, which calls their purge hooks.
    pub fn remove(&self, tenant: TenantId) -> FeeResult<SchoolAccount> {
        self.accounts
            .write()
            .remove(&tenant)
            .ok_or_else(|| FeeError::NotFound(format!("school {tenant}")))
    }

    /// Shared handle to the account map, used by the wallet ledger to
    /// mutate balances under the same lock as the account itself.
    pub(crate) fn accounts(&self) -> Arc<RwLock<HashMap<TenantId, SchoolAccount>>> {
        Arc::clone(&self.accounts)
    }

    fn update<F: FnOnce(&mut SchoolAccount)>(&self, tenant: TenantId, f: F) -> FeeResult<()> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&tenant)
            .ok_or_else(|| FeeError::NotFound(format!("school {tenant}")))?;
        f(account);
        Ok(())
    }
}
