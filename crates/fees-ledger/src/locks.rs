//! Per-tenant serialization
//!
//! Single ledger mutations are atomic under the registry write lock,
//! but workflows that span gateway awaits (bulk SMS, checkout
//! confirmation) must not interleave for the same tenant. Each tenant
//! gets one async mutex, held for the whole workflow.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::TenantId;

#[derive(Default)]
pub(crate) struct TenantLocks {
    locks: DashMap<TenantId, Arc<Mutex<()>>>,
}

impl TenantLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(&self, tenant: TenantId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(tenant)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
