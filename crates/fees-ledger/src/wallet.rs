//! Wallet ledger
//!
//! Owns every mutation of a tenant's currency and SMS unit balances.
//! Each operation mutates under one write-lock acquisition and appends
//! an audit row whose before/after snapshots bracket exactly that
//! operation.

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use fees_common::money::format_amount;
use fees_common::{CheckoutSession, FeeError, FeeResult, PaymentGateway, PlatformConfig};

use crate::locks::TenantLocks;
use crate::model::{SchoolAccount, TenantId, TransactionKind, WalletTransaction};
use crate::pricing::{SmsPricingBook, SmsQuote};

/// Generate a short uppercase reference like `TOP-9F3A21BC`
pub(crate) fn short_reference(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, hex[..8].to_uppercase())
}

/// The wallet ledger service
pub struct WalletLedger {
    accounts: Arc<RwLock<HashMap<TenantId, SchoolAccount>>>,
    transactions: Arc<RwLock<Vec<WalletTransaction>>>,
    pricing: Arc<SmsPricingBook>,
    gateway: Arc<dyn PaymentGateway>,
    locks: Arc<TenantLocks>,
    config: PlatformConfig,
}

impl WalletLedger {
    pub(crate) fn new(
        accounts: Arc<RwLock<HashMap<TenantId, SchoolAccount>>>,
        pricing: Arc<SmsPricingBook>,
        gateway: Arc<dyn PaymentGateway>,
        locks: Arc<TenantLocks>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            accounts,
            transactions: Arc::new(RwLock::new(Vec::new())),
            pricing,
            gateway,
            locks,
            config,
        }
    }

    /// Credit the wallet. Requires the configured minimum amount.
    pub fn top_up(
        &self,
        tenant: TenantId,
        amount: Decimal,
        method: &str,
        reference: Option<String>,
    ) -> FeeResult<WalletTransaction> {
        if amount < self.config.min_topup {
            return Err(FeeError::Validation(format!(
                "minimum top-up is {}",
                format_amount(&self.config.currency, self.config.min_topup)
            )));
        }

        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&tenant)
            .ok_or_else(|| FeeError::NotFound(format!("school {tenant}")))?;

        let balance_before = account.wallet_balance;
        account.wallet_balance += amount;

        let row = WalletTransaction {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            kind: TransactionKind::TopUp,
            amount: Some(amount),
            sms_units: None,
            description: format!("Wallet top-up via {method}"),
            method: Some(method.to_string()),
            reference: Some(reference.unwrap_or_else(|| short_reference("TOP"))),
            balance_before,
            balance_after: account.wallet_balance,
            sms_balance_before: account.sms_balance,
            sms_balance_after: account.sms_balance,
            created_at: Utc::now(),
        };

        info!(tenant = %tenant, amount = %amount, "wallet topped up");
        self.transactions.write().push(row.clone());
        Ok(row)
    }

    /// Convert wallet currency into SMS units at the quoted price
    pub fn purchase_sms(&self, tenant: TenantId, units: u32) -> FeeResult<WalletTransaction> {
        if units < self.config.min_sms_purchase {
            return Err(FeeError::Validation(format!(
                "minimum purchase is {} SMS units",
                self.config.min_sms_purchase
            )));
        }

        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&tenant)
            .ok_or_else(|| FeeError::NotFound(format!("school {tenant}")))?;

        // Quoted under the account lock so a pricing activation cannot
        // slip between the quote and the debit it prices.
        let quote = self.pricing.quote(units);

        if account.wallet_balance < quote.final_cost {
            return Err(FeeError::InsufficientFunds {
                required: quote.final_cost,
                available: account.wallet_balance,
            });
        }

        let balance_before = account.wallet_balance;
        let sms_before = account.sms_balance;
        account.wallet_balance -= quote.final_cost;
        account.sms_balance += i64::from(units);

        let row = WalletTransaction {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            kind: TransactionKind::SmsPurchase,
            amount: Some(quote.final_cost),
            sms_units: Some(i64::from(units)),
            description: purchase_description(&self.config.currency, &quote),
            method: None,
            reference: Some(short_reference("SMS")),
            balance_before,
            balance_after: account.wallet_balance,
            sms_balance_before: sms_before,
            sms_balance_after: account.sms_balance,
            created_at: Utc::now(),
        };

        info!(tenant = %tenant, units, cost = %quote.final_cost, "sms units purchased");
        self.transactions.write().push(row.clone());
        Ok(row)
    }

    /// Spend SMS units and record the usage in one step. The currency
    /// balance is untouched: sends are pre-paid through the unit
    /// balance.
    pub fn debit_sms_units(
        &self,
        tenant: TenantId,
        count: u32,
        description: &str,
    ) -> FeeResult<WalletTransaction> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&tenant)
            .ok_or_else(|| FeeError::NotFound(format!("school {tenant}")))?;

        let count = i64::from(count);
        if account.sms_balance < count {
            return Err(FeeError::InsufficientSmsBalance {
                required: count,
                available: account.sms_balance,
            });
        }

        let sms_before = account.sms_balance;
        account.sms_balance -= count;

        let row = WalletTransaction {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            kind: TransactionKind::SmsUsage,
            amount: None,
            sms_units: Some(count),
            description: description.to_string(),
            method: None,
            reference: None,
            balance_before: account.wallet_balance,
            balance_after: account.wallet_balance,
            sms_balance_before: sms_before,
            sms_balance_after: account.sms_balance,
            created_at: Utc::now(),
        };

        self.transactions.write().push(row.clone());
        Ok(row)
    }

    /// Spend a single unit without an audit row. Bulk dispatch consumes
    /// units one per successful send and records the whole batch with
    /// `record_usage` afterwards.
    pub(crate) fn consume_unit(&self, tenant: TenantId) -> FeeResult<()> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&tenant)
            .ok_or_else(|| FeeError::NotFound(format!("school {tenant}")))?;
        if account.sms_balance < 1 {
            return Err(FeeError::InsufficientSmsBalance {
                required: 1,
                available: account.sms_balance,
            });
        }
        account.sms_balance -= 1;
        Ok(())
    }

    /// Append the aggregate audit row for a batch whose units were
    /// already consumed by `consume_unit`.
    pub(crate) fn record_usage(
        &self,
        tenant: TenantId,
        units: i64,
        description: &str,
    ) -> FeeResult<WalletTransaction> {
        let accounts = self.accounts.read();
        let account = accounts
            .get(&tenant)
            .ok_or_else(|| FeeError::NotFound(format!("school {tenant}")))?;

        let row = WalletTransaction {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            kind: TransactionKind::SmsUsage,
            amount: None,
            sms_units: Some(units),
            description: description.to_string(),
            method: None,
            reference: None,
            balance_before: account.wallet_balance,
            balance_after: account.wallet_balance,
            sms_balance_before: account.sms_balance + units,
            sms_balance_after: account.sms_balance,
            created_at: Utc::now(),
        };

        self.transactions.write().push(row.clone());
        Ok(row)
    }

    /// Start a hosted checkout for a wallet top-up
    pub async fn initialize_topup(
        &self,
        tenant: TenantId,
        email: &str,
        amount: Decimal,
    ) -> FeeResult<CheckoutSession> {
        if amount < self.config.min_topup {
            return Err(FeeError::Validation(format!(
                "minimum top-up is {}",
                format_amount(&self.config.currency, self.config.min_topup)
            )));
        }

        let reference = short_reference("TOP");
        let metadata = serde_json::json!({ "tenant_id": tenant });
        self.gateway
            .initialize(email, amount, &reference, None, Some(metadata))
            .await
    }

    /// Verify a checkout with the gateway and credit the wallet when
    /// the provider reports success. Serialized per tenant so a
    /// double-submitted confirmation cannot credit twice concurrently.
    pub async fn confirm_topup(
        &self,
        tenant: TenantId,
        reference: &str,
    ) -> FeeResult<WalletTransaction> {
        let _guard = self.locks.acquire(tenant).await;

        if self.transaction_by_reference(tenant, reference).is_some() {
            return Err(FeeError::Conflict(format!(
                "top-up {reference} already credited"
            )));
        }

        let verification = self.gateway.verify(reference).await?;
        if !verification.is_successful() {
            warn!(tenant = %tenant, reference, status = %verification.status, "top-up verification failed");
            return Err(FeeError::Gateway(format!(
                "transaction {reference} not successful: {}",
                verification.status
            )));
        }

        let method = verification.channel.as_deref().unwrap_or("online");
        self.top_up(tenant, verification.amount, method, Some(reference.to_string()))
    }

    /// Audit trail for a tenant, newest first
    pub fn transactions(&self, tenant: TenantId, limit: usize) -> Vec<WalletTransaction> {
        let log = self.transactions.read();
        let mut rows: Vec<WalletTransaction> = log
            .iter()
            .filter(|t| t.tenant_id == tenant)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        rows
    }

    /// Drop all audit rows owned by a tenant
    pub fn purge_tenant(&self, tenant: TenantId) {
        self.transactions.write().retain(|t| t.tenant_id != tenant);
    }

    /// Currency code amounts are displayed in
    pub(crate) fn currency(&self) -> String {
        self.config.currency.clone()
    }

    fn transaction_by_reference(&self, tenant: TenantId, reference: &str) -> Option<WalletTransaction> {
        self.transactions
            .read()
            .iter()
            .find(|t| t.tenant_id == tenant && t.reference.as_deref() == Some(reference))
            .cloned()
    }
}

fn purchase_description(currency: &str, quote: &SmsQuote) -> String {
    if quote.discount_amount > Decimal::ZERO {
        format!(
            "Purchased {} SMS units (bulk discount: {} saved)",
            quote.units,
            format_amount(currency, quote.discount_amount)
        )
    } else {
        format!("Purchased {} SMS units", quote.units)
    }
}
