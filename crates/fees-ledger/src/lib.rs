//! School Fees Ledger
//!
//! Multi-tenant fee management: each school is a tenant with a prepaid
//! wallet that funds SMS messaging to parents, a student directory with
//! fee snapshots, and an append-only payment and audit trail.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         FEE PLATFORM                                │
//! │                                                                     │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │                     TENANT REGISTRY                          │  │
//! │  │   Register ─► Authorize ─► every workflow below              │  │
//! │  └──────────────────────────────────────────────────────────────┘  │
//! │                                                                     │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌─────────────┐  │
//! │  │   Wallet   │  │  Pricing   │  │    Fee     │  │   Student   │  │
//! │  │   Ledger   │  │    Book    │  │  Catalog   │  │  Directory  │  │
//! │  └────────────┘  └────────────┘  └────────────┘  └─────────────┘  │
//! │                                                                     │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────┐   │
//! │  │       PAYMENT DESK       │  │       SMS DISPATCHER          │   │
//! │  │  Record ─► SMS receipt   │  │  Single | Bulk campaigns      │   │
//! │  └──────────────────────────┘  └──────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod fees;
mod locks;
pub mod model;
pub mod payments;
pub mod pricing;
pub mod registry;
pub mod sms;
pub mod students;
pub mod wallet;

use std::sync::Arc;

use fees_common::{FeeResult, PaymentGateway, PlatformConfig, ResetCodeStore, SmsGateway};

pub use fees::{FeeCatalog, NewFeeStructure};
pub use model::{
    FeeStatus, FeeStructure, Payment, SchoolAccount, SmsLog, SmsPricing, SmsStatus, Student,
    StudentFeeRecord, SubscriptionPlan, SubscriptionStatus, TenantId, TransactionKind,
    WalletTransaction,
};
pub use payments::{NewPayment, PaymentDesk, PaymentRecorded, ReceiptOutcome};
pub use pricing::{NewSmsPricing, SmsPricingBook, SmsQuote};
pub use registry::{NewSchool, TenantRegistry};
pub use sms::{BulkSendDetail, BulkSmsReport, RecipientSelection, SmsDispatcher};
pub use students::{NewStudent, StudentDirectory, StudentFilter};
pub use wallet::WalletLedger;

use locks::TenantLocks;

/// Fee Platform
pub struct FeePlatform {
    /// Tenant registry and access guard
    pub registry: Arc<TenantRegistry>,
    /// SMS pricing book
    pub pricing: Arc<SmsPricingBook>,
    /// Wallet and SMS unit ledger
    pub wallet: Arc<WalletLedger>,
    /// Fee structure catalog
    pub fees: Arc<FeeCatalog>,
    /// Student directory
    pub students: Arc<StudentDirectory>,
    /// Payment recording
    pub payments: Arc<PaymentDesk>,
    /// SMS dispatch
    pub sms: Arc<SmsDispatcher>,
    /// Password reset codes
    pub reset_codes: Arc<ResetCodeStore>,
}

impl FeePlatform {
    /// Wire the platform around the provider clients
    pub fn new(
        config: PlatformConfig,
        sms_gateway: Arc<dyn SmsGateway>,
        payment_gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let locks = Arc::new(TenantLocks::new());
        let registry = Arc::new(TenantRegistry::new(config.clone()));
        let pricing = Arc::new(SmsPricingBook::new(&config));
        let wallet = Arc::new(WalletLedger::new(
            registry.accounts(),
            Arc::clone(&pricing),
            payment_gateway,
            Arc::clone(&locks),
            config.clone(),
        ));
        let fees = Arc::new(FeeCatalog::new());
        let students = Arc::new(StudentDirectory::new());
        let sms = Arc::new(SmsDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&students),
            Arc::clone(&wallet),
            sms_gateway,
            locks,
        ));
        let payments = Arc::new(PaymentDesk::new(
            Arc::clone(&registry),
            Arc::clone(&students),
            Arc::clone(&sms),
        ));
        let reset_codes = Arc::new(ResetCodeStore::new(config.reset_code_ttl()));

        Self {
            registry,
            pricing,
            wallet,
            fees,
            students,
            payments,
            sms,
            reset_codes,
        }
    }

    /// Remove a school and every row it owns
    pub fn delete_school(&self, tenant: TenantId) -> FeeResult<SchoolAccount> {
        let account = self.registry.remove(tenant)?;
        self.students.purge_tenant(tenant);
        self.fees.purge_tenant(tenant);
        self.payments.purge_tenant(tenant);
        self.sms.purge_tenant(tenant);
        self.wallet.purge_tenant(tenant);
        Ok(account)
    }
}
