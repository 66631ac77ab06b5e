//! SMS dispatch
//!
//! Single sends and bulk campaigns to parents. Bulk dispatch holds the
//! tenant's workflow lock across the whole batch so the preflight
//! balance check stays valid while sends are in flight.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use fees_common::money::format_amount;
use fees_common::{FeeError, FeeResult, SmsGateway};

use crate::locks::TenantLocks;
use crate::model::{FeeStatus, SmsLog, SmsStatus, Student, TenantId};
use crate::registry::TenantRegistry;
use crate::students::{StudentDirectory, StudentFilter};
use crate::wallet::WalletLedger;

/// Placeholders a bulk template may use
pub const TEMPLATE_PLACEHOLDERS: [&str; 5] = [
    "student_name",
    "parent_name",
    "balance",
    "total_fees",
    "paid_amount",
];

/// Who a bulk campaign goes to
#[derive(Debug, Clone)]
pub enum RecipientSelection {
    /// Specific students
    Ids(Vec<Uuid>),
    /// Every student in a payment state
    Status(FeeStatus),
    /// Every student of the tenant
    All,
}

/// Per-student outcome of a bulk send
#[derive(Debug, Clone, Serialize)]
pub struct BulkSendDetail {
    /// Student the message was for
    pub student_id: Uuid,
    /// Student name
    pub student_name: String,
    /// Parent number, absent when the student has no contact
    pub recipient: Option<String>,
    /// Whether the provider accepted the message
    pub sent: bool,
    /// Failure reason when not sent
    pub reason: Option<String>,
}

/// Outcome of a bulk campaign
#[derive(Debug, Clone, Serialize)]
pub struct BulkSmsReport {
    /// Students the selection matched
    pub total_attempted: usize,
    /// Messages the provider accepted
    pub sent: usize,
    /// Messages that failed, contact missing included
    pub failed: usize,
    /// Unit balance after the batch
    pub sms_balance_remaining: i64,
    /// Per-student outcomes in selection order
    pub details: Vec<BulkSendDetail>,
}

/// SMS dispatch service
pub struct SmsDispatcher {
    registry: Arc<TenantRegistry>,
    directory: Arc<StudentDirectory>,
    wallet: Arc<WalletLedger>,
    gateway: Arc<dyn SmsGateway>,
    locks: Arc<TenantLocks>,
    logs: Arc<RwLock<Vec<SmsLog>>>,
}

impl SmsDispatcher {
    pub(crate) fn new(
        registry: Arc<TenantRegistry>,
        directory: Arc<StudentDirectory>,
        wallet: Arc<WalletLedger>,
        gateway: Arc<dyn SmsGateway>,
        locks: Arc<TenantLocks>,
    ) -> Self {
        Self {
            registry,
            directory,
            wallet,
            gateway,
            locks,
            logs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Reject templates that use a placeholder outside the supported set
    pub fn validate_template(template: &str) -> FeeResult<()> {
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                FeeError::Validation("unclosed '{' in message template".into())
            })?;
            let name = &after[..close];
            if !TEMPLATE_PLACEHOLDERS.contains(&name) {
                return Err(FeeError::Validation(format!(
                    "unknown placeholder {{{name}}}; supported: {}",
                    TEMPLATE_PLACEHOLDERS
                        .map(|p| format!("{{{p}}}"))
                        .join(", ")
                )));
            }
            rest = &after[close + 1..];
        }
        Ok(())
    }

    fn render(template: &str, student: &Student, currency: &str) -> String {
        template
            .replace("{student_name}", &student.name)
            .replace(
                "{parent_name}",
                student.parent_name.as_deref().unwrap_or("Parent"),
            )
            .replace("{balance}", &format_amount(currency, student.balance))
            .replace("{total_fees}", &format_amount(currency, student.total_fees))
            .replace("{paid_amount}", &format_amount(currency, student.paid_amount))
    }

    /// Send one message. A unit is debited only when the provider
    /// accepts the message; a send blocked by the unit balance leaves
    /// no log row at all.
    pub async fn send_single(
        &self,
        tenant: TenantId,
        recipient: &str,
        message: &str,
    ) -> FeeResult<SmsLog> {
        let _guard = self.locks.acquire(tenant).await;

        let account = self.registry.authorize(tenant)?;
        if account.sms_balance < 1 {
            return Err(FeeError::InsufficientSmsBalance {
                required: 1,
                available: account.sms_balance,
            });
        }

        let delivery = self.gateway.send(recipient, message).await;
        if !delivery.success {
            warn!(tenant = %tenant, recipient, reason = %delivery.detail, "sms send failed");
            self.push_log(
                tenant,
                recipient,
                message,
                SmsStatus::Failed,
                0,
                delivery.raw,
                Some(delivery.detail.clone()),
            );
            return Err(FeeError::Gateway(delivery.detail));
        }

        self.wallet
            .debit_sms_units(tenant, 1, &format!("SMS sent to {recipient}"))?;
        Ok(self.push_log(tenant, recipient, message, SmsStatus::Sent, 1, delivery.raw, None))
    }

    /// Send a personalized campaign to the selected students.
    ///
    /// The template is validated before anything else, the unit balance
    /// must cover the whole selection up front, and exactly one usage
    /// row records the batch after the loop. A student without a parent
    /// contact fails without consuming a unit.
    pub async fn send_bulk(
        &self,
        tenant: TenantId,
        selection: RecipientSelection,
        template: &str,
    ) -> FeeResult<BulkSmsReport> {
        Self::validate_template(template)?;

        let _guard = self.locks.acquire(tenant).await;

        let account = self.registry.authorize(tenant)?;
        let students = self.select(tenant, &selection)?;
        if students.is_empty() {
            return Err(FeeError::NotFound(
                "no students match the selection".into(),
            ));
        }

        let required = students.len() as i64;
        if account.sms_balance < required {
            return Err(FeeError::InsufficientSmsBalance {
                required,
                available: account.sms_balance,
            });
        }

        let currency = self.wallet.currency();
        let mut sent = 0usize;
        let mut failed = 0usize;
        let mut details = Vec::with_capacity(students.len());

        for student in &students {
            let Some(recipient) = student.parent_contact.as_deref() else {
                failed += 1;
                details.push(BulkSendDetail {
                    student_id: student.id,
                    student_name: student.name.clone(),
                    recipient: None,
                    sent: false,
                    reason: Some("No parent contact".into()),
                });
                continue;
            };

            let message = Self::render(template, student, &currency);
            let delivery = self.gateway.send(recipient, &message).await;

            if delivery.success {
                if let Err(e) = self.wallet.consume_unit(tenant) {
                    // Units consumed so far must keep their audit row even
                    // when the batch aborts, or reconciliation breaks.
                    warn!(tenant = %tenant, sent, error = %e, "bulk send aborted mid-batch");
                    self.record_batch_usage(tenant, sent);
                    return Err(e);
                }
                self.push_log(
                    tenant,
                    recipient,
                    &message,
                    SmsStatus::Sent,
                    1,
                    delivery.raw,
                    None,
                );
                sent += 1;
                details.push(BulkSendDetail {
                    student_id: student.id,
                    student_name: student.name.clone(),
                    recipient: Some(recipient.to_string()),
                    sent: true,
                    reason: None,
                });
            } else {
                failed += 1;
                details.push(BulkSendDetail {
                    student_id: student.id,
                    student_name: student.name.clone(),
                    recipient: Some(recipient.to_string()),
                    sent: false,
                    reason: Some(delivery.detail),
                });
            }
        }

        self.record_batch_usage(tenant, sent);

        let remaining = self.registry.get(tenant)?.sms_balance;
        info!(tenant = %tenant, sent, failed, remaining, "bulk sms completed");
        Ok(BulkSmsReport {
            total_attempted: students.len(),
            sent,
            failed,
            sms_balance_remaining: remaining,
            details,
        })
    }

    /// Currency code amounts are rendered in
    pub(crate) fn currency(&self) -> String {
        self.wallet.currency()
    }

    /// Append the aggregate usage row for a batch. Failing here means
    /// the tenant vanished mid-batch; there is no account left to
    /// reconcile against, so the error is logged rather than surfaced.
    fn record_batch_usage(&self, tenant: TenantId, sent: usize) {
        if sent == 0 {
            return;
        }
        if let Err(e) =
            self.wallet
                .record_usage(tenant, sent as i64, &format!("Bulk SMS to {sent} parents"))
        {
            warn!(tenant = %tenant, sent, error = %e, "usage audit write failed");
        }
    }

    /// Dispatch log for a tenant, newest first
    pub fn logs(&self, tenant: TenantId, limit: usize) -> Vec<SmsLog> {
        let log = self.logs.read();
        let mut rows: Vec<SmsLog> = log
            .iter()
            .filter(|l| l.tenant_id == tenant)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        rows
    }

    /// Drop all log rows owned by a tenant
    pub fn purge_tenant(&self, tenant: TenantId) {
        self.logs.write().retain(|l| l.tenant_id != tenant);
    }

    fn select(&self, tenant: TenantId, selection: &RecipientSelection) -> FeeResult<Vec<Student>> {
        Ok(match selection {
            RecipientSelection::All => self.directory.list(tenant, &StudentFilter::default()),
            RecipientSelection::Status(status) => self.directory.list(
                tenant,
                &StudentFilter {
                    status: Some(*status),
                    ..Default::default()
                },
            ),
            RecipientSelection::Ids(ids) => {
                let mut students = Vec::with_capacity(ids.len());
                for id in ids {
                    students.push(self.directory.get(tenant, *id)?);
                }
                students
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn push_log(
        &self,
        tenant: TenantId,
        recipient: &str,
        message: &str,
        status: SmsStatus,
        units_used: i64,
        gateway_response: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> SmsLog {
        let log = SmsLog {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            recipient: recipient.to_string(),
            message: message.to_string(),
            status,
            units_used,
            gateway_response,
            error_message,
            created_at: chrono::Utc::now(),
        };
        self.logs.write().push(log.clone());
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::{FeeCatalog, NewFeeStructure};
    use crate::pricing::SmsPricingBook;
    use crate::registry::NewSchool;
    use crate::students::NewStudent;
    use async_trait::async_trait;
    use fees_common::{
        CheckoutSession, PaymentGateway, PaymentVerification, PlatformConfig, SmsDelivery,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSmsGateway {
        /// Recipients the provider rejects
        reject: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SmsGateway for ScriptedSmsGateway {
        async fn send(&self, recipient: &str, _message: &str) -> SmsDelivery {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject.iter().any(|r| r == recipient) {
                SmsDelivery::failed("DND list rejection", None)
            } else {
                SmsDelivery::sent("0000", Some(serde_json::json!({"code": "0000"})))
            }
        }
    }

    struct NoopPaymentGateway;

    #[async_trait]
    impl PaymentGateway for NoopPaymentGateway {
        async fn initialize(
            &self,
            _email: &str,
            _amount: Decimal,
            _reference: &str,
            _callback_url: Option<&str>,
            _metadata: Option<serde_json::Value>,
        ) -> FeeResult<CheckoutSession> {
            Err(FeeError::Gateway("not wired in tests".into()))
        }

        async fn verify(&self, _reference: &str) -> FeeResult<PaymentVerification> {
            Err(FeeError::Gateway("not wired in tests".into()))
        }
    }

    struct Harness {
        registry: Arc<TenantRegistry>,
        directory: Arc<StudentDirectory>,
        wallet: Arc<WalletLedger>,
        dispatcher: SmsDispatcher,
        tenant: TenantId,
    }

    fn harness(reject: Vec<&str>) -> Harness {
        let config = PlatformConfig::default();
        let registry = Arc::new(TenantRegistry::new(config.clone()));
        let school = registry
            .register(NewSchool {
                name: "Unity Academy".into(),
                subdomain: "unity".into(),
                email: "admin@unity.edu.gh".into(),
                phone: None,
                address: None,
            })
            .unwrap();

        let locks = Arc::new(TenantLocks::new());
        let wallet = Arc::new(WalletLedger::new(
            registry.accounts(),
            Arc::new(SmsPricingBook::new(&config)),
            Arc::new(NoopPaymentGateway),
            Arc::clone(&locks),
            config,
        ));
        let directory = Arc::new(StudentDirectory::new());
        let gateway = Arc::new(ScriptedSmsGateway {
            reject: reject.into_iter().map(String::from).collect(),
            calls: AtomicUsize::new(0),
        });
        let dispatcher = SmsDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            Arc::clone(&wallet),
            gateway,
            locks,
        );

        Harness {
            registry,
            directory,
            wallet,
            dispatcher,
            tenant: school.id,
        }
    }

    fn enroll(h: &Harness, name: &str, contact: Option<&str>) -> Student {
        let catalog = FeeCatalog::new();
        catalog
            .create(
                h.tenant,
                NewFeeStructure {
                    academic_year: "2024/2025".into(),
                    term: "Term 1".into(),
                    fee_type: "Tuition".into(),
                    amount: dec!(300),
                    level: "All".into(),
                },
            )
            .ok();
        h.directory
            .enroll(
                h.tenant,
                NewStudent {
                    name: name.into(),
                    class: "JHS 1".into(),
                    gender: None,
                    date_of_birth: None,
                    parent_name: Some("Kofi Mensah".into()),
                    parent_contact: contact.map(String::from),
                    parent_email: None,
                    academic_year: "2024/2025".into(),
                    term: "Term 1".into(),
                },
                &catalog,
            )
            .unwrap()
    }

    #[test]
    fn test_template_validation() {
        assert!(SmsDispatcher::validate_template(
            "Dear {parent_name}, {student_name} owes {balance}."
        )
        .is_ok());
        assert!(SmsDispatcher::validate_template("No placeholders at all").is_ok());

        let err = SmsDispatcher::validate_template("Hello {parent}").unwrap_err();
        assert!(matches!(err, FeeError::Validation(_)));
        assert!(err.to_string().contains("{parent}"));

        assert!(SmsDispatcher::validate_template("Broken {student_name").is_err());
    }

    #[tokio::test]
    async fn test_single_send_debits_one_unit() {
        let h = harness(vec![]);

        let log = h
            .dispatcher
            .send_single(h.tenant, "0244123456", "Test message")
            .await
            .unwrap();
        assert_eq!(log.status, SmsStatus::Sent);
        assert_eq!(log.units_used, 1);
        assert_eq!(h.registry.get(h.tenant).unwrap().sms_balance, 49);

        // The debit is on the audit trail
        let rows = h.wallet.transactions(h.tenant, 10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sms_units, Some(1));
    }

    #[tokio::test]
    async fn test_failed_send_logs_without_debit() {
        let h = harness(vec!["0244123456"]);

        let err = h
            .dispatcher
            .send_single(h.tenant, "0244123456", "Test message")
            .await
            .unwrap_err();
        assert!(matches!(err, FeeError::Gateway(_)));

        assert_eq!(h.registry.get(h.tenant).unwrap().sms_balance, 50);
        let logs = h.dispatcher.logs(h.tenant, 10);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, SmsStatus::Failed);
        assert_eq!(logs[0].units_used, 0);
        assert!(h.wallet.transactions(h.tenant, 10).is_empty());
    }

    #[tokio::test]
    async fn test_bulk_partial_failures() {
        let h = harness(vec!["0244000002"]);
        enroll(&h, "Ama Mensah", Some("0244000001"));
        enroll(&h, "Yaw Owusu", Some("0244000002"));
        enroll(&h, "Esi Asante", None);
        enroll(&h, "Kwame Boateng", Some("0244000004"));
        enroll(&h, "Abena Sarpong", Some("0244000005"));

        let report = h
            .dispatcher
            .send_bulk(
                h.tenant,
                RecipientSelection::All,
                "Dear {parent_name}, {student_name} owes {balance}.",
            )
            .await
            .unwrap();

        assert_eq!(report.total_attempted, 5);
        assert_eq!(report.sent, 3);
        assert_eq!(report.failed, 2);
        // Only accepted sends consume units
        assert_eq!(report.sms_balance_remaining, 47);

        let missing = report
            .details
            .iter()
            .find(|d| d.student_name == "Esi Asante")
            .unwrap();
        assert_eq!(missing.reason.as_deref(), Some("No parent contact"));
        assert!(missing.recipient.is_none());

        // One aggregate usage row for the whole batch
        let rows = h.wallet.transactions(h.tenant, 10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sms_units, Some(3));
        assert_eq!(rows[0].sms_balance_before, 50);
        assert_eq!(rows[0].sms_balance_after, 47);

        // Only accepted sends leave log rows
        assert_eq!(h.dispatcher.logs(h.tenant, 10).len(), 3);
    }

    #[tokio::test]
    async fn test_bulk_preflight_counts_whole_selection() {
        let h = harness(vec![]);
        for i in 0..5 {
            enroll(&h, &format!("Student {i}"), Some("0244000001"));
        }
        // Burn the balance down to 3
        h.wallet
            .debit_sms_units(h.tenant, 47, "drain for test")
            .unwrap();

        let err = h
            .dispatcher
            .send_bulk(h.tenant, RecipientSelection::All, "Fees are due.")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FeeError::InsufficientSmsBalance {
                required: 5,
                available: 3
            }
        ));
        // Nothing was sent or logged
        assert!(h.dispatcher.logs(h.tenant, 10).is_empty());
        assert_eq!(h.registry.get(h.tenant).unwrap().sms_balance, 3);
    }

    struct DrainingGateway {
        wallet: Arc<WalletLedger>,
        tenant: TenantId,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SmsGateway for DrainingGateway {
        async fn send(&self, _recipient: &str, _message: &str) -> SmsDelivery {
            // Second send races a direct unit debit that empties the account
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                self.wallet
                    .debit_sms_units(self.tenant, 49, "Direct unit debit")
                    .unwrap();
            }
            SmsDelivery::sent("0000", Some(serde_json::json!({"code": "0000"})))
        }
    }

    #[tokio::test]
    async fn test_aborted_bulk_still_audits_consumed_units() {
        let config = PlatformConfig::default();
        let registry = Arc::new(TenantRegistry::new(config.clone()));
        let school = registry
            .register(NewSchool {
                name: "Unity Academy".into(),
                subdomain: "unity".into(),
                email: "admin@unity.edu.gh".into(),
                phone: None,
                address: None,
            })
            .unwrap();
        let tenant = school.id;

        let locks = Arc::new(TenantLocks::new());
        let wallet = Arc::new(WalletLedger::new(
            registry.accounts(),
            Arc::new(SmsPricingBook::new(&config)),
            Arc::new(NoopPaymentGateway),
            Arc::clone(&locks),
            config,
        ));
        let directory = Arc::new(StudentDirectory::new());
        let gateway = Arc::new(DrainingGateway {
            wallet: Arc::clone(&wallet),
            tenant,
            calls: AtomicUsize::new(0),
        });
        let dispatcher = SmsDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            Arc::clone(&wallet),
            gateway,
            locks,
        );
        let h = Harness {
            registry,
            directory,
            wallet,
            dispatcher,
            tenant,
        };
        for i in 0..3 {
            enroll(&h, &format!("Student {i}"), Some("0244000001"));
        }

        let err = h
            .dispatcher
            .send_bulk(h.tenant, RecipientSelection::All, "Fees are due.")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FeeError::InsufficientSmsBalance {
                required: 1,
                available: 0
            }
        ));

        // The unit consumed before the abort still has its audit row,
        // so the ledger reconciles: 50 trial units fully accounted for.
        assert_eq!(h.registry.get(h.tenant).unwrap().sms_balance, 0);
        let rows = h.wallet.transactions(h.tenant, 10);
        let used: i64 = rows.iter().map(|t| t.sms_units.unwrap_or(0)).sum();
        assert_eq!(used, 50);
        assert!(rows
            .iter()
            .any(|t| t.sms_units == Some(1) && t.description.contains("Bulk SMS to 1 parents")));
    }

    #[tokio::test]
    async fn test_bulk_rejects_unknown_placeholder_before_selection() {
        let h = harness(vec![]);
        let err = h
            .dispatcher
            .send_bulk(h.tenant, RecipientSelection::All, "Hi {parent}")
            .await
            .unwrap_err();
        assert!(matches!(err, FeeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_bulk_by_status() {
        let h = harness(vec![]);
        let paid = enroll(&h, "Ama Mensah", Some("0244000001"));
        enroll(&h, "Yaw Owusu", Some("0244000002"));
        h.directory
            .apply_payment(h.tenant, paid.id, dec!(300), "Tuition", "Term 1")
            .unwrap();

        let report = h
            .dispatcher
            .send_bulk(
                h.tenant,
                RecipientSelection::Status(FeeStatus::Unpaid),
                "{student_name} has fees outstanding: {balance}",
            )
            .await
            .unwrap();

        assert_eq!(report.total_attempted, 1);
        assert_eq!(report.details[0].student_name, "Yaw Owusu");

        // The rendered message carries the formatted balance
        let logs = h.dispatcher.logs(h.tenant, 10);
        assert!(logs[0].message.contains("GHS 300.00"));
    }

    #[tokio::test]
    async fn test_suspended_tenant_cannot_send() {
        let h = harness(vec![]);
        h.registry.suspend(h.tenant).unwrap();

        let err = h
            .dispatcher
            .send_single(h.tenant, "0244123456", "Test")
            .await
            .unwrap_err();
        assert!(matches!(err, FeeError::TenantInactive(_)));
    }
}
