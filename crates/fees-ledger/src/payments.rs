//! Payment recording
//!
//! Records payments against students and sends SMS receipts. A payment
//! either lands fully, with the student summary and the targeted fee
//! line updated together, or leaves nothing behind; the receipt is
//! best-effort and never rolls the payment back.

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use fees_common::money::format_amount;
use fees_common::{FeeError, FeeResult};

use crate::model::{FeeStatus, Payment, SmsLog, Student, TenantId};
use crate::registry::TenantRegistry;
use crate::sms::SmsDispatcher;
use crate::students::StudentDirectory;
use crate::wallet::short_reference;

/// Details for recording a payment
#[derive(Debug, Clone)]
pub struct NewPayment {
    /// Student the payment is for
    pub student_id: Uuid,
    /// Amount paid, must be positive and within the balance
    pub amount: Decimal,
    /// Method, e.g. "Cash", "Mobile Money"
    pub method: String,
    /// Fee type the payment targets
    pub fee_type: String,
    /// Term
    pub term: String,
    /// Academic year
    pub academic_year: String,
    /// Receipt reference; generated when absent
    pub reference: Option<String>,
}

/// Why a receipt was not sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReceiptOutcome {
    /// Provider accepted the receipt SMS
    Sent,
    /// Student has no parent contact on file
    NoContact,
    /// The send failed; the payment itself stands
    Failed(String),
}

/// Result of recording a payment with a receipt attempt
#[derive(Debug, Clone)]
pub struct PaymentRecorded {
    /// The immutable payment row
    pub payment: Payment,
    /// Student state after the payment
    pub student: Student,
    /// What happened to the receipt SMS
    pub receipt: ReceiptOutcome,
}

/// Payment recording service
pub struct PaymentDesk {
    registry: Arc<TenantRegistry>,
    directory: Arc<StudentDirectory>,
    dispatcher: Arc<SmsDispatcher>,
    payments: Arc<RwLock<Vec<Payment>>>,
}

impl PaymentDesk {
    pub(crate) fn new(
        registry: Arc<TenantRegistry>,
        directory: Arc<StudentDirectory>,
        dispatcher: Arc<SmsDispatcher>,
    ) -> Self {
        Self {
            registry,
            directory,
            dispatcher,
            payments: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Record a payment. Validation, the student update, and the fee
    /// line update land together; the payment row is appended only
    /// after they succeed.
    pub fn record(&self, tenant: TenantId, details: NewPayment) -> FeeResult<(Payment, Student)> {
        self.registry.authorize(tenant)?;

        let reference = details
            .reference
            .unwrap_or_else(|| short_reference("PAY"));

        // One write acquisition spans the uniqueness check and the append,
        // so two records with the same reference cannot both pass.
        let mut payments = self.payments.write();
        if payments.iter().any(|p| p.reference == reference) {
            return Err(FeeError::Conflict(format!(
                "payment reference already used: {reference}"
            )));
        }

        let student = self.directory.apply_payment(
            tenant,
            details.student_id,
            details.amount,
            &details.fee_type,
            &details.term,
        )?;

        let payment = Payment {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            student_id: student.id,
            reference,
            amount: details.amount,
            method: details.method,
            fee_type: details.fee_type,
            term: details.term,
            academic_year: details.academic_year,
            payment_date: Utc::now(),
            student_name: student.name.clone(),
            student_class: student.class.clone(),
        };

        info!(
            tenant = %tenant,
            payment = %payment.reference,
            student = %student.id,
            amount = %payment.amount,
            "payment recorded"
        );
        payments.push(payment.clone());
        Ok((payment, student))
    }

    /// Record a payment, then try to text the parent a receipt. A
    /// failed or skipped receipt never affects the recorded payment.
    pub async fn record_with_receipt(
        &self,
        tenant: TenantId,
        details: NewPayment,
    ) -> FeeResult<PaymentRecorded> {
        let (payment, student) = self.record(tenant, details)?;
        let receipt = self.try_send_receipt(tenant, &payment, &student).await;
        Ok(PaymentRecorded {
            payment,
            student,
            receipt,
        })
    }

    /// Re-send the receipt for an existing payment
    pub async fn resend_receipt(&self, tenant: TenantId, payment_id: Uuid) -> FeeResult<SmsLog> {
        let payment = self.get(tenant, payment_id)?;
        let student = self.directory.get(tenant, payment.student_id)?;
        let recipient = student
            .parent_contact
            .clone()
            .ok_or_else(|| FeeError::Validation("student has no parent contact".into()))?;

        let school = self.registry.get(tenant)?;
        let message = self.receipt_message(&school.name, &payment, &student)?;
        self.dispatcher.send_single(tenant, &recipient, &message).await
    }

    /// Fetch one payment
    pub fn get(&self, tenant: TenantId, id: Uuid) -> FeeResult<Payment> {
        self.payments
            .read()
            .iter()
            .find(|p| p.id == id && p.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| FeeError::NotFound(format!("payment {id}")))
    }

    /// Payments for a tenant, optionally one student's, newest first
    pub fn list(&self, tenant: TenantId, student_id: Option<Uuid>) -> Vec<Payment> {
        let payments = self.payments.read();
        let mut rows: Vec<Payment> = payments
            .iter()
            .filter(|p| p.tenant_id == tenant)
            .filter(|p| student_id.map_or(true, |s| p.student_id == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));
        rows
    }

    /// Drop all payments owned by a tenant
    pub fn purge_tenant(&self, tenant: TenantId) {
        self.payments.write().retain(|p| p.tenant_id != tenant);
    }

    async fn try_send_receipt(
        &self,
        tenant: TenantId,
        payment: &Payment,
        student: &Student,
    ) -> ReceiptOutcome {
        let Some(recipient) = student.parent_contact.clone() else {
            return ReceiptOutcome::NoContact;
        };
        let school = match self.registry.get(tenant) {
            Ok(s) => s,
            Err(e) => return ReceiptOutcome::Failed(e.to_string()),
        };
        let message = match self.receipt_message(&school.name, payment, student) {
            Ok(m) => m,
            Err(e) => return ReceiptOutcome::Failed(e.to_string()),
        };
        match self.dispatcher.send_single(tenant, &recipient, &message).await {
            Ok(_) => ReceiptOutcome::Sent,
            Err(e) => {
                warn!(tenant = %tenant, payment = %payment.reference, error = %e, "receipt send failed");
                ReceiptOutcome::Failed(e.to_string())
            }
        }
    }

    /// Build the receipt SMS body: header, payment details, a financial
    /// summary, and a closing block that depends on the payment state.
    fn receipt_message(
        &self,
        school_name: &str,
        payment: &Payment,
        student: &Student,
    ) -> FeeResult<String> {
        let currency = self.dispatcher.currency();
        let mut message = format!("*** {school_name} ***\n");
        message.push_str("PAYMENT RECEIPT\n");
        message.push_str("========================\n");
        message.push_str(&format!(
            "Date: {}\n",
            payment.payment_date.format("%d/%m/%Y %I:%M %p")
        ));
        message.push_str(&format!("Receipt: {}\n\n", payment.reference));

        message.push_str(&format!("Student: {}\n", student.name));
        message.push_str(&format!("Class: {}\n", student.class));
        message.push_str(&format!("Term: {}\n\n", payment.term));

        message.push_str("PAYMENT DETAILS\n");
        message.push_str(&format!("Fee Type: {}\n", payment.fee_type));
        message.push_str(&format!(
            "Amount Paid: {}\n",
            format_amount(&currency, payment.amount)
        ));
        message.push_str(&format!("Method: {}\n\n", payment.method));

        message.push_str("SUMMARY\n");
        message.push_str(&format!(
            "Total Fees: {}\n",
            format_amount(&currency, student.total_fees)
        ));
        message.push_str(&format!(
            "Total Paid: {}\n",
            format_amount(&currency, student.paid_amount)
        ));
        message.push_str(&format!(
            "Balance: {}\n\n",
            format_amount(&currency, student.balance)
        ));

        match student.status {
            FeeStatus::Paid => {
                message.push_str("ALL FEES FULLY PAID!\n");
                message.push_str("Well done! All fees cleared.\n");
            }
            FeeStatus::Partial => {
                let unpaid: Vec<_> = self
                    .directory
                    .fee_records(payment.tenant_id, student.id)?
                    .into_iter()
                    .filter(|r| r.balance > Decimal::ZERO)
                    .collect();
                message.push_str("UNPAID FEES:\n");
                for line in unpaid {
                    message.push_str(&format!(
                        "- {}: {}\n",
                        line.fee_type,
                        format_amount(&currency, line.balance)
                    ));
                }
            }
            FeeStatus::Unpaid => {
                message.push_str(&format!(
                    "Outstanding: {}\n",
                    format_amount(&currency, student.balance)
                ));
            }
        }

        message.push_str("\nThank you for your payment!");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::{FeeCatalog, NewFeeStructure};
    use crate::locks::TenantLocks;
    use crate::pricing::SmsPricingBook;
    use crate::registry::{NewSchool, TenantRegistry};
    use crate::students::NewStudent;
    use crate::wallet::WalletLedger;
    use async_trait::async_trait;
    use fees_common::{
        CheckoutSession, PaymentGateway, PaymentVerification, PlatformConfig, SmsDelivery,
        SmsGateway,
    };
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    struct RecordingSmsGateway {
        accept: bool,
        messages: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SmsGateway for RecordingSmsGateway {
        async fn send(&self, recipient: &str, message: &str) -> SmsDelivery {
            self.messages
                .lock()
                .push((recipient.to_string(), message.to_string()));
            if self.accept {
                SmsDelivery::sent("0000", Some(serde_json::json!({"code": "0000"})))
            } else {
                SmsDelivery::failed("provider timeout", None)
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
        dispatcher: Arc<SmsDispatcher>,
        gateway: Arc<RecordingSmsGateway>,
        desk: PaymentDesk,
        tenant: TenantId,
        student: Student,
    }

    fn harness(accept_sms: bool, contact: Option<&str>) -> Harness {
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

        let catalog = FeeCatalog::new();
        for (fee_type, amount) in [("Tuition", dec!(300)), ("PTA", dec!(50)), ("Sports", dec!(150))] {
            catalog
                .create(
                    tenant,
                    NewFeeStructure {
                        academic_year: "2024/2025".into(),
                        term: "Term 1".into(),
                        fee_type: fee_type.into(),
                        amount,
                        level: "All".into(),
                    },
                )
                .unwrap();
        }

        let directory = Arc::new(StudentDirectory::new());
        let student = directory
            .enroll(
                tenant,
                NewStudent {
                    name: "Ama Mensah".into(),
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
            .unwrap();

        let locks = Arc::new(TenantLocks::new());
        let wallet = Arc::new(WalletLedger::new(
            registry.accounts(),
            Arc::new(SmsPricingBook::new(&config)),
            Arc::new(NoopPaymentGateway),
            Arc::clone(&locks),
            config,
        ));
        let gateway = Arc::new(RecordingSmsGateway {
            accept: accept_sms,
            messages: Mutex::new(Vec::new()),
        });
        let dispatcher = Arc::new(SmsDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            wallet,
            Arc::clone(&gateway) as Arc<dyn SmsGateway>,
            locks,
        ));
        let desk = PaymentDesk::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            Arc::clone(&dispatcher),
        );

        Harness {
            registry,
            directory,
            dispatcher,
            gateway,
            desk,
            tenant,
            student,
        }
    }

    fn payment(student_id: Uuid, amount: Decimal, fee_type: &str) -> NewPayment {
        NewPayment {
            student_id,
            amount,
            method: "Cash".into(),
            fee_type: fee_type.into(),
            term: "Term 1".into(),
            academic_year: "2024/2025".into(),
            reference: None,
        }
    }

    #[test]
    fn test_record_updates_student() {
        let h = harness(true, Some("0244123456"));

        let (paid, student) = h
            .desk
            .record(h.tenant, payment(h.student.id, dec!(200), "Tuition"))
            .unwrap();

        assert!(paid.reference.starts_with("PAY-"));
        assert_eq!(paid.reference.len(), 12);
        assert_eq!(student.paid_amount, dec!(200));
        assert_eq!(student.balance, dec!(300));
        assert_eq!(student.status, FeeStatus::Partial);
    }

    #[test]
    fn test_reference_collision_rejected() {
        let h = harness(true, Some("0244123456"));

        let mut first = payment(h.student.id, dec!(100), "Tuition");
        first.reference = Some("PAY-AAAA1111".into());
        h.desk.record(h.tenant, first.clone()).unwrap();

        first.amount = dec!(50);
        let err = h.desk.record(h.tenant, first).unwrap_err();
        assert!(matches!(err, FeeError::Conflict(_)));

        // The rejected attempt changed nothing
        let student = h.directory.get(h.tenant, h.student.id).unwrap();
        assert_eq!(student.paid_amount, dec!(100));
    }

    #[test]
    fn test_concurrent_same_reference_records_once() {
        let h = harness(true, Some("0244123456"));

        let mut template = payment(h.student.id, dec!(100), "Tuition");
        template.reference = Some("PAY-RACE0001".into());

        let successes = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let desk = &h.desk;
                    let tenant = h.tenant;
                    let details = template.clone();
                    s.spawn(move || desk.record(tenant, details).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|j| j.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(successes, 1);
        assert_eq!(h.desk.list(h.tenant, None).len(), 1);
        assert_eq!(
            h.directory.get(h.tenant, h.student.id).unwrap().paid_amount,
            dec!(100)
        );
    }

    #[test]
    fn test_overpayment_leaves_no_payment_row() {
        let h = harness(true, Some("0244123456"));

        let err = h
            .desk
            .record(h.tenant, payment(h.student.id, dec!(600), "Tuition"))
            .unwrap_err();
        assert!(matches!(err, FeeError::ExceedsBalance { .. }));
        assert!(h.desk.list(h.tenant, None).is_empty());
    }

    #[tokio::test]
    async fn test_receipt_sent_with_unpaid_breakdown() {
        let h = harness(true, Some("0244123456"));

        let outcome = h
            .desk
            .record_with_receipt(h.tenant, payment(h.student.id, dec!(300), "Tuition"))
            .await
            .unwrap();
        assert_eq!(outcome.receipt, ReceiptOutcome::Sent);

        let messages = h.gateway.messages.lock();
        assert_eq!(messages.len(), 1);
        let body = &messages[0].1;
        assert!(body.contains("*** Unity Academy ***"));
        assert!(body.contains("Amount Paid: GHS 300.00"));
        assert!(body.contains("UNPAID FEES:"));
        assert!(body.contains("- PTA: GHS 50.00"));
        assert!(body.contains("- Sports: GHS 150.00"));

        // The receipt consumed one unit
        assert_eq!(h.registry.get(h.tenant).unwrap().sms_balance, 49);
    }

    #[tokio::test]
    async fn test_receipt_failure_keeps_payment() {
        let h = harness(false, Some("0244123456"));

        let outcome = h
            .desk
            .record_with_receipt(h.tenant, payment(h.student.id, dec!(200), "Tuition"))
            .await
            .unwrap();
        assert!(matches!(outcome.receipt, ReceiptOutcome::Failed(_)));

        // Payment stands, no unit consumed
        assert_eq!(h.desk.list(h.tenant, None).len(), 1);
        assert_eq!(h.registry.get(h.tenant).unwrap().sms_balance, 50);
    }

    #[tokio::test]
    async fn test_receipt_skipped_without_contact() {
        let h = harness(true, None);

        let outcome = h
            .desk
            .record_with_receipt(h.tenant, payment(h.student.id, dec!(200), "Tuition"))
            .await
            .unwrap();
        assert_eq!(outcome.receipt, ReceiptOutcome::NoContact);
        assert!(h.gateway.messages.lock().is_empty());
        assert_eq!(h.desk.list(h.tenant, None).len(), 1);
    }

    #[tokio::test]
    async fn test_fully_paid_receipt_block() {
        let h = harness(true, Some("0244123456"));

        h.desk
            .record(h.tenant, payment(h.student.id, dec!(350), "Tuition"))
            .unwrap();
        let outcome = h
            .desk
            .record_with_receipt(h.tenant, payment(h.student.id, dec!(150), "Sports"))
            .await
            .unwrap();
        assert_eq!(outcome.student.status, FeeStatus::Paid);

        let messages = h.gateway.messages.lock();
        assert!(messages[0].1.contains("ALL FEES FULLY PAID!"));
    }

    #[tokio::test]
    async fn test_resend_receipt() {
        let h = harness(true, Some("0244123456"));

        let (paid, _) = h
            .desk
            .record(h.tenant, payment(h.student.id, dec!(200), "Tuition"))
            .unwrap();
        let log = h.desk.resend_receipt(h.tenant, paid.id).await.unwrap();
        assert!(log.message.contains(&paid.reference));
        assert_eq!(h.dispatcher.logs(h.tenant, 10).len(), 1);
    }

    #[test]
    fn test_list_is_newest_first_and_scoped() {
        let h = harness(true, Some("0244123456"));

        h.desk
            .record(h.tenant, payment(h.student.id, dec!(100), "Tuition"))
            .unwrap();
        h.desk
            .record(h.tenant, payment(h.student.id, dec!(50), "PTA"))
            .unwrap();

        let rows = h.desk.list(h.tenant, Some(h.student.id));
        assert_eq!(rows.len(), 2);
        assert!(rows[0].payment_date >= rows[1].payment_date);
        assert!(h.desk.list(Uuid::new_v4(), None).is_empty());
    }
}
