//! Student directory
//!
//! Enrolment snapshots the fee catalog into per-student fee records;
//! payments flow back through `apply_payment`, which keeps the student
//! summary and the targeted fee line consistent under one write lock.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use fees_common::{FeeError, FeeResult};

use crate::fees::FeeCatalog;
use crate::model::{FeeStatus, Student, StudentFeeRecord, TenantId};

/// Details for enrolling a student
#[derive(Debug, Clone)]
pub struct NewStudent {
    /// Full name
    pub name: String,
    /// Class, e.g. "JHS 1"
    pub class: String,
    /// Gender, free-form
    pub gender: Option<String>,
    /// Date of birth
    pub date_of_birth: Option<DateTime<Utc>>,
    /// Parent or guardian name
    pub parent_name: Option<String>,
    /// Parent phone number
    pub parent_contact: Option<String>,
    /// Parent email
    pub parent_email: Option<String>,
    /// Academic year the enrolment is for
    pub academic_year: String,
    /// Term the enrolment is for
    pub term: String,
}

/// Filters for listing students
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    /// Keep only students in this payment state
    pub status: Option<FeeStatus>,
    /// Keep only students in this class
    pub class: Option<String>,
    /// Case-insensitive substring match on student or parent name
    pub search: Option<String>,
}

struct Inner {
    students: HashMap<Uuid, Student>,
    fee_records: HashMap<Uuid, Vec<StudentFeeRecord>>,
}

/// Registry of students and their fee record snapshots
pub struct StudentDirectory {
    inner: Arc<RwLock<Inner>>,
}

impl StudentDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                students: HashMap::new(),
                fee_records: HashMap::new(),
            })),
        }
    }

    /// Enroll a student. Every fee structure matching the enrolment
    /// (year, term) is snapshotted into an unpaid fee record, and the
    /// student's total owed is the sum of those snapshots.
    pub fn enroll(
        &self,
        tenant: TenantId,
        details: NewStudent,
        catalog: &FeeCatalog,
    ) -> FeeResult<Student> {
        if details.name.trim().is_empty() {
            return Err(FeeError::Validation("student name is required".into()));
        }

        let structures = catalog.for_period(tenant, &details.academic_year, &details.term);
        let total_fees: Decimal = structures.iter().map(|s| s.amount).sum();

        let student = Student {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            name: details.name,
            class: details.class,
            gender: details.gender,
            date_of_birth: details.date_of_birth,
            parent_name: details.parent_name,
            parent_contact: details.parent_contact,
            parent_email: details.parent_email,
            academic_year: details.academic_year,
            term: details.term,
            total_fees,
            paid_amount: Decimal::ZERO,
            balance: total_fees,
            status: FeeStatus::derive(Decimal::ZERO, total_fees),
            created_at: Utc::now(),
        };

        let records: Vec<StudentFeeRecord> = structures
            .iter()
            .map(|s| StudentFeeRecord {
                id: Uuid::new_v4(),
                student_id: student.id,
                fee_structure_id: s.id,
                fee_type: s.fee_type.clone(),
                amount: s.amount,
                paid_amount: Decimal::ZERO,
                balance: s.amount,
                status: FeeStatus::Unpaid,
                term: s.term.clone(),
                academic_year: s.academic_year.clone(),
            })
            .collect();

        let mut inner = self.inner.write();
        inner.fee_records.insert(student.id, records);
        inner.students.insert(student.id, student.clone());

        info!(tenant = %tenant, student = %student.id, total = %total_fees, "student enrolled");
        Ok(student)
    }

    /// Fetch a student within the tenant's scope
    pub fn get(&self, tenant: TenantId, id: Uuid) -> FeeResult<Student> {
        self.inner
            .read()
            .students
            .get(&id)
            .filter(|s| s.tenant_id == tenant)
            .cloned()
            .ok_or_else(|| FeeError::NotFound(format!("student {id}")))
    }

    /// List students with optional filters
    pub fn list(&self, tenant: TenantId, filter: &StudentFilter) -> Vec<Student> {
        let needle = filter.search.as_deref().map(str::to_lowercase);
        self.inner
            .read()
            .students
            .values()
            .filter(|s| s.tenant_id == tenant)
            .filter(|s| filter.status.map_or(true, |want| s.status == want))
            .filter(|s| {
                filter
                    .class
                    .as_deref()
                    .map_or(true, |c| s.class.eq_ignore_ascii_case(c))
            })
            .filter(|s| match &needle {
                None => true,
                Some(n) => {
                    s.name.to_lowercase().contains(n)
                        || s.parent_name
                            .as_deref()
                            .is_some_and(|p| p.to_lowercase().contains(n))
                }
            })
            .cloned()
            .collect()
    }

    /// Fee record snapshot lines for a student
    pub fn fee_records(&self, tenant: TenantId, student_id: Uuid) -> FeeResult<Vec<StudentFeeRecord>> {
        let inner = self.inner.read();
        let student = inner
            .students
            .get(&student_id)
            .filter(|s| s.tenant_id == tenant)
            .ok_or_else(|| FeeError::NotFound(format!("student {student_id}")))?;
        Ok(inner
            .fee_records
            .get(&student.id)
            .cloned()
            .unwrap_or_default())
    }

    /// Whether any fee record still points at a fee structure
    pub fn references_structure(&self, fee_structure_id: Uuid) -> bool {
        self.inner
            .read()
            .fee_records
            .values()
            .flatten()
            .any(|r| r.fee_structure_id == fee_structure_id)
    }

    /// Apply a validated payment to a student and, when the fee type
    /// matches a fee line for the term, to that single line. One write
    /// lock spans the validation and both mutations.
    pub(crate) fn apply_payment(
        &self,
        tenant: TenantId,
        student_id: Uuid,
        amount: Decimal,
        fee_type: &str,
        term: &str,
    ) -> FeeResult<Student> {
        if amount <= Decimal::ZERO {
            return Err(FeeError::Validation(
                "payment amount must be greater than zero".into(),
            ));
        }

        let mut inner = self.inner.write();
        let student = inner
            .students
            .get(&student_id)
            .filter(|s| s.tenant_id == tenant)
            .ok_or_else(|| FeeError::NotFound(format!("student {student_id}")))?;

        if amount > student.balance {
            return Err(FeeError::ExceedsBalance {
                amount,
                balance: student.balance,
            });
        }

        if let Some(records) = inner.fee_records.get_mut(&student_id) {
            if let Some(record) = records
                .iter_mut()
                .find(|r| r.fee_type.eq_ignore_ascii_case(fee_type) && r.term == term)
            {
                record.paid_amount += amount;
                record.balance = record.amount - record.paid_amount;
                record.status = FeeStatus::derive(record.paid_amount, record.balance);
            }
        }

        let student = inner
            .students
            .get_mut(&student_id)
            .ok_or_else(|| FeeError::NotFound(format!("student {student_id}")))?;
        student.paid_amount += amount;
        student.balance = student.total_fees - student.paid_amount;
        student.status = FeeStatus::derive(student.paid_amount, student.balance);

        Ok(student.clone())
    }

    /// Remove a student and their fee records
    pub fn remove(&self, tenant: TenantId, student_id: Uuid) -> FeeResult<()> {
        let mut inner = self.inner.write();
        if !inner
            .students
            .get(&student_id)
            .is_some_and(|s| s.tenant_id == tenant)
        {
            return Err(FeeError::NotFound(format!("student {student_id}")));
        }
        inner.students.remove(&student_id);
        inner.fee_records.remove(&student_id);
        Ok(())
    }

    /// Drop everything owned by a tenant
    pub fn purge_tenant(&self, tenant: TenantId) {
        let mut inner = self.inner.write();
        let doomed: Vec<Uuid> = inner
            .students
            .values()
            .filter(|s| s.tenant_id == tenant)
            .map(|s| s.id)
            .collect();
        for id in doomed {
            inner.students.remove(&id);
            inner.fee_records.remove(&id);
        }
    }
}

impl Default for StudentDirectory {
    fn default() -> Self {
        Self::new()
    }
}
