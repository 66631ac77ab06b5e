//! Ledger data model
//!
//! Pure data: every entity is scoped to exactly one tenant (a school
//! account) and carries no behavior beyond derivation helpers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant ID
pub type TenantId = Uuid;

/// Subscription plan a school is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionPlan {
    /// Time-limited trial with a small SMS grant
    FreeTrial,
    /// Paid monthly plan
    Basic,
    /// Paid monthly plan with a larger SMS allowance
    Premium,
}

/// Subscription state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// In good standing
    Active,
    /// Past its end date
    Expired,
    /// Cancelled by the school
    Cancelled,
}

/// A school account: the tenant that owns every other row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolAccount {
    /// Unique tenant id
    pub id: TenantId,
    /// Display name
    pub name: String,
    /// Unique subdomain identifying the tenant
    pub subdomain: String,
    /// Admin contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Prepaid currency balance used to buy SMS units
    pub wallet_balance: Decimal,
    /// Prepaid SMS unit balance, distinct from currency
    pub sms_balance: i64,
    /// Sender id stamped on outbound SMS
    pub sender_id: String,
    /// Current plan
    pub plan: SubscriptionPlan,
    /// Current subscription state
    pub subscription_status: SubscriptionStatus,
    /// Subscription period start
    pub subscription_start: DateTime<Utc>,
    /// Subscription period end
    pub subscription_end: DateTime<Utc>,
    /// Soft-disable flag
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl SchoolAccount {
    /// Whether workflows may run for this tenant right now
    pub fn can_transact(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.subscription_status == SubscriptionStatus::Active
            && self.subscription_end > now
    }
}

/// Payment state of a student or of a single fee line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStatus {
    /// Nothing paid yet
    Unpaid,
    /// Something paid, balance outstanding
    Partial,
    /// Balance cleared
    Paid,
}

impl FeeStatus {
    /// Shared derivation rule for students and fee lines:
    /// zero balance is Paid, any payment with balance left is Partial,
    /// otherwise Unpaid.
    pub fn derive(paid_amount: Decimal, balance: Decimal) -> Self {
        if balance.is_zero() {
            FeeStatus::Paid
        } else if paid_amount > Decimal::ZERO {
            FeeStatus::Partial
        } else {
            FeeStatus::Unpaid
        }
    }
}

/// A student enrolled under a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    /// Unique id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
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
    /// Parent phone number for SMS
    pub parent_contact: Option<String>,
    /// Parent email
    pub parent_email: Option<String>,
    /// Academic year, e.g. "2024/2025"
    pub academic_year: String,
    /// Term, e.g. "Term 1"
    pub term: String,
    /// Sum of fee amounts snapshotted at enrolment
    pub total_fees: Decimal,
    /// Cumulative amount paid
    pub paid_amount: Decimal,
    /// total_fees − paid_amount, always
    pub balance: Decimal,
    /// Derived payment state
    pub status: FeeStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A tenant-defined fee: (year, term, fee type, level) → amount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeStructure {
    /// Unique id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Academic year
    pub academic_year: String,
    /// Term
    pub term: String,
    /// Fee type, e.g. "Tuition", "PTA"
    pub fee_type: String,
    /// Amount due
    pub amount: Decimal,
    /// Class level this applies to, e.g. "JHS 1" or "All"
    pub level: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Per-student snapshot of one fee structure line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentFeeRecord {
    /// Unique id
    pub id: Uuid,
    /// Student this line belongs to
    pub student_id: Uuid,
    /// Fee structure the snapshot came from
    pub fee_structure_id: Uuid,
    /// Fee type copied at enrolment
    pub fee_type: String,
    /// Amount due on this line
    pub amount: Decimal,
    /// Amount paid against this line
    pub paid_amount: Decimal,
    /// amount − paid_amount
    pub balance: Decimal,
    /// Derived state, same rule as the student
    pub status: FeeStatus,
    /// Term copied at enrolment
    pub term: String,
    /// Academic year copied at enrolment
    pub academic_year: String,
}

/// An immutable payment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Student paid for
    pub student_id: Uuid,
    /// Globally unique receipt reference, `PAY-XXXXXXXX`
    pub reference: String,
    /// Amount paid, always positive
    pub amount: Decimal,
    /// Method, e.g. "Cash", "Mobile Money"
    pub method: String,
    /// Fee type this payment targets
    pub fee_type: String,
    /// Term
    pub term: String,
    /// Academic year
    pub academic_year: String,
    /// When the payment was made
    pub payment_date: DateTime<Utc>,
    /// Student name at payment time
    pub student_name: String,
    /// Student class at payment time
    pub student_class: String,
}

/// Wallet mutation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Currency credited to the wallet
    TopUp,
    /// Currency converted into SMS units
    SmsPurchase,
    /// SMS units consumed by sends
    SmsUsage,
}

/// Append-only audit row for one wallet mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Unique id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// What kind of mutation this records
    pub kind: TransactionKind,
    /// Currency delta magnitude, where applicable
    pub amount: Option<Decimal>,
    /// SMS units involved, where applicable
    pub sms_units: Option<i64>,
    /// Human-readable description
    pub description: String,
    /// Payment method for top-ups
    pub method: Option<String>,
    /// Reference, e.g. `TOP-XXXXXXXX`
    pub reference: Option<String>,
    /// Wallet balance immediately before this mutation
    pub balance_before: Decimal,
    /// Wallet balance immediately after
    pub balance_after: Decimal,
    /// SMS balance immediately before
    pub sms_balance_before: i64,
    /// SMS balance immediately after
    pub sms_balance_after: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Delivery state of one SMS attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsStatus {
    /// Created, not yet resolved
    Pending,
    /// Provider accepted the message
    Sent,
    /// Provider rejected or the call failed
    Failed,
}

/// Log row for one SMS dispatch attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsLog {
    /// Unique id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Normalized or raw recipient number
    pub recipient: String,
    /// Message body as sent
    pub message: String,
    /// Terminal state of the attempt
    pub status: SmsStatus,
    /// 1 iff the attempt was Sent
    pub units_used: i64,
    /// Raw provider response
    pub gateway_response: Option<serde_json::Value>,
    /// Failure reason when status is Failed
    pub error_message: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// SMS pricing configuration row; at most one is active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsPricing {
    /// Unique id
    pub id: Uuid,
    /// Price per SMS unit
    pub price_per_sms: Decimal,
    /// Minimum units for the bulk discount to apply
    pub bulk_discount_threshold: u32,
    /// Discount percentage at or above the threshold
    pub bulk_discount_percentage: Decimal,
    /// When this pricing took effect
    pub effective_from: DateTime<Utc>,
    /// Whether this is the row in force
    pub is_active: bool,
}
