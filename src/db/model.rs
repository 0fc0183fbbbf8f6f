//! Database entity and view models used by repositories.

use crate::model::{DroppedType, PaymentSituation, Restriction};
use chrono::NaiveDate;

/// Full payment row as the resolver and transition engine see it, joined to
/// its customer.
#[derive(Debug, Clone)]
pub struct PaymentRow {
    pub id: i64,
    pub contractor_id: i64,
    pub customer_id: i64,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub invoice_id: i64,
    pub invoice_number: Option<String>,
    pub ournumber: Option<String>,
    pub situation: PaymentSituation,
    pub dropped_type: DroppedType,
    pub restriction: Restriction,
    pub value_cents: i64,
    pub paid_value_cents: i64,
    pub late_interest_cents: i64,
    pub fine_cents: i64,
    pub abatement_cents: i64,
    pub tariff_cents: i64,
    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDate>,
    pub credit_date: Option<NaiveDate>,
    pub has_error: bool,
    pub error_reason: Option<String>,
}

/// Insert payload for a new payment title.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub contractor_id: i64,
    pub customer_id: i64,
    pub invoice_id: i64,
    pub invoice_number: Option<String>,
    pub ournumber: Option<String>,
    pub value_cents: i64,
    pub due_date: NaiveDate,
}

/// Payment slice the mail worker needs to render a notification.
#[derive(Debug, Clone)]
pub struct MailPayment {
    pub payment_id: i64,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub invoice_number: Option<String>,
    pub ournumber: Option<String>,
    pub value_cents: i64,
    pub paid_value_cents: i64,
    pub due_date: NaiveDate,
}
