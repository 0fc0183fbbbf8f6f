use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Collection status of a payment title.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentSituation {
    Receivable,
    Paid,
    Canceled,
    Negotiated,
    Renegotiated,
}

impl PaymentSituation {
    pub fn code(&self) -> i64 {
        match self {
            PaymentSituation::Receivable => 1,
            PaymentSituation::Paid => 2,
            PaymentSituation::Canceled => 3,
            PaymentSituation::Negotiated => 4,
            PaymentSituation::Renegotiated => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(PaymentSituation::Receivable),
            2 => Some(PaymentSituation::Paid),
            3 => Some(PaymentSituation::Canceled),
            4 => Some(PaymentSituation::Negotiated),
            5 => Some(PaymentSituation::Renegotiated),
            _ => None,
        }
    }

    /// Situations that still admit collection occurrences (change, protest,
    /// blocking, abatement).
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PaymentSituation::Receivable
                | PaymentSituation::Negotiated
                | PaymentSituation::Renegotiated
        )
    }
}

/// Sub-state describing why/how a title left (or never entered) active
/// bank collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DroppedType {
    NotRegistered,
    Registered,
    Liquidated,
    ManuallyDropped,
    DroppedBecauseLapseOfTerm,
}

impl DroppedType {
    pub fn code(&self) -> i64 {
        match self {
            DroppedType::NotRegistered => 0,
            DroppedType::Registered => 1,
            DroppedType::Liquidated => 2,
            DroppedType::ManuallyDropped => 3,
            DroppedType::DroppedBecauseLapseOfTerm => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DroppedType::NotRegistered),
            1 => Some(DroppedType::Registered),
            2 => Some(DroppedType::Liquidated),
            3 => Some(DroppedType::ManuallyDropped),
            4 => Some(DroppedType::DroppedBecauseLapseOfTerm),
            _ => None,
        }
    }
}

/// Bitmask of standing restrictions on a title.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Restriction(pub u8);

impl Restriction {
    pub const NONE: Restriction = Restriction(0);
    pub const PROTESTED: u8 = 0x01;
    pub const CREDIT_BLOCKED: u8 = 0x02;
    pub const SENT_TO_DUNNING: u8 = 0x04;

    pub fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn with(&self, bit: u8) -> Restriction {
        Restriction(self.0 | bit)
    }

    pub fn without(&self, bit: u8) -> Restriction {
        Restriction(self.0 & !bit)
    }
}

/// Semantic meaning of a bank-reported occurrence code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OccurrenceType {
    Liquidated,
    Dropped,
    Entry,
    Change,
    Protested,
    Unprotested,
    CreditBlocked,
    CreditUnblocked,
    Abatement,
    Unabatement,
    Tariff,
    Others,
    Error,
}

impl OccurrenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceType::Liquidated => "liquidated",
            OccurrenceType::Dropped => "dropped",
            OccurrenceType::Entry => "entry",
            OccurrenceType::Change => "change",
            OccurrenceType::Protested => "protested",
            OccurrenceType::Unprotested => "unprotested",
            OccurrenceType::CreditBlocked => "credit_blocked",
            OccurrenceType::CreditUnblocked => "credit_unblocked",
            OccurrenceType::Abatement => "abatement",
            OccurrenceType::Unabatement => "unabatement",
            OccurrenceType::Tariff => "tariff",
            OccurrenceType::Others => "others",
            OccurrenceType::Error => "error",
        }
    }
}

/// Kind of outbound notification job in the mail outbox.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MailKind {
    PaymentReceipt,
    BilletSubmission,
}

impl MailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailKind::PaymentReceipt => "payment_receipt",
            MailKind::BilletSubmission => "billet_submission",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "payment_receipt" => Some(MailKind::PaymentReceipt),
            "billet_submission" => Some(MailKind::BilletSubmission),
            _ => None,
        }
    }
}

/// Format integer centavos in Brazilian convention: 123456 -> "1.234,56".
pub fn format_centavos(cents: i64) -> String {
    let negative = cents < 0;
    let cents = cents.abs();
    let whole = cents / 100;
    let frac = cents % 100;
    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if negative { "-" } else { "" };
    format!("{}{},{:02}", sign, grouped, frac)
}

/// Format a date for operator-facing output: dd/mm/YYYY.
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}
