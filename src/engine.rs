//! Transition engine: interprets a classified bank occurrence against the
//! current payment state and computes the resulting state, if any.
//!
//! All transitions are guarded. A failed guard produces no mutation, only a
//! narrative note beginning with "Ignoring change"; the batch keeps going.
//! Every successful state-changing transition clears the payment's error
//! flag. The match over `OccurrenceType` is exhaustive on purpose: adding a
//! variant forces a decision here at compile time.

use crate::cnab::retorno::ReturnTransaction;
use crate::db::PaymentRow;
use crate::model::{format_centavos, DroppedType, MailKind, OccurrenceType, PaymentSituation, Restriction};

/// Outcome of applying one occurrence to one payment.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The fully merged new payment row, present only when state changed.
    pub updated: Option<PaymentRow>,
    /// Operator-facing narrative for the result row and the journal.
    pub note: String,
    /// Notification to enqueue once the batch commits.
    pub notify: Option<MailKind>,
}

impl Transition {
    fn unchanged(note: String) -> Self {
        Transition {
            updated: None,
            note,
            notify: None,
        }
    }

    fn ignored(description: &str) -> Self {
        Transition::unchanged(format!("Ignoring change: {}", description))
    }
}

pub fn joined_reasons(t: &ReturnTransaction) -> String {
    t.reasons.join("; ")
}

fn narrative(t: &ReturnTransaction) -> String {
    if t.reasons.is_empty() {
        t.occurrence_description.clone()
    } else {
        format!("{} ({})", t.occurrence_description, joined_reasons(t))
    }
}

fn cleared(mut payment: PaymentRow) -> PaymentRow {
    payment.has_error = false;
    payment.error_reason = None;
    payment
}

/// Apply one classified occurrence to the payment's current state.
pub fn apply(payment: &PaymentRow, kind: OccurrenceType, t: &ReturnTransaction) -> Transition {
    match kind {
        OccurrenceType::Liquidated => {
            if payment.situation != PaymentSituation::Receivable {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = cleared(payment.clone());
            next.situation = PaymentSituation::Paid;
            next.dropped_type = DroppedType::Liquidated;
            next.paid_value_cents = t.paid_value_cents;
            next.late_interest_cents = t.late_interest_cents;
            next.fine_cents = t.fine_cents;
            next.paid_date = t.occurrence_date;
            next.credit_date = t.credit_date;
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: Some(MailKind::PaymentReceipt),
            }
        }

        OccurrenceType::Dropped => {
            if payment.situation == PaymentSituation::Canceled {
                return Transition::ignored(&t.occurrence_description);
            }
            let lapse_of_term = t
                .reasons
                .iter()
                .any(|r| r.to_lowercase().contains("decurso de prazo"));
            let mut next = cleared(payment.clone());
            if lapse_of_term {
                next.dropped_type = DroppedType::DroppedBecauseLapseOfTerm;
            } else {
                if payment.situation == PaymentSituation::Receivable {
                    next.situation = PaymentSituation::Canceled;
                }
                next.dropped_type = DroppedType::ManuallyDropped;
            }
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: None,
            }
        }

        OccurrenceType::Entry => {
            if payment.situation != PaymentSituation::Receivable
                || payment.dropped_type != DroppedType::NotRegistered
            {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = cleared(payment.clone());
            next.dropped_type = DroppedType::Registered;
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: Some(MailKind::BilletSubmission),
            }
        }

        OccurrenceType::Change => {
            if payment.situation == PaymentSituation::Canceled {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = cleared(payment.clone());
            if let Some(due) = t.due_date {
                next.due_date = due;
            }
            if t.title_value_cents > 0 {
                next.value_cents = t.title_value_cents;
            }
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: None,
            }
        }

        OccurrenceType::Protested => {
            if !payment.situation.is_open() || payment.dropped_type != DroppedType::Registered {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = cleared(payment.clone());
            next.restriction = next.restriction.with(Restriction::PROTESTED);
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: None,
            }
        }

        OccurrenceType::Unprotested => {
            if !payment.situation.is_open() || !payment.restriction.has(Restriction::PROTESTED) {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = cleared(payment.clone());
            next.restriction = next.restriction.without(Restriction::PROTESTED);
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: None,
            }
        }

        OccurrenceType::CreditBlocked => {
            if !payment.situation.is_open() || payment.dropped_type != DroppedType::Registered {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = cleared(payment.clone());
            next.restriction = next.restriction.with(Restriction::CREDIT_BLOCKED);
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: None,
            }
        }

        OccurrenceType::CreditUnblocked => {
            if !payment.situation.is_open()
                || !payment.restriction.has(Restriction::CREDIT_BLOCKED)
            {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = cleared(payment.clone());
            next.restriction = next.restriction.without(Restriction::CREDIT_BLOCKED);
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: None,
            }
        }

        OccurrenceType::Abatement | OccurrenceType::Unabatement => {
            let registered_open = payment.situation.is_open()
                && payment.dropped_type == DroppedType::Registered;
            let settled = payment.situation == PaymentSituation::Paid
                && payment.dropped_type == DroppedType::Liquidated;
            if !registered_open && !settled {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = payment.clone();
            next.abatement_cents = if kind == OccurrenceType::Abatement {
                t.abatement_cents
            } else {
                0
            };
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: None,
            }
        }

        OccurrenceType::Tariff => Transition::unchanged(format!(
            "{} ({})",
            t.occurrence_description,
            format_centavos(t.tariff_cents)
        )),

        OccurrenceType::Others => Transition::unchanged(narrative(t)),

        OccurrenceType::Error => {
            if payment.situation != PaymentSituation::Receivable {
                return Transition::ignored(&t.occurrence_description);
            }
            let mut next = payment.clone();
            next.has_error = true;
            let reason = if t.reasons.is_empty() {
                t.occurrence_description.clone()
            } else {
                joined_reasons(t)
            };
            next.error_reason = Some(reason);
            Transition {
                updated: Some(next),
                note: narrative(t),
                notify: None,
            }
        }
    }
}
