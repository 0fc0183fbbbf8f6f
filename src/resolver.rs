//! Payment resolver: locate the internal payment a bank transaction refers
//! to. Primary key is the bank identification number; the fallback parses
//! the document number into an invoice reference. A fallback hit backfills
//! the payment's stored identification number so the next return file
//! resolves directly.

use crate::db::{self, PaymentRow};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, instrument};

static DOCUMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)([-A-Za-z0-9]{1,2})?$").expect("valid document pattern"));

/// How a payment was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    Ournumber,
    DocumentNumber,
}

/// Invoice reference extracted from a bank document number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub invoice_id: i64,
    /// Full `id{suffix}` string when a 1-2 character check-suffix follows
    /// the numeric run, e.g. "1234-5".
    pub invoice_number: Option<String>,
}

/// Extract the trailing numeric run (and optional suffix) of a document
/// number. Returns None when the text carries no usable invoice reference.
pub fn parse_document_number(document_number: &str) -> Option<DocumentRef> {
    let trimmed = document_number.trim();
    if trimmed.is_empty() {
        return None;
    }
    let caps = DOCUMENT_PATTERN.captures(trimmed)?;
    let invoice_id: i64 = caps.get(1)?.as_str().parse().ok()?;
    let invoice_number = caps.get(2).map(|_| caps.get(0).unwrap().as_str().to_string());
    Some(DocumentRef {
        invoice_id,
        invoice_number,
    })
}

/// Resolve a transaction to a payment within the batch transaction.
///
/// Lookup order: stored ournumber first, then the parsed document number.
/// The fallback path backfills `ournumber` on the matched payment as a side
/// effect, independent of whether the occurrence later mutates state.
#[instrument(skip_all)]
pub async fn resolve(
    tx: &mut Transaction<'_, Sqlite>,
    contractor_id: i64,
    ournumber: &str,
    document_number: &str,
) -> Result<Option<(PaymentRow, MatchedBy)>> {
    if !ournumber.trim().is_empty() {
        if let Some(payment) =
            db::find_payment_by_ournumber_tx(tx, contractor_id, ournumber.trim()).await?
        {
            return Ok(Some((payment, MatchedBy::Ournumber)));
        }
    }

    let Some(doc) = parse_document_number(document_number) else {
        return Ok(None);
    };

    let found = db::find_payment_by_invoice_tx(
        tx,
        contractor_id,
        doc.invoice_id,
        doc.invoice_number.as_deref(),
    )
    .await?;
    let Some(mut payment) = found else {
        return Ok(None);
    };

    if !ournumber.trim().is_empty() {
        debug!(
            payment_id = payment.id,
            ournumber, "backfilling identification number from return file"
        );
        db::set_ournumber_tx(tx, payment.id, ournumber.trim()).await?;
        payment.ournumber = Some(ournumber.trim().to_string());
    }

    Ok(Some((payment, MatchedBy::DocumentNumber)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_numeric_run() {
        let doc = parse_document_number("1234").unwrap();
        assert_eq!(doc.invoice_id, 1234);
        assert_eq!(doc.invoice_number, None);
    }

    #[test]
    fn parses_suffixed_invoice() {
        let doc = parse_document_number("1234-5").unwrap();
        assert_eq!(doc.invoice_id, 1234);
        assert_eq!(doc.invoice_number.as_deref(), Some("1234-5"));
    }

    #[test]
    fn parses_trailing_run_with_prefix_text() {
        let doc = parse_document_number("FAT 000789-A").unwrap();
        assert_eq!(doc.invoice_id, 789);
        assert_eq!(doc.invoice_number.as_deref(), Some("000789-A"));
    }

    #[test]
    fn two_character_suffix() {
        let doc = parse_document_number("55AB").unwrap();
        assert_eq!(doc.invoice_id, 55);
        assert_eq!(doc.invoice_number.as_deref(), Some("55AB"));
    }

    #[test]
    fn rejects_non_numeric() {
        assert_eq!(parse_document_number(""), None);
        assert_eq!(parse_document_number("   "), None);
        assert_eq!(parse_document_number("ABC-"), None);
    }
}
