//! Batch coordinator: processes one uploaded return file as a single
//! all-or-nothing unit, and generates outbound shipping files.
//!
//! Per-row problems (guarded transition, unresolved payment, unknown code)
//! produce a result row and keep going. Batch-level problems abort the whole
//! file: the transaction rolls back, the file is not archived, and nothing —
//! payment updates, journal rows, notifications — persists.

use crate::cnab::{remessa, retorno, CnabError};
use crate::config::Config;
use crate::db::{self, Pool};
use crate::engine;
use crate::model::{format_centavos, format_date, MailKind};
use crate::{billet, classifier, resolver};
use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("return file {0} was already processed")]
    AlreadyProcessed(String),
    #[error("storage path unusable: {0}")]
    Storage(#[source] std::io::Error),
    #[error("could not parse return file: {0}")]
    Parse(#[from] CnabError),
    #[error("could not process return file")]
    Db(#[from] anyhow::Error),
}

/// One operator-review row per transaction in the processed file.
#[derive(Debug, Clone, Serialize)]
pub struct RowResult {
    #[serde(rename = "documentNumber")]
    pub document_number: String,
    #[serde(rename = "dueDate")]
    pub due_date: String,
    #[serde(rename = "valueToPay")]
    pub value_to_pay: String,
    #[serde(rename = "occurrenceDate")]
    pub occurrence_date: String,
    pub occurrence: String,
    #[serde(rename = "hasError")]
    pub has_error: bool,
    #[serde(rename = "paidValue")]
    pub paid_value: String,
    pub customername: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub filename: String,
    #[serde(rename = "content")]
    pub rows: Vec<RowResult>,
}

/// Outcome of a shipping-file generation run.
#[derive(Debug, Clone, Serialize)]
pub struct ShippingSummary {
    pub filename: String,
    pub titles: usize,
}

/// Operator-facing JSON envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub result: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Envelope {
            result: "OK",
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn nok(message: impl Into<String>) -> Self {
        Envelope {
            result: "NOK",
            message: message.into(),
            data: None,
        }
    }
}

/// Archive directory for a contractor: `{root}/{contractor}/{year}/{month}`.
fn storage_dir(root: &Path, contractor_id: i64, date: NaiveDate) -> PathBuf {
    root.join(contractor_id.to_string())
        .join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
}

fn checked_filename(filename: &str) -> Result<&str, ProcessError> {
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
        return Err(ProcessError::Storage(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid filename {:?}", filename),
        )));
    }
    Ok(filename)
}

/// Process one uploaded return file end to end. See module docs for the
/// atomicity contract.
#[instrument(skip_all, fields(contractor_id, filename))]
pub async fn process_return_file(
    pool: &Pool,
    storage_root: &Path,
    contractor_id: i64,
    content: &str,
    filename: &str,
) -> Result<ProcessingResult, ProcessError> {
    let filename = checked_filename(filename)?;
    let today = Utc::now().date_naive();
    let dir = storage_dir(storage_root, contractor_id, today);
    fs::create_dir_all(&dir).map_err(ProcessError::Storage)?;
    let target = dir.join(filename);
    if target.exists() {
        return Err(ProcessError::AlreadyProcessed(filename.to_string()));
    }

    let parsed = retorno::parse(content)?;

    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;
    let file_id = db::insert_transmission_file_tx(
        &mut tx,
        contractor_id,
        filename,
        &target.to_string_lossy(),
        true,
    )
    .await?;

    let mut rows = Vec::with_capacity(parsed.transactions.len());
    let mut notifications: Vec<(i64, MailKind)> = Vec::new();

    for t in &parsed.transactions {
        let kind = classifier::classify(t.occurrence_code);
        let resolved = resolver::resolve(
            &mut tx,
            contractor_id,
            &t.bank_identification_number,
            &t.document_number,
        )
        .await?;

        let Some((payment, matched_by)) = resolved else {
            warn!(
                sequence = t.sequence,
                document_number = %t.document_number,
                "transaction does not match any payment"
            );
            rows.push(RowResult {
                document_number: t.document_number.clone(),
                due_date: format_date(t.due_date),
                value_to_pay: format_centavos(t.title_value_cents),
                occurrence_date: format_date(t.occurrence_date),
                occurrence: format!("{} — título não localizado", t.occurrence_description),
                has_error: true,
                paid_value: format_centavos(t.paid_value_cents),
                customername: String::new(),
            });
            continue;
        };

        let transition = engine::apply(&payment, kind, t);
        if let Some(updated) = &transition.updated {
            db::update_payment_state_tx(&mut tx, updated).await?;
            if let Some(mail) = transition.notify {
                notifications.push((payment.id, mail));
            }
        }
        db::insert_occurrence_tx(
            &mut tx,
            file_id,
            payment.id,
            kind,
            t.occurrence_code,
            &t.occurrence_description,
            &engine::joined_reasons(t),
            t.occurrence_date,
            t.tariff_cents,
            t.paid_value_cents,
        )
        .await?;

        let effective = transition.updated.as_ref().unwrap_or(&payment);
        info!(
            payment_id = payment.id,
            occurrence_code = t.occurrence_code,
            occurrence_type = kind.as_str(),
            matched_by = ?matched_by,
            changed = transition.updated.is_some(),
            "processed transaction"
        );
        rows.push(RowResult {
            document_number: t.document_number.clone(),
            due_date: format_date(Some(effective.due_date)),
            value_to_pay: format_centavos(effective.value_cents),
            occurrence_date: format_date(t.occurrence_date),
            occurrence: transition.note.clone(),
            has_error: effective.has_error,
            paid_value: format_centavos(t.paid_value_cents),
            customername: effective.customer_name.clone(),
        });
    }

    for (payment_id, kind) in notifications {
        db::enqueue_mail_tx(&mut tx, kind, payment_id, Utc::now()).await?;
    }

    // Archive the source file as the final in-transaction step; dropping the
    // transaction on a write failure rolls everything back.
    fs::write(&target, content).map_err(ProcessError::Storage)?;
    if let Err(err) = tx.commit().await {
        let _ = fs::remove_file(&target);
        return Err(ProcessError::Db(anyhow!(err)));
    }

    info!(
        contractor_id,
        filename,
        transactions = rows.len(),
        "return file processed"
    );
    Ok(ProcessingResult {
        filename: filename.to_string(),
        rows,
    })
}

/// Build and archive a shipping (remessa) file registering every receivable
/// payment not yet transmitted for this contractor. Payments without a bank
/// identification number get one assigned (sequence = payment id).
#[instrument(skip_all, fields(contractor_id))]
pub async fn generate_shipping_file(
    pool: &Pool,
    cfg: &Config,
    contractor_id: i64,
    company_name: &str,
    today: NaiveDate,
) -> Result<Option<ShippingSummary>, ProcessError> {
    let payments = db::list_unregistered_payments(pool, contractor_id).await?;
    if payments.is_empty() {
        return Ok(None);
    }

    let sequence = db::count_shipping_files(pool, contractor_id).await? as u32 + 1;
    let filename = remessa::filename(today, sequence);
    let dir = storage_dir(Path::new(&cfg.app.storage_root), contractor_id, today);
    fs::create_dir_all(&dir).map_err(ProcessError::Storage)?;
    let target = dir.join(&filename);
    if target.exists() {
        return Err(ProcessError::AlreadyProcessed(filename));
    }

    let mut tx = pool.begin().await.map_err(anyhow::Error::from)?;
    let mut titles = Vec::with_capacity(payments.len());
    for payment in &payments {
        if payment.ournumber.is_none() {
            let assigned = billet::identification_digits(cfg.bank.wallet, payment.id as u64);
            db::set_ournumber_tx(&mut tx, payment.id, &assigned).await?;
        }
        db::mark_transmitted_tx(&mut tx, payment.id).await?;
        titles.push(remessa::RemessaTitle {
            our_sequence: payment.id as u64,
            document_number: payment
                .invoice_number
                .clone()
                .unwrap_or_else(|| payment.invoice_id.to_string()),
            due_date: payment.due_date,
            value_cents: payment.value_cents,
            payer_name: payment.customer_name.clone(),
        });
    }

    let content = remessa::build(&cfg.bank, company_name, &titles, sequence, today);
    db::insert_transmission_file_tx(
        &mut tx,
        contractor_id,
        &filename,
        &target.to_string_lossy(),
        false,
    )
    .await?;

    fs::write(&target, &content).map_err(ProcessError::Storage)?;
    if let Err(err) = tx.commit().await {
        let _ = fs::remove_file(&target);
        return Err(ProcessError::Db(anyhow!(err)));
    }

    info!(contractor_id, %filename, titles = titles.len(), "shipping file generated");
    Ok(Some(ShippingSummary {
        filename,
        titles: titles.len(),
    }))
}
