use super::model::{MailPayment, NewPayment, PaymentRow};
use crate::model::{DroppedType, MailKind, OccurrenceType, PaymentSituation, Restriction};
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

pub type Pool = SqlitePool;
type MailItem = (i64, String, i64, i32);

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const PAYMENT_COLUMNS: &str = "p.id, p.contractor_id, p.customer_id, c.name AS customer_name, \
     c.email AS customer_email, p.invoice_id, p.invoice_number, p.ournumber, \
     p.situation, p.dropped_type, p.restriction, p.value_cents, p.paid_value_cents, \
     p.late_interest_cents, p.fine_cents, p.abatement_cents, p.tariff_cents, \
     p.due_date, p.paid_date, p.credit_date, p.has_error, p.error_reason";

fn map_payment(row: &SqliteRow) -> Result<PaymentRow> {
    let situation_code: i64 = row.get("situation");
    let dropped_code: i64 = row.get("dropped_type");
    let restriction_bits: i64 = row.get("restriction");
    Ok(PaymentRow {
        id: row.get("id"),
        contractor_id: row.get("contractor_id"),
        customer_id: row.get("customer_id"),
        customer_name: row.get("customer_name"),
        customer_email: row.try_get("customer_email")?,
        invoice_id: row.get("invoice_id"),
        invoice_number: row.try_get("invoice_number")?,
        ournumber: row.try_get("ournumber")?,
        situation: PaymentSituation::from_code(situation_code)
            .ok_or_else(|| anyhow!("payment has unknown situation code {}", situation_code))?,
        dropped_type: DroppedType::from_code(dropped_code)
            .ok_or_else(|| anyhow!("payment has unknown dropped type code {}", dropped_code))?,
        restriction: Restriction(restriction_bits as u8),
        value_cents: row.get("value_cents"),
        paid_value_cents: row.get("paid_value_cents"),
        late_interest_cents: row.get("late_interest_cents"),
        fine_cents: row.get("fine_cents"),
        abatement_cents: row.get("abatement_cents"),
        tariff_cents: row.get("tariff_cents"),
        due_date: row.get("due_date"),
        paid_date: row.try_get("paid_date")?,
        credit_date: row.try_get("credit_date")?,
        has_error: row.get::<i64, _>("has_error") != 0,
        error_reason: row.try_get("error_reason")?,
    })
}

#[instrument(skip_all)]
pub async fn create_customer(
    pool: &Pool,
    contractor_id: i64,
    name: &str,
    email: Option<&str>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO customers (contractor_id, name, email) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(contractor_id)
    .bind(name)
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn create_payment(pool: &Pool, payment: &NewPayment) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO payments (contractor_id, customer_id, invoice_id, invoice_number, \
         ournumber, value_cents, due_date) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(payment.contractor_id)
    .bind(payment.customer_id)
    .bind(payment.invoice_id)
    .bind(payment.invoice_number.as_deref())
    .bind(payment.ournumber.as_deref())
    .bind(payment.value_cents)
    .bind(payment.due_date)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

pub async fn fetch_payment(pool: &Pool, payment_id: i64) -> Result<PaymentRow> {
    let query = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments p JOIN customers c ON c.id = p.customer_id \
         WHERE p.id = ?"
    );
    let row = sqlx::query(&query)
        .bind(payment_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Err(anyhow!("payment {} not found", payment_id));
    };
    map_payment(&row)
}

#[instrument(skip_all)]
pub async fn find_payment_by_ournumber_tx(
    tx: &mut Transaction<'_, Sqlite>,
    contractor_id: i64,
    ournumber: &str,
) -> Result<Option<PaymentRow>> {
    let query = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments p JOIN customers c ON c.id = p.customer_id \
         WHERE p.contractor_id = ? AND p.ournumber = ? LIMIT 1"
    );
    let row = sqlx::query(&query)
        .bind(contractor_id)
        .bind(ournumber)
        .fetch_optional(&mut **tx)
        .await?;
    row.as_ref().map(map_payment).transpose()
}

/// Fallback lookup by invoice id or full invoice number. Several payments can
/// match the same invoice; the tie-break is deterministic: most recent due
/// date first, then the newest row.
#[instrument(skip_all)]
pub async fn find_payment_by_invoice_tx(
    tx: &mut Transaction<'_, Sqlite>,
    contractor_id: i64,
    invoice_id: i64,
    invoice_number: Option<&str>,
) -> Result<Option<PaymentRow>> {
    let query = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments p JOIN customers c ON c.id = p.customer_id \
         WHERE p.contractor_id = ? AND (p.invoice_id = ? OR (? IS NOT NULL AND p.invoice_number = ?)) \
         ORDER BY p.due_date DESC, p.id DESC LIMIT 1"
    );
    let row = sqlx::query(&query)
        .bind(contractor_id)
        .bind(invoice_id)
        .bind(invoice_number)
        .bind(invoice_number)
        .fetch_optional(&mut **tx)
        .await?;
    row.as_ref().map(map_payment).transpose()
}

#[instrument(skip_all)]
pub async fn set_ournumber_tx(
    tx: &mut Transaction<'_, Sqlite>,
    payment_id: i64,
    ournumber: &str,
) -> Result<()> {
    sqlx::query("UPDATE payments SET ournumber = ? WHERE id = ?")
        .bind(ournumber)
        .bind(payment_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Persist the mutable state of a payment after a transition. The caller
/// passes the fully merged row; every mutable column is written so the
/// update is deterministic regardless of which fields the transition touched.
#[instrument(skip_all)]
pub async fn update_payment_state_tx(
    tx: &mut Transaction<'_, Sqlite>,
    payment: &PaymentRow,
) -> Result<()> {
    sqlx::query(
        "UPDATE payments SET situation = ?, dropped_type = ?, restriction = ?, \
         value_cents = ?, paid_value_cents = ?, late_interest_cents = ?, fine_cents = ?, \
         abatement_cents = ?, tariff_cents = ?, due_date = ?, paid_date = ?, credit_date = ?, \
         has_error = ?, error_reason = ? WHERE id = ?",
    )
    .bind(payment.situation.code())
    .bind(payment.dropped_type.code())
    .bind(payment.restriction.0 as i64)
    .bind(payment.value_cents)
    .bind(payment.paid_value_cents)
    .bind(payment.late_interest_cents)
    .bind(payment.fine_cents)
    .bind(payment.abatement_cents)
    .bind(payment.tariff_cents)
    .bind(payment.due_date)
    .bind(payment.paid_date)
    .bind(payment.credit_date)
    .bind(payment.has_error as i64)
    .bind(payment.error_reason.as_deref())
    .bind(payment.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_transmission_file_tx(
    tx: &mut Transaction<'_, Sqlite>,
    contractor_id: i64,
    filename: &str,
    stored_path: &str,
    is_return: bool,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO transmission_files (contractor_id, filename, stored_path, is_return) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(contractor_id)
    .bind(filename)
    .bind(stored_path)
    .bind(is_return as i64)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Append one journal row for a processed transaction. Always called for
/// resolved payments, whether or not the occurrence changed payment state.
#[instrument(skip_all)]
#[allow(clippy::too_many_arguments)]
pub async fn insert_occurrence_tx(
    tx: &mut Transaction<'_, Sqlite>,
    transmission_file_id: i64,
    payment_id: i64,
    occurrence_type: OccurrenceType,
    occurrence_code: u8,
    description: &str,
    reasons: &str,
    occurrence_date: Option<NaiveDate>,
    tariff_cents: i64,
    paid_value_cents: i64,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO occurrences (transmission_file_id, payment_id, occurrence_type, \
         occurrence_code, description, reasons, occurrence_date, tariff_cents, paid_value_cents) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(transmission_file_id)
    .bind(payment_id)
    .bind(occurrence_type.as_str())
    .bind(occurrence_code as i64)
    .bind(description)
    .bind(reasons)
    .bind(occurrence_date)
    .bind(tariff_cents)
    .bind(paid_value_cents)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn enqueue_mail_tx(
    tx: &mut Transaction<'_, Sqlite>,
    kind: MailKind,
    payment_id: i64,
    due_at: DateTime<Utc>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO outbox (kind, payment_id, attempt, due_at) VALUES (?, ?, 0, ?) RETURNING id",
    )
    .bind(kind.as_str())
    .bind(payment_id)
    .bind(due_at)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn next_due_mail(pool: &Pool) -> Result<Option<MailItem>> {
    let row = sqlx::query(
        "SELECT id, kind, payment_id, attempt FROM outbox \
         WHERE datetime(due_at) <= CURRENT_TIMESTAMP ORDER BY datetime(due_at) ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| {
        (
            row.get::<i64, _>("id"),
            row.get::<String, _>("kind"),
            row.get::<i64, _>("payment_id"),
            row.get::<i32, _>("attempt"),
        )
    }))
}

#[instrument(skip_all)]
pub async fn delete_mail(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM outbox WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Exponential backoff: 5s * 2^attempt, capped at `max_cap_secs`.
#[instrument(skip_all)]
pub async fn backoff_mail(pool: &Pool, id: i64, attempt: i32, max_cap_secs: i64) -> Result<()> {
    let secs = (5_i64) * (1_i64 << attempt.min(10));
    let cap = if max_cap_secs <= 0 { secs } else { max_cap_secs };
    let secs = secs.min(cap);
    sqlx::query(
        "UPDATE outbox SET attempt = ?, due_at = datetime('now', ? || ' seconds') WHERE id = ?",
    )
    .bind(attempt + 1)
    .bind(secs)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_payment_for_mail(pool: &Pool, payment_id: i64) -> Result<MailPayment> {
    let row = sqlx::query(
        "SELECT p.id, c.name AS customer_name, c.email AS customer_email, p.invoice_number, \
         p.ournumber, p.value_cents, p.paid_value_cents, p.due_date \
         FROM payments p JOIN customers c ON c.id = p.customer_id WHERE p.id = ?",
    )
    .bind(payment_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Err(anyhow!("payment {} not found", payment_id));
    };
    Ok(MailPayment {
        payment_id: row.get("id"),
        customer_name: row.get("customer_name"),
        customer_email: row.try_get("customer_email")?,
        invoice_number: row.try_get("invoice_number")?,
        ournumber: row.try_get("ournumber")?,
        value_cents: row.get("value_cents"),
        paid_value_cents: row.get("paid_value_cents"),
        due_date: row.get("due_date"),
    })
}

/// Titles awaiting bank registration: receivable, never transmitted.
/// Titles already sent in a shipping file stay excluded while their ENTRY
/// confirmation is pending.
#[instrument(skip_all)]
pub async fn list_unregistered_payments(
    pool: &Pool,
    contractor_id: i64,
) -> Result<Vec<PaymentRow>> {
    let query = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments p JOIN customers c ON c.id = p.customer_id \
         WHERE p.contractor_id = ? AND p.situation = ? AND p.dropped_type = ? \
         AND p.transmitted_at IS NULL ORDER BY p.id ASC"
    );
    let rows = sqlx::query(&query)
        .bind(contractor_id)
        .bind(PaymentSituation::Receivable.code())
        .bind(DroppedType::NotRegistered.code())
        .fetch_all(pool)
        .await?;
    rows.iter().map(map_payment).collect()
}

/// Stamp a title as transmitted; called inside the shipping-file
/// transaction so a rolled-back file leaves the title eligible.
#[instrument(skip_all)]
pub async fn mark_transmitted_tx(
    tx: &mut Transaction<'_, Sqlite>,
    payment_id: i64,
) -> Result<()> {
    sqlx::query("UPDATE payments SET transmitted_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(payment_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn count_shipping_files(pool: &Pool, contractor_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transmission_files WHERE contractor_id = ? AND is_return = 0",
    )
    .bind(contractor_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
