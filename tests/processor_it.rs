use chrono::{Datelike, NaiveDate, Utc};
use cnab_reconciler::db::{self, NewPayment};
use cnab_reconciler::model::{DroppedType, PaymentSituation};
use cnab_reconciler::processor::{self, ProcessError};
use cnab_reconciler::{cnab, config};
use std::path::Path;

const RECORD_LEN: usize = cnab::RECORD_LEN;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn seed_payment(
    pool: &sqlx::SqlitePool,
    invoice_id: i64,
    ournumber: Option<&str>,
) -> i64 {
    let customer_id = db::create_customer(pool, 1, "Acme Rastreamento", Some("billing@acme.example"))
        .await
        .unwrap();
    db::create_payment(
        pool,
        &NewPayment {
            contractor_id: 1,
            customer_id,
            invoice_id,
            invoice_number: Some(format!("{}-5", invoice_id)),
            ournumber: ournumber.map(str::to_string),
            value_cents: 15000,
            due_date: date(2026, 9, 10),
        },
    )
    .await
    .unwrap()
}

fn put(line: &mut [u8], start: usize, value: &str) {
    line[start - 1..start - 1 + value.len()].copy_from_slice(value.as_bytes());
}

fn header_line() -> String {
    let mut line = vec![b' '; RECORD_LEN];
    line[0] = b'0';
    put(&mut line, 2, "2RETORNO");
    put(&mut line, 77, "237");
    put(&mut line, 95, "260826");
    String::from_utf8(line).unwrap()
}

fn detail_line(
    ournumber: &str,
    occurrence: &str,
    document: &str,
    value_cents: i64,
    paid_cents: i64,
    reasons: &str,
    seq: usize,
) -> String {
    let mut line = vec![b' '; RECORD_LEN];
    line[0] = b'1';
    put(&mut line, 71, ournumber);
    put(&mut line, 109, occurrence);
    put(&mut line, 111, "250826");
    put(&mut line, 117, document);
    put(&mut line, 147, "100926");
    put(&mut line, 153, &format!("{:013}", value_cents));
    put(&mut line, 254, &format!("{:013}", paid_cents));
    put(&mut line, 296, "270826");
    put(&mut line, 319, reasons);
    put(&mut line, 395, &format!("{:06}", seq));
    String::from_utf8(line).unwrap()
}

fn trailer_line(seq: usize) -> String {
    let mut line = vec![b' '; RECORD_LEN];
    line[0] = b'9';
    put(&mut line, 395, &format!("{:06}", seq));
    String::from_utf8(line).unwrap()
}

fn return_file(details: &[String]) -> String {
    let mut out = format!("{}\n", header_line());
    for d in details {
        out.push_str(d);
        out.push('\n');
    }
    out.push_str(&trailer_line(details.len() + 2));
    out.push('\n');
    out
}

fn current_month_dir(root: &Path, contractor: i64) -> std::path::PathBuf {
    let today = Utc::now().date_naive();
    root.join(contractor.to_string())
        .join(format!("{:04}", today.year()))
        .join(format!("{:02}", today.month()))
}

#[tokio::test]
async fn liquidation_and_unknown_code_end_to_end() {
    let pool = setup_pool().await;
    let storage = tempfile::tempdir().unwrap();
    let paid_id = seed_payment(&pool, 1234, Some("000000000011")).await;
    let errored_id = seed_payment(&pool, 5678, Some("000000000022")).await;

    let file = return_file(&[
        detail_line("000000000011", "06", "1234-5", 15000, 15000, "0000000000", 2),
        detail_line("000000000022", "42", "5678-5", 15000, 0, "0800000000", 3),
    ]);

    let result =
        processor::process_return_file(&pool, storage.path(), 1, &file, "RET260826.TXT")
            .await
            .unwrap();

    assert_eq!(result.filename, "RET260826.TXT");
    assert_eq!(result.rows.len(), 2);
    assert!(!result.rows[0].has_error);
    assert_eq!(result.rows[0].paid_value, "150,00");
    assert_eq!(result.rows[0].customername, "Acme Rastreamento");
    assert!(result.rows[1].has_error);

    let paid = db::fetch_payment(&pool, paid_id).await.unwrap();
    assert_eq!(paid.situation, PaymentSituation::Paid);
    assert_eq!(paid.dropped_type, DroppedType::Liquidated);
    assert_eq!(paid.paid_value_cents, 15000);
    assert!(!paid.has_error);

    let errored = db::fetch_payment(&pool, errored_id).await.unwrap();
    assert_eq!(errored.situation, PaymentSituation::Receivable);
    assert!(errored.has_error);
    assert_eq!(errored.error_reason.as_deref(), Some("Nosso número inválido"));

    // Exactly one receipt notification, none for the errored payment.
    let jobs: Vec<(String, i64)> =
        sqlx::query_as("SELECT kind, payment_id FROM outbox ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(jobs, vec![("payment_receipt".to_string(), paid_id)]);

    // Both transactions journaled, and the file archived.
    let journaled: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM occurrences")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(journaled, 2);
    let archived = current_month_dir(storage.path(), 1).join("RET260826.TXT");
    assert!(archived.exists());
}

#[tokio::test]
async fn duplicate_file_is_rejected_without_side_effects() {
    let pool = setup_pool().await;
    let storage = tempfile::tempdir().unwrap();
    seed_payment(&pool, 1234, Some("000000000011")).await;

    let file = return_file(&[detail_line(
        "000000000011",
        "06",
        "1234-5",
        15000,
        15000,
        "0000000000",
        2,
    )]);

    processor::process_return_file(&pool, storage.path(), 1, &file, "RET.TXT")
        .await
        .unwrap();
    let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transmission_files")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(before, 1);

    let err = processor::process_return_file(&pool, storage.path(), 1, &file, "RET.TXT")
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::AlreadyProcessed(_)));

    let after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transmission_files")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn document_number_fallback_backfills_ournumber() {
    let pool = setup_pool().await;
    let storage = tempfile::tempdir().unwrap();
    let payment_id = seed_payment(&pool, 1234, None).await;

    // Entry confirmation whose ournumber the database has never seen.
    let file = return_file(&[detail_line(
        "000000000099",
        "02",
        "1234-5",
        15000,
        0,
        "0000000000",
        2,
    )]);

    let result = processor::process_return_file(&pool, storage.path(), 1, &file, "RET.TXT")
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 1);
    assert!(!result.rows[0].has_error);

    let payment = db::fetch_payment(&pool, payment_id).await.unwrap();
    assert_eq!(payment.ournumber.as_deref(), Some("000000000099"));
    assert_eq!(payment.dropped_type, DroppedType::Registered);

    let jobs: Vec<(String, i64)> =
        sqlx::query_as("SELECT kind, payment_id FROM outbox ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(jobs, vec![("billet_submission".to_string(), payment_id)]);
}

#[tokio::test]
async fn guarded_transition_is_journaled_but_not_applied() {
    let pool = setup_pool().await;
    let storage = tempfile::tempdir().unwrap();
    let payment_id = seed_payment(&pool, 1234, Some("000000000011")).await;

    // Settle the payment, then replay the same liquidation.
    let first = return_file(&[detail_line(
        "000000000011",
        "06",
        "1234-5",
        15000,
        15000,
        "0000000000",
        2,
    )]);
    processor::process_return_file(&pool, storage.path(), 1, &first, "RET1.TXT")
        .await
        .unwrap();

    let second = return_file(&[detail_line(
        "000000000011",
        "06",
        "1234-5",
        15000,
        15000,
        "0000000000",
        2,
    )]);
    let result = processor::process_return_file(&pool, storage.path(), 1, &second, "RET2.TXT")
        .await
        .unwrap();
    assert!(result.rows[0].occurrence.contains("Ignoring change"));
    assert!(!result.rows[0].has_error);

    let payment = db::fetch_payment(&pool, payment_id).await.unwrap();
    assert_eq!(payment.situation, PaymentSituation::Paid);
    assert_eq!(payment.paid_value_cents, 15000);

    let journaled: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM occurrences WHERE payment_id = ?")
            .bind(payment_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(journaled, 2);

    // No second receipt for the replay.
    let receipts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(receipts, 1);
}

#[tokio::test]
async fn unresolved_transaction_does_not_stop_the_batch() {
    let pool = setup_pool().await;
    let storage = tempfile::tempdir().unwrap();
    let payment_id = seed_payment(&pool, 1234, Some("000000000011")).await;

    let file = return_file(&[
        detail_line("000000000777", "06", "NADA", 9900, 9900, "0000000000", 2),
        detail_line("000000000011", "06", "1234-5", 15000, 15000, "0000000000", 3),
    ]);

    let result = processor::process_return_file(&pool, storage.path(), 1, &file, "RET.TXT")
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 2);
    assert!(result.rows[0].has_error);
    assert!(result.rows[0].occurrence.contains("não localizado"));
    assert_eq!(result.rows[0].customername, "");
    assert!(!result.rows[1].has_error);

    // Only the resolved transaction reaches the journal.
    let journaled: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM occurrences")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(journaled, 1);

    let payment = db::fetch_payment(&pool, payment_id).await.unwrap();
    assert_eq!(payment.situation, PaymentSituation::Paid);
}

#[tokio::test]
async fn database_error_rolls_back_the_whole_file() {
    let pool = setup_pool().await;
    let storage = tempfile::tempdir().unwrap();
    let payment_id = seed_payment(&pool, 1234, Some("000000000011")).await;

    // Force a mid-batch failure at the journaling step.
    sqlx::query("DROP TABLE occurrences")
        .execute(&pool)
        .await
        .unwrap();

    let file = return_file(&[detail_line(
        "000000000011",
        "06",
        "1234-5",
        15000,
        15000,
        "0000000000",
        2,
    )]);
    let err = processor::process_return_file(&pool, storage.path(), 1, &file, "RET.TXT")
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Db(_)));

    let payment = db::fetch_payment(&pool, payment_id).await.unwrap();
    assert_eq!(payment.situation, PaymentSituation::Receivable);
    assert_eq!(payment.paid_value_cents, 0);

    let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transmission_files")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(files, 0);
    assert!(!current_month_dir(storage.path(), 1).join("RET.TXT").exists());
}

#[tokio::test]
async fn lapse_of_term_drop_keeps_title_receivable() {
    let pool = setup_pool().await;
    let storage = tempfile::tempdir().unwrap();
    let payment_id = seed_payment(&pool, 1234, Some("000000000011")).await;

    // Motive 20 carries "Baixado por decurso de prazo".
    let file = return_file(&[detail_line(
        "000000000011",
        "09",
        "1234-5",
        15000,
        0,
        "2000000000",
        2,
    )]);
    processor::process_return_file(&pool, storage.path(), 1, &file, "RET.TXT")
        .await
        .unwrap();

    let payment = db::fetch_payment(&pool, payment_id).await.unwrap();
    assert_eq!(payment.situation, PaymentSituation::Receivable);
    assert_eq!(
        payment.dropped_type,
        DroppedType::DroppedBecauseLapseOfTerm
    );
}

#[tokio::test]
async fn shipping_file_registers_open_titles() {
    let pool = setup_pool().await;
    let storage = tempfile::tempdir().unwrap();
    let cfg = {
        let mut cfg: config::Config = serde_yaml::from_str(config::example()).unwrap();
        cfg.app.storage_root = storage.path().to_string_lossy().to_string();
        cfg
    };
    let payment_id = seed_payment(&pool, 1234, None).await;

    let today = Utc::now().date_naive();
    let summary = processor::generate_shipping_file(&pool, &cfg, 1, "Tracker Corp", today)
        .await
        .unwrap()
        .expect("titles awaiting registration");
    assert_eq!(summary.titles, 1);

    let payment = db::fetch_payment(&pool, payment_id).await.unwrap();
    let assigned = payment.ournumber.expect("identification number assigned");
    assert_eq!(assigned.len(), 12);

    let archived = current_month_dir(storage.path(), 1).join(&summary.filename);
    let content = std::fs::read_to_string(archived).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.len() == RECORD_LEN));
    assert_eq!(&lines[1][70..82], assigned);

    let shipping: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transmission_files WHERE is_return = 0",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(shipping, 1);

    // The title is out with the bank; a second run has nothing to register.
    let open = db::list_unregistered_payments(&pool, 1).await.unwrap();
    assert!(open.is_empty());
    let second = processor::generate_shipping_file(&pool, &cfg, 1, "Tracker Corp", today)
        .await
        .unwrap();
    assert!(second.is_none());
}
