//! CNAB400 shipping-file (remessa) writer.
//!
//! Emits the registration file that places open titles in bank collection.
//! Shared fields sit at the same columns the return layout uses: bank
//! identification number at 71..82, occurrence code at 109..110. Remessa-
//! specific fields: document number 111..120, due date 121..126, title value
//! 127..139, payer name 235..264.

use super::{pad_alpha, pad_num, RECORD_LEN};
use crate::billet;
use crate::config::Bank;
use chrono::NaiveDate;

/// Remessa occurrence 01: register the title ("remessa de entrada").
const OCCURRENCE_REGISTER: &str = "01";

/// One title to be registered with the bank.
#[derive(Debug, Clone)]
pub struct RemessaTitle {
    /// Sequential component of the bank identification number.
    pub our_sequence: u64,
    pub document_number: String,
    pub due_date: NaiveDate,
    pub value_cents: i64,
    pub payer_name: String,
}

fn blank_record(kind: u8) -> Vec<u8> {
    let mut line = vec![b' '; RECORD_LEN];
    line[0] = kind;
    line
}

fn put(line: &mut [u8], start: usize, value: &str) {
    let bytes = value.as_bytes();
    line[start - 1..start - 1 + bytes.len()].copy_from_slice(bytes);
}

/// Build a complete shipping file for the given titles. Record sequence
/// numbers are 1-based over the whole file, header and trailer included.
pub fn build(
    bank: &Bank,
    company_name: &str,
    titles: &[RemessaTitle],
    file_sequence: u32,
    generated_on: NaiveDate,
) -> String {
    let mut out = String::new();
    let mut record = 1u32;

    let mut header = blank_record(b'0');
    put(&mut header, 2, "1REMESSA01");
    put(&mut header, 12, &pad_alpha("COBRANCA", 15));
    put(&mut header, 27, &pad_num(bank.agency as i64, 4));
    put(&mut header, 31, &pad_num(bank.account as i64, 7));
    put(&mut header, 47, &pad_alpha(company_name, 30));
    put(&mut header, 77, &pad_num(bank.code as i64, 3));
    put(&mut header, 95, &generated_on.format("%d%m%y").to_string());
    put(&mut header, 108, &pad_num(file_sequence as i64, 7));
    put(&mut header, 395, &pad_num(record as i64, 6));
    out.push_str(&String::from_utf8(header).expect("remessa records are ASCII"));
    out.push('\n');

    for title in titles {
        record += 1;
        let mut detail = blank_record(b'1');
        put(&mut detail, 18, &pad_num(bank.wallet as i64, 3));
        put(&mut detail, 21, &pad_num(bank.agency as i64, 5));
        put(&mut detail, 26, &pad_num(bank.account as i64, 8));
        put(
            &mut detail,
            71,
            &billet::identification_digits(bank.wallet, title.our_sequence),
        );
        put(&mut detail, 109, OCCURRENCE_REGISTER);
        put(&mut detail, 111, &pad_alpha(&title.document_number, 10));
        put(&mut detail, 121, &title.due_date.format("%d%m%y").to_string());
        put(&mut detail, 127, &pad_num(title.value_cents, 13));
        put(&mut detail, 140, &pad_num(bank.code as i64, 3));
        put(&mut detail, 235, &pad_alpha(&title.payer_name, 30));
        put(&mut detail, 395, &pad_num(record as i64, 6));
        out.push_str(&String::from_utf8(detail).expect("remessa records are ASCII"));
        out.push('\n');
    }

    record += 1;
    let mut trailer = blank_record(b'9');
    put(&mut trailer, 395, &pad_num(record as i64, 6));
    out.push_str(&String::from_utf8(trailer).expect("remessa records are ASCII"));
    out.push('\n');

    out
}

/// Conventional remessa filename: `CBDDMMNN.REM` (day, month, daily sequence).
pub fn filename(generated_on: NaiveDate, file_sequence: u32) -> String {
    format!(
        "CB{}{:02}.REM",
        generated_on.format("%d%m"),
        file_sequence % 100
    )
}
