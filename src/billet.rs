//! Banking billet (boleto) number construction: check digits, the 44-digit
//! barcode and the 47-digit typeable line, and the bank identification
//! number ("nosso número") verification digit.
//!
//! All functions are pure and operate on ASCII digit strings; money is
//! integer centavos throughout.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BilletError {
    #[error("non-digit character in numeric field: {0:?}")]
    NonDigit(char),
    #[error("due date {0} is before the baseline the date factor can express")]
    DateOutOfRange(NaiveDate),
    #[error("barcode must be 44 digits, got {0}")]
    BadBarcodeLength(usize),
}

fn digits_of(s: &str) -> Result<Vec<u32>, BilletError> {
    s.chars()
        .map(|c| c.to_digit(10).ok_or(BilletError::NonDigit(c)))
        .collect()
}

/// FEBRABAN modulo-10 check digit: weights 2,1 alternating from the right,
/// products above 9 reduced by digit sum.
pub fn mod10_check_digit(field: &str) -> Result<u8, BilletError> {
    let digits = digits_of(field)?;
    let mut sum = 0u32;
    for (i, d) in digits.iter().rev().enumerate() {
        let weight = if i % 2 == 0 { 2 } else { 1 };
        let mut product = d * weight;
        if product > 9 {
            product = product / 10 + product % 10;
        }
        sum += product;
    }
    Ok(((10 - sum % 10) % 10) as u8)
}

/// FEBRABAN modulo-11 general check digit for the barcode: weights 2..=9
/// cycling from the right; results 0, 10 and 11 normalize to 1.
pub fn mod11_check_digit(field: &str) -> Result<u8, BilletError> {
    let digits = digits_of(field)?;
    let mut sum = 0u32;
    for (i, d) in digits.iter().rev().enumerate() {
        let weight = 2 + (i as u32 % 8);
        sum += d * weight;
    }
    let dv = 11 - (sum % 11);
    Ok(if dv >= 10 { 1 } else { dv as u8 })
}

/// Verification digit of the bank identification number, computed over
/// wallet (2 digits) + sequential number (11 digits) with weights 2..=7
/// cycling from the right. Remainder 1 maps to 'P', remainder 0 to '0'.
pub fn our_number_check_digit(wallet: u8, sequence: u64) -> char {
    let base = format!("{:02}{:011}", wallet, sequence);
    let mut sum = 0u64;
    for (i, c) in base.chars().rev().enumerate() {
        let d = c.to_digit(10).unwrap_or(0) as u64;
        let weight = 2 + (i as u64 % 6);
        sum += d * weight;
    }
    match sum % 11 {
        0 => '0',
        1 => 'P',
        rem => char::from_digit((11 - rem) as u32, 10).unwrap_or('0'),
    }
}

/// Formatted bank identification number: `WW/NNNNNNNNNNN-D`.
pub fn build_identification_number(wallet: u8, sequence: u64) -> String {
    format!(
        "{:02}/{:011}-{}",
        wallet,
        sequence,
        our_number_check_digit(wallet, sequence)
    )
}

/// Unformatted 12-character identification number (11-digit sequence plus
/// verification digit) as it travels inside CNAB records.
pub fn identification_digits(wallet: u8, sequence: u64) -> String {
    format!("{:011}{}", sequence, our_number_check_digit(wallet, sequence))
}

/// Due-date factor: days since 1997-10-07, wrapping back to 1000 after 9999
/// (the cycle restarted on 2025-02-22). Dates the factor cannot express
/// (before 2000-07-03) are rejected.
pub fn due_date_factor(due: NaiveDate) -> Result<u16, BilletError> {
    let base = NaiveDate::from_ymd_opt(1997, 10, 7).unwrap();
    let mut days = (due - base).num_days();
    if days < 1000 {
        return Err(BilletError::DateOutOfRange(due));
    }
    while days > 9999 {
        days -= 9000;
    }
    Ok(days as u16)
}

/// Assemble the 44-digit barcode: bank (3), currency '9', general DV,
/// due-date factor (4), value in centavos (10), bank-specific free field (25).
pub fn barcode(
    bank_code: u16,
    due: NaiveDate,
    value_cents: i64,
    free_field: &str,
) -> Result<String, BilletError> {
    let factor = due_date_factor(due)?;
    let body = format!(
        "{:03}9{:04}{:010}{}",
        bank_code,
        factor,
        value_cents.max(0),
        free_field
    );
    // body is the 43-digit barcode without its DV slot
    let dv = mod11_check_digit(&body)?;
    Ok(format!("{}{}{}", &body[..4], dv, &body[4..]))
}

/// Derive the 47-digit typeable line ("linha digitável") from a barcode,
/// formatted the way billet prints show it.
pub fn digitable_line(barcode: &str) -> Result<String, BilletError> {
    if barcode.len() != 44 {
        return Err(BilletError::BadBarcodeLength(barcode.len()));
    }
    digits_of(barcode)?;
    let bank_currency = &barcode[..4];
    let dv = &barcode[4..5];
    let factor_value = &barcode[5..19];
    let free = &barcode[19..44];

    let field1 = format!("{}{}", bank_currency, &free[..5]);
    let field2 = &free[5..15];
    let field3 = &free[15..25];
    let d1 = mod10_check_digit(&field1)?;
    let d2 = mod10_check_digit(field2)?;
    let d3 = mod10_check_digit(field3)?;

    Ok(format!(
        "{}.{}{} {}.{}{} {}.{}{} {} {}",
        &field1[..5],
        &field1[5..],
        d1,
        &field2[..5],
        &field2[5..],
        d2,
        &field3[..5],
        &field3[5..],
        d3,
        dv,
        factor_value
    ))
}
