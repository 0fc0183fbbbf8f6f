//! CNAB400 fixed-width codec: return-file (retorno) parsing and
//! shipping-file (remessa) generation.
//!
//! CNAB400 records are 400-column ASCII lines. Field positions in the
//! submodules are 1-based inclusive, the way bank manuals state them.

pub mod remessa;
pub mod retorno;

use chrono::NaiveDate;
use thiserror::Error;

pub const RECORD_LEN: usize = 400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CnabError {
    #[error("record {0} has {1} columns, expected {RECORD_LEN}")]
    BadRecordLength(usize, usize),
    #[error("record {0} has unknown type {1:?}")]
    UnknownRecordType(usize, char),
    #[error("record {0} contains non-ASCII data")]
    NotAscii(usize),
    #[error("file does not start with a header record")]
    MissingHeader,
    #[error("file has no records")]
    Empty,
    #[error("record {0}: field {1} is not numeric: {2:?}")]
    BadNumber(usize, &'static str, String),
}

/// Slice a 1-based inclusive column range out of a record.
pub(crate) fn field(line: &str, start: usize, end: usize) -> &str {
    &line[start - 1..end]
}

/// Parse a zero-padded numeric field; all-blank fields read as zero.
pub(crate) fn num_field(
    line: &str,
    start: usize,
    end: usize,
    record: usize,
    name: &'static str,
) -> Result<i64, CnabError> {
    let raw = field(line, start, end).trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<i64>()
        .map_err(|_| CnabError::BadNumber(record, name, raw.to_string()))
}

/// Parse a DDMMYY date field; zeros or blanks read as None. Years map to
/// 2000-2099, which covers every file this system exchanges.
pub(crate) fn date_field(line: &str, start: usize, end: usize) -> Option<NaiveDate> {
    let raw = field(line, start, end).trim();
    if raw.is_empty() || raw.chars().all(|c| c == '0') {
        return None;
    }
    if raw.len() != 6 {
        return None;
    }
    let day: u32 = raw[0..2].parse().ok()?;
    let month: u32 = raw[2..4].parse().ok()?;
    let year: i32 = raw[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// Left-justified alphanumeric field, space padded, truncated to width.
pub(crate) fn pad_alpha(value: &str, width: usize) -> String {
    let upper = value.to_uppercase();
    let mut out: String = upper.chars().take(width).collect();
    while out.len() < width {
        out.push(' ');
    }
    out
}

/// Right-justified numeric field, zero padded, truncated to width.
pub(crate) fn pad_num(value: i64, width: usize) -> String {
    let s = format!("{:0width$}", value.max(0), width = width);
    if s.len() > width {
        s[s.len() - width..].to_string()
    } else {
        s
    }
}
