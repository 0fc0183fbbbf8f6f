//! CNAB400 return-file (retorno) parser.
//!
//! Layout (1-based inclusive columns, detail record type '1'):
//! 71..82 bank identification number, 109..110 occurrence code,
//! 111..116 occurrence date, 117..126 document number, 147..152 due date,
//! 153..165 title value, 176..188 collection tariff, 228..240 abatement,
//! 254..266 paid value, 267..279 late-payment interest, 280..292 fine,
//! 296..301 credit date, 319..328 reason codes (five 2-digit motives),
//! 395..400 record sequence. All money fields are centavos.

use super::{date_field, field, num_field, CnabError, RECORD_LEN};
use crate::classifier;
use chrono::NaiveDate;

/// One parsed detail record of a return file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnTransaction {
    pub sequence: i64,
    pub bank_identification_number: String,
    pub document_number: String,
    pub occurrence_code: u8,
    pub occurrence_description: String,
    pub reasons: Vec<String>,
    pub occurrence_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub title_value_cents: i64,
    pub tariff_cents: i64,
    pub abatement_cents: i64,
    pub paid_value_cents: i64,
    pub late_interest_cents: i64,
    pub fine_cents: i64,
    pub credit_date: Option<NaiveDate>,
}

/// A parsed return file: header data plus its detail records in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnFile {
    pub bank_code: u16,
    pub generated_on: Option<NaiveDate>,
    pub transactions: Vec<ReturnTransaction>,
}

/// Parse a whole return file. Record order is preserved; the trailer record
/// carries no data this system uses.
pub fn parse(content: &str) -> Result<ReturnFile, CnabError> {
    let mut header: Option<(u16, Option<NaiveDate>)> = None;
    let mut transactions = Vec::new();
    let mut saw_any = false;

    for (idx, raw) in content.lines().enumerate() {
        let record = idx + 1;
        let line = raw.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        saw_any = true;
        if !line.is_ascii() {
            return Err(CnabError::NotAscii(record));
        }
        if line.len() != RECORD_LEN {
            return Err(CnabError::BadRecordLength(record, line.len()));
        }
        let kind = line.chars().next().unwrap_or(' ');
        match kind {
            '0' => {
                let bank = num_field(line, 77, 79, record, "bank code")? as u16;
                let generated_on = date_field(line, 95, 100);
                header = Some((bank, generated_on));
            }
            '1' => {
                if header.is_none() {
                    return Err(CnabError::MissingHeader);
                }
                transactions.push(parse_detail(line, record)?);
            }
            '9' => {}
            other => return Err(CnabError::UnknownRecordType(record, other)),
        }
    }

    if !saw_any {
        return Err(CnabError::Empty);
    }
    let (bank_code, generated_on) = header.ok_or(CnabError::MissingHeader)?;
    Ok(ReturnFile {
        bank_code,
        generated_on,
        transactions,
    })
}

fn parse_detail(line: &str, record: usize) -> Result<ReturnTransaction, CnabError> {
    let occurrence_code = num_field(line, 109, 110, record, "occurrence code")? as u8;
    Ok(ReturnTransaction {
        sequence: num_field(line, 395, 400, record, "sequence")?,
        bank_identification_number: field(line, 71, 82).trim().to_string(),
        document_number: field(line, 117, 126).trim().to_string(),
        occurrence_code,
        occurrence_description: classifier::describe(occurrence_code).to_string(),
        reasons: parse_reasons(line),
        occurrence_date: date_field(line, 111, 116),
        due_date: date_field(line, 147, 152),
        title_value_cents: num_field(line, 153, 165, record, "title value")?,
        tariff_cents: num_field(line, 176, 188, record, "tariff")?,
        abatement_cents: num_field(line, 228, 240, record, "abatement")?,
        paid_value_cents: num_field(line, 254, 266, record, "paid value")?,
        late_interest_cents: num_field(line, 267, 279, record, "late interest")?,
        fine_cents: num_field(line, 280, 292, record, "fine")?,
        credit_date: date_field(line, 296, 301),
    })
}

fn parse_reasons(line: &str) -> Vec<String> {
    let raw = field(line, 319, 328);
    let mut reasons = Vec::new();
    for i in 0..5 {
        let code = &raw[i * 2..i * 2 + 2];
        if code == "00" || code.trim().is_empty() {
            continue;
        }
        reasons.push(motive_text(code));
    }
    reasons
}

/// Motive texts for the two-digit reason codes the bank reports alongside
/// rejection and drop occurrences.
fn motive_text(code: &str) -> String {
    match code {
        "01" => "Código do banco inválido".to_string(),
        "02" => "Código do registro detalhe inválido".to_string(),
        "03" => "Código da ocorrência inválida".to_string(),
        "04" => "Valor do título inválido".to_string(),
        "05" => "Data de vencimento inválida".to_string(),
        "08" => "Nosso número inválido".to_string(),
        "09" => "Baixa comandada pelo banco".to_string(),
        "10" => "Baixa comandada pelo cliente".to_string(),
        "16" => "CEP do pagador irregular".to_string(),
        "20" => "Baixado por decurso de prazo".to_string(),
        other => format!("Motivo {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(line: &mut [u8], start: usize, value: &str) {
        line[start - 1..start - 1 + value.len()].copy_from_slice(value.as_bytes());
    }

    fn header_line() -> String {
        let mut line = vec![b' '; RECORD_LEN];
        line[0] = b'0';
        put(&mut line, 2, "2RETORNO");
        put(&mut line, 77, "237");
        put(&mut line, 95, "150326");
        String::from_utf8(line).unwrap()
    }

    fn detail_line(
        ournumber: &str,
        occurrence: &str,
        document: &str,
        value: &str,
        paid: &str,
        reasons: &str,
        seq: &str,
    ) -> String {
        let mut line = vec![b' '; RECORD_LEN];
        line[0] = b'1';
        put(&mut line, 71, ournumber);
        put(&mut line, 109, occurrence);
        put(&mut line, 111, "140326");
        put(&mut line, 117, document);
        put(&mut line, 147, "100326");
        put(&mut line, 153, value);
        put(&mut line, 176, "0000000000120");
        put(&mut line, 254, paid);
        put(&mut line, 296, "160326");
        put(&mut line, 319, reasons);
        put(&mut line, 395, seq);
        String::from_utf8(line).unwrap()
    }

    fn trailer_line() -> String {
        let mut line = vec![b' '; RECORD_LEN];
        line[0] = b'9';
        String::from_utf8(line).unwrap()
    }

    #[test]
    fn parses_header_and_detail() {
        let file = format!(
            "{}\n{}\n{}\n",
            header_line(),
            detail_line(
                "000000000011",
                "06",
                "1234-5",
                "0000000015000",
                "0000000015000",
                "0000000000",
                "000002",
            ),
            trailer_line(),
        );
        let parsed = parse(&file).unwrap();
        assert_eq!(parsed.bank_code, 237);
        assert_eq!(
            parsed.generated_on,
            NaiveDate::from_ymd_opt(2026, 3, 15)
        );
        assert_eq!(parsed.transactions.len(), 1);
        let t = &parsed.transactions[0];
        assert_eq!(t.bank_identification_number, "000000000011");
        assert_eq!(t.document_number, "1234-5");
        assert_eq!(t.occurrence_code, 6);
        assert_eq!(t.title_value_cents, 15000);
        assert_eq!(t.paid_value_cents, 15000);
        assert_eq!(t.tariff_cents, 120);
        assert_eq!(t.credit_date, NaiveDate::from_ymd_opt(2026, 3, 16));
        assert!(t.reasons.is_empty());
        assert_eq!(t.sequence, 2);
    }

    #[test]
    fn reason_codes_map_to_texts() {
        let file = format!(
            "{}\n{}\n",
            header_line(),
            detail_line(
                "000000000022",
                "09",
                "77",
                "0000000009100",
                "0000000000000",
                "2000000000",
                "000002",
            ),
        );
        let parsed = parse(&file).unwrap();
        let t = &parsed.transactions[0];
        assert_eq!(t.reasons, vec!["Baixado por decurso de prazo".to_string()]);
    }

    #[test]
    fn unknown_motives_keep_their_code() {
        assert_eq!(motive_text("73"), "Motivo 73");
    }

    #[test]
    fn rejects_short_record() {
        let err = parse("0123\n").unwrap_err();
        assert_eq!(err, CnabError::BadRecordLength(1, 4));
    }

    #[test]
    fn rejects_detail_before_header() {
        let file = format!("{}\n", detail_line("1", "06", "1", "0", "0", "00", "000001"));
        assert_eq!(parse(&file).unwrap_err(), CnabError::MissingHeader);
    }

    #[test]
    fn rejects_unknown_record_type() {
        let mut line = vec![b' '; RECORD_LEN];
        line[0] = b'5';
        let file = format!("{}\n{}\n", header_line(), String::from_utf8(line).unwrap());
        assert_eq!(parse(&file).unwrap_err(), CnabError::UnknownRecordType(2, '5'));
    }

    #[test]
    fn empty_file_is_an_error() {
        assert_eq!(parse(""), Err(CnabError::Empty));
        assert_eq!(parse("\n\n"), Err(CnabError::Empty));
    }
}
