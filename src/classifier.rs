//! Occurrence classifier: raw bank occurrence codes to semantic types.
//!
//! The code table follows the CNAB400 return manual used by the collecting
//! bank. Codes not in the table classify as `Error`, which downstream flags
//! on the payment instead of aborting the batch.

use crate::model::OccurrenceType;

/// Map a raw two-digit occurrence code to its semantic type. Total function;
/// unrecognized codes default to `OccurrenceType::Error`.
pub fn classify(code: u8) -> OccurrenceType {
    match code {
        2 => OccurrenceType::Entry,
        3 => OccurrenceType::Error, // entry rejected by the bank
        6 | 15 | 17 => OccurrenceType::Liquidated,
        9 | 10 => OccurrenceType::Dropped,
        12 => OccurrenceType::Abatement,
        13 => OccurrenceType::Unabatement,
        14 => OccurrenceType::Change,
        19 => OccurrenceType::Protested,
        20 => OccurrenceType::Unprotested,
        65 => OccurrenceType::CreditBlocked,
        66 => OccurrenceType::CreditUnblocked,
        28 => OccurrenceType::Tariff,
        21 | 23 | 24 | 27 => OccurrenceType::Others,
        _ => OccurrenceType::Error,
    }
}

/// Human-readable description for known occurrence codes, used when the
/// return file carries none.
pub fn describe(code: u8) -> &'static str {
    match code {
        2 => "Entrada confirmada",
        3 => "Entrada rejeitada",
        6 => "Liquidação normal",
        9 => "Baixado automaticamente via arquivo",
        10 => "Baixado conforme instruções da agência",
        12 => "Abatimento concedido",
        13 => "Abatimento cancelado",
        14 => "Vencimento alterado",
        15 => "Liquidação em cartório",
        17 => "Liquidação após baixa",
        19 => "Confirmação de instrução de protesto",
        20 => "Confirmação de sustação de protesto",
        21 => "Acerto do controle do participante",
        23 => "Entrada do título em cartório",
        24 => "Entrada rejeitada por CEP irregular",
        27 => "Baixa rejeitada",
        28 => "Débito de tarifas e custas",
        65 => "Confirmação de inclusão de negativação",
        66 => "Confirmação de exclusão de negativação",
        _ => "Ocorrência não reconhecida",
    }
}
