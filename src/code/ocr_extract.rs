use super::classifier::{classify, SEPARATOR, SHORT_CODE_LEN};
use super::{Code, RawCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Interface words printed or displayed around a ticket code.
///
/// A real code that happens to equal one of these can never be read through OCR;
/// such skips are reported in [`OcrExtraction`] rather than papered over.
pub const OCR_DENYLIST: &[&str] = &[
    "TICKET", "ORDER", "CODE", "CODIGO", "SEU", "PEDIDO", "APRESENTE", "RETIRADA",
    "PENDING", "CONFIRMED", "CANCELED", "PENDENTE", "CONFIRMADO", "CANCELADO",
    "MENU", "CARDAPIO", "PRATO", "ALMOCO", "JANTAR",
];

/// Result of running the extraction heuristic over one OCR text blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OcrExtraction {
    Candidate {
        code: Code,
        /// Token exactly as the OCR service produced it
        token: String,
        token_index: usize,
        /// Six character tokens skipped only because they were denylisted
        skipped_denylisted: Vec<String>,
    },
    NotFound {
        raw_text: String,
        skipped_denylisted: Vec<String>,
    },
}

impl OcrExtraction {
    pub fn code(&self) -> Option<&Code> {
        match self {
            OcrExtraction::Candidate { code, .. } => Some(code),
            OcrExtraction::NotFound { .. } => None,
        }
    }

    pub fn skipped_denylisted(&self) -> &[String] {
        match self {
            OcrExtraction::Candidate {
                skipped_denylisted, ..
            }
            | OcrExtraction::NotFound {
                skipped_denylisted, ..
            } => skipped_denylisted,
        }
    }
}

pub fn is_denylisted(normalized: &str) -> bool {
    OCR_DENYLIST.contains(&normalized)
}

/// Pick an order code out of multi-line OCR text.
///
/// The first qualifying six character token wins, in reading order; only when
/// there is none does the first long separator-bearing token get a chance.
pub fn extract_candidate(text: &str) -> OcrExtraction {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut skipped_denylisted = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        let normalized: String = token
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.len() != SHORT_CODE_LEN {
            continue;
        }

        if is_denylisted(&normalized) {
            debug!("OCR token '{}' skipped: denylisted interface word", token);
            skipped_denylisted.push(normalized);
            continue;
        }

        return OcrExtraction::Candidate {
            code: Code::ShortCode(normalized),
            token: token.to_string(),
            token_index: index,
            skipped_denylisted,
        };
    }

    for (index, token) in tokens.iter().enumerate() {
        if token.len() <= 20 || !token.contains(SEPARATOR) {
            continue;
        }

        if let Some(code @ Code::LongIdentifier(_)) = classify(&RawCode::new(*token)) {
            return OcrExtraction::Candidate {
                code,
                token: token.to_string(),
                token_index: index,
                skipped_denylisted,
            };
        }
    }

    OcrExtraction::NotFound {
        raw_text: text.to_string(),
        skipped_denylisted,
    }
}
