//! Order-code normalization and classification.
//!
//! Every input channel (camera decode, OCR text, typed entry) funnels through
//! [`classify`] so a code means the same thing regardless of where it came from.

mod classifier;
mod manual;
mod ocr_extract;

pub use classifier::{classify, normalize, SEPARATOR, SHORT_CODE_LEN};
pub use manual::{parse_manual, ManualEntryBuffer, MANUAL_MAX_LEN};
pub use ocr_extract::{extract_candidate, is_denylisted, OcrExtraction, OCR_DENYLIST};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unvalidated input as produced by a decoder, OCR or the keyboard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawCode(String);

impl RawCode {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A classified order code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Code {
    /// Six character human-readable code printed on tickets
    ShortCode(String),
    /// Full-length identifier (UUID style) from older tickets
    LongIdentifier(String),
}

impl Code {
    pub fn as_str(&self) -> &str {
        match self {
            Code::ShortCode(value) | Code::LongIdentifier(value) => value,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Code::ShortCode(_) => "short_code",
            Code::LongIdentifier(_) => "long_identifier",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a candidate entered the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Camera,
    Ocr,
    Manual,
}

impl Origin {
    /// Classification rejects are expected noise on the camera path only
    pub fn logs_rejects(&self) -> bool {
        !matches!(self, Origin::Camera)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::Camera => "camera",
            Origin::Ocr => "ocr",
            Origin::Manual => "manual",
        };
        f.write_str(name)
    }
}
