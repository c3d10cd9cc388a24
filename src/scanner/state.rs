use crate::code::{Code, Origin, RawCode};
use crate::error::ScanError;
use crate::registry::{Eligibility, OrderRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

/// Discriminant of [`ScanState`], used in events and snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Idle,
    Recognizing,
    CandidateFound,
    LookupPending,
    Resolved,
    Cooldown,
    AwaitingOperator,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Idle => "idle",
            StateKind::Recognizing => "recognizing",
            StateKind::CandidateFound => "candidate_found",
            StateKind::LookupPending => "lookup_pending",
            StateKind::Resolved => "resolved",
            StateKind::Cooldown => "cooldown",
            StateKind::AwaitingOperator => "awaiting_operator",
        };
        f.write_str(name)
    }
}

/// One decode/classification cycle that produced a candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAttempt {
    pub id: Uuid,
    pub origin: Origin,
    pub raw: RawCode,
    pub code: Code,
    pub started_at: Instant,
    pub timestamp: DateTime<Utc>,
}

impl ScanAttempt {
    pub fn new(origin: Origin, raw: RawCode, code: Code) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            raw,
            code,
            started_at: Instant::now(),
            timestamp: Utc::now(),
        }
    }
}

/// What the registry said about a candidate
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Found(OrderRecord),
    NotFound(RawCode),
    TransientError { details: String },
}

/// Terminal outcome of an attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Success {
        record: OrderRecord,
        eligibility: Eligibility,
    },
    NotFound,
    TransientError {
        details: String,
    },
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        matches!(self, Resolution::Success { .. })
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            Resolution::Success { record, .. } => Some(&record.id),
            _ => None,
        }
    }

    /// The user-visible error this outcome maps to, if any
    pub fn scan_error(&self, raw: &RawCode) -> Option<ScanError> {
        match self {
            Resolution::Success { .. } => None,
            Resolution::NotFound => Some(ScanError::RegistryNotFound {
                raw: raw.to_string(),
            }),
            Resolution::TransientError { details } => Some(ScanError::RegistryTransientError {
                raw: raw.to_string(),
                details: details.clone(),
            }),
        }
    }
}

/// Identity a cooldown window suppresses.
///
/// Holds the classified code and, once a record resolved, that record's id, so
/// a ticket's short code and its long identifier count as the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey {
    code: Code,
    record_id: Option<String>,
}

impl DedupKey {
    pub fn new(code: Code, record_id: Option<String>) -> Self {
        Self { code, record_id }
    }

    pub fn covers(&self, code: &Code) -> bool {
        if self.code == *code {
            return true;
        }
        match (code, &self.record_id) {
            (Code::LongIdentifier(id), Some(record_id)) => id.eq_ignore_ascii_case(record_id),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &str {
        self.record_id.as_deref().unwrap_or_else(|| self.code.as_str())
    }
}

/// The scanner's state. Each variant carries only what that state needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    Idle,
    Recognizing,
    CandidateFound { attempt: ScanAttempt },
    LookupPending { attempt: ScanAttempt },
    Resolved { attempt: ScanAttempt, resolution: Resolution },
    /// `hold` keeps a success on screen after expiry until the operator continues
    Cooldown { hold: bool },
    AwaitingOperator { record: OrderRecord },
}

impl ScanState {
    pub fn kind(&self) -> StateKind {
        match self {
            ScanState::Idle => StateKind::Idle,
            ScanState::Recognizing => StateKind::Recognizing,
            ScanState::CandidateFound { .. } => StateKind::CandidateFound,
            ScanState::LookupPending { .. } => StateKind::LookupPending,
            ScanState::Resolved { .. } => StateKind::Resolved,
            ScanState::Cooldown { .. } => StateKind::Cooldown,
            ScanState::AwaitingOperator { .. } => StateKind::AwaitingOperator,
        }
    }
}

/// Published view of the scanner for observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: StateKind,
    pub decode_misses: u32,
    pub ocr_ready: bool,
    pub cooldown_key: Option<String>,
    pub last_resolution: Option<crate::audit::AuditRecord>,
    pub served_orders: usize,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            state: StateKind::Idle,
            decode_misses: 0,
            ocr_ready: false,
            cooldown_key: None,
            last_resolution: None,
            served_orders: 0,
        }
    }
}
