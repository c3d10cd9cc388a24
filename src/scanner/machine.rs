use super::cooldown::CooldownController;
use super::state::{
    DedupKey, Resolution, ScanAttempt, ScanState, StateKind, StateSnapshot, ValidationResult,
};
use crate::audit::AuditRecord;
use crate::code::{classify, parse_manual, Code, OcrExtraction, Origin, RawCode};
use crate::config::{ScannerConfig, SuccessPolicy};
use crate::error::{ScanError, ScannerError};
use crate::registry::OrderRecord;
use chrono::NaiveDate;
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, trace};

/// The scan state machine without any I/O.
///
/// Every transition goes through [`ScanMachine::transition`] and is queued for
/// the owner to publish; callers pass the current instant so the machine never
/// reads a clock itself.
#[derive(Debug)]
pub struct ScanMachine {
    state: ScanState,
    policy: SuccessPolicy,
    cooldown: CooldownController,
    ocr_min_decode_misses: u32,
    decode_misses: u32,
    last_success: Option<OrderRecord>,
    last_resolution: Option<AuditRecord>,
    served: HashSet<String>,
    transitions: Vec<(StateKind, StateKind)>,
}

impl ScanMachine {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            state: ScanState::Idle,
            policy: config.success_policy,
            cooldown: CooldownController::new(config.cooldown()),
            ocr_min_decode_misses: config.ocr_min_decode_misses,
            decode_misses: 0,
            last_success: None,
            last_resolution: None,
            served: HashSet::new(),
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ScanState::Idle)
    }

    pub fn decode_misses(&self) -> u32 {
        self.decode_misses
    }

    pub fn ocr_ready(&self) -> bool {
        self.decode_misses >= self.ocr_min_decode_misses
    }

    pub fn is_served(&self, order_id: &str) -> bool {
        self.served.contains(order_id)
    }

    /// When the running cooldown ends, if the machine is cooling down
    pub fn cooldown_deadline(&self) -> Option<Instant> {
        match self.state {
            ScanState::Cooldown { .. } => self.cooldown.deadline(),
            _ => None,
        }
    }

    pub fn take_transitions(&mut self) -> Vec<(StateKind, StateKind)> {
        std::mem::take(&mut self.transitions)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            state: self.kind(),
            decode_misses: self.decode_misses,
            ocr_ready: self.ocr_ready(),
            cooldown_key: self
                .cooldown_deadline()
                .and(self.cooldown.key())
                .map(|key| key.as_str().to_string()),
            last_resolution: self.last_resolution.clone(),
            served_orders: self.served.len(),
        }
    }

    fn transition(&mut self, next: ScanState) {
        let from = self.state.kind();
        let to = next.kind();
        trace!("Scan state {} -> {}", from, to);
        self.state = next;
        self.transitions.push((from, to));
    }

    fn candidate(&mut self, origin: Origin, raw: RawCode, code: Code) -> ScanAttempt {
        let attempt = ScanAttempt::new(origin, raw, code);
        debug!("Candidate {} from {} (attempt {})", attempt.code, origin, attempt.id);
        self.transition(ScanState::CandidateFound {
            attempt: attempt.clone(),
        });
        attempt
    }

    /// Leave Cooldown once its window has run out
    pub fn poll_cooldown(&mut self, now: Instant) -> bool {
        let ScanState::Cooldown { hold } = self.state else {
            return false;
        };

        let expired = self.cooldown.expire(now) || self.cooldown.deadline().is_none();
        if !expired {
            return false;
        }

        match (hold, self.last_success.clone()) {
            (true, Some(record)) => self.transition(ScanState::AwaitingOperator { record }),
            _ => self.transition(ScanState::Idle),
        }
        true
    }

    /// Feed one camera decode result. `Ok(None)` means the tick was skipped.
    pub fn on_decode(
        &mut self,
        raw: Option<RawCode>,
        now: Instant,
    ) -> Result<Option<ScanAttempt>, ScanError> {
        if !self.is_idle() {
            return Ok(None);
        }

        let Some(raw) = raw else {
            self.decode_misses = self.decode_misses.saturating_add(1);
            return Err(ScanError::DecodeMiss);
        };
        self.decode_misses = 0;

        let code = classify(&raw).ok_or_else(|| ScanError::ClassificationReject {
            raw: raw.to_string(),
        })?;

        if self.cooldown.suppresses(&code, now) {
            debug!("Candidate {} suppressed by cooldown", code);
            return Ok(None);
        }

        Ok(Some(self.candidate(Origin::Camera, raw, code)))
    }

    /// Typed entry. Input is checked before anything else and never reaches the
    /// registry when invalid.
    pub fn submit_manual(&mut self, input: &str, now: Instant) -> Result<ScanAttempt, ScannerError> {
        let raw = parse_manual(input).map_err(ScanError::from)?;
        let code = classify(&raw).ok_or_else(|| ScanError::ClassificationReject {
            raw: raw.to_string(),
        })?;

        match &self.state {
            ScanState::Idle => {}
            ScanState::Cooldown { .. } => {
                if self.cooldown.suppresses(&code, now) {
                    return Err(ScannerError::CooldownActive {
                        key: code.to_string(),
                    });
                }
                // A different order ends the pause early
                self.cooldown.clear();
                self.transition(ScanState::Idle);
            }
            ScanState::AwaitingOperator { .. } => self.transition(ScanState::Idle),
            other => {
                return Err(ScannerError::InvalidTransition {
                    command: "manual".to_string(),
                    state: other.kind().to_string(),
                })
            }
        }

        Ok(self.candidate(Origin::Manual, raw, code))
    }

    pub fn request_ocr(&mut self) -> Result<(), ScannerError> {
        if !self.is_idle() {
            return Err(ScannerError::InvalidTransition {
                command: "ocr".to_string(),
                state: self.kind().to_string(),
            });
        }

        if !self.ocr_ready() {
            return Err(ScannerError::OcrNotReady {
                required: self.ocr_min_decode_misses,
                current: self.decode_misses,
            });
        }

        self.transition(ScanState::Recognizing);
        Ok(())
    }

    pub fn finish_ocr(&mut self, extraction: &OcrExtraction) -> Result<ScanAttempt, ScanError> {
        self.abort_ocr();

        match extraction {
            OcrExtraction::Candidate { code, token, .. } => {
                Ok(self.candidate(Origin::Ocr, RawCode::new(token.clone()), code.clone()))
            }
            OcrExtraction::NotFound { raw_text, .. } => Err(ScanError::ClassificationReject {
                raw: raw_text.clone(),
            }),
        }
    }

    pub fn abort_ocr(&mut self) {
        if matches!(self.state, ScanState::Recognizing) {
            self.transition(ScanState::Idle);
        }
    }

    pub fn begin_lookup(&mut self) -> Option<ScanAttempt> {
        let ScanState::CandidateFound { attempt } = &self.state else {
            return None;
        };
        let attempt = attempt.clone();
        self.transition(ScanState::LookupPending {
            attempt: attempt.clone(),
        });
        Some(attempt)
    }

    /// Record the registry answer: Resolved, then straight into Cooldown
    pub fn resolve(
        &mut self,
        result: ValidationResult,
        today: NaiveDate,
        now: Instant,
    ) -> Option<AuditRecord> {
        let ScanState::LookupPending { attempt } = &self.state else {
            return None;
        };
        let attempt = attempt.clone();

        let resolution = match result {
            ValidationResult::Found(record) => Resolution::Success {
                eligibility: record.eligibility(today),
                record,
            },
            ValidationResult::NotFound(_) => Resolution::NotFound,
            ValidationResult::TransientError { details } => Resolution::TransientError { details },
        };

        let audit = AuditRecord::new(&attempt, &resolution, now);
        let key = DedupKey::new(
            attempt.code.clone(),
            resolution.order_id().map(str::to_string),
        );
        let hold = resolution.is_success() && self.policy == SuccessPolicy::OperatorContinue;

        // Serving applies only to the outcome currently on screen
        self.last_success = match &resolution {
            Resolution::Success { record, .. } => Some(record.clone()),
            _ => None,
        };

        self.transition(ScanState::Resolved { attempt, resolution });
        self.cooldown.enter(key, now);
        self.transition(ScanState::Cooldown { hold });

        self.decode_misses = 0;
        self.last_resolution = Some(audit.clone());
        Some(audit)
    }

    pub fn continue_scanning(&mut self) -> Result<(), ScannerError> {
        match self.state {
            ScanState::AwaitingOperator { .. } => {
                self.transition(ScanState::Idle);
                Ok(())
            }
            ScanState::Cooldown { hold: true } => {
                self.state = ScanState::Cooldown { hold: false };
                Ok(())
            }
            _ => Err(ScannerError::InvalidTransition {
                command: "continue".to_string(),
                state: self.kind().to_string(),
            }),
        }
    }

    /// Operator reset: drop everything in progress and scan again
    pub fn reset(&mut self) {
        self.cooldown.clear();
        self.decode_misses = 0;
        self.last_success = None;
        if !self.is_idle() {
            self.transition(ScanState::Idle);
        }
    }

    /// The order a serve confirmation would apply to
    pub fn serve_target(&self, today: NaiveDate) -> Result<OrderRecord, ScannerError> {
        let record = self
            .last_success
            .clone()
            .ok_or(ScannerError::NoResolvedOrder)?;

        if self.served.contains(&record.id) {
            return Err(ScannerError::AlreadyServed {
                order_id: record.id,
            });
        }

        let eligibility = record.eligibility(today);
        if !eligibility.is_ready() {
            return Err(ScannerError::NotEligible {
                order_id: record.id,
                reason: eligibility.describe(),
            });
        }

        Ok(record)
    }

    pub fn record_served(&mut self, record: &OrderRecord) {
        self.served.insert(record.id.clone());
        if let Some(last) = self.last_success.as_mut() {
            if last.id == record.id {
                *last = record.clone();
            }
        }
        if matches!(self.state, ScanState::AwaitingOperator { .. }) {
            self.transition(ScanState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManualInputError;
    use crate::registry::{Eligibility, OrderStatus};
    use std::time::Duration;

    fn config(policy: SuccessPolicy) -> ScannerConfig {
        ScannerConfig {
            tick_interval_ms: 300,
            cooldown_ms: 2500,
            lookup_timeout_ms: 5000,
            success_policy: policy,
            ocr_min_decode_misses: 3,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn order(id: &str, short: &str) -> OrderRecord {
        OrderRecord {
            id: id.to_string(),
            short_code: Some(short.to_string()),
            status: OrderStatus::Pending,
            consumption_date: today(),
            dish_ref: "dish".to_string(),
            holder_ref: "holder".to_string(),
        }
    }

    fn kinds(machine: &mut ScanMachine) -> Vec<StateKind> {
        let transitions = machine.take_transitions();
        let mut kinds = Vec::new();
        if let Some((from, _)) = transitions.first() {
            kinds.push(*from);
        }
        kinds.extend(transitions.iter().map(|(_, to)| *to));
        kinds
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_success_cycle() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        let attempt = machine
            .on_decode(Some(RawCode::new("k7q2xz")), now)
            .unwrap()
            .unwrap();
        assert_eq!(attempt.code, Code::ShortCode("K7Q2XZ".into()));
        assert_eq!(attempt.origin, Origin::Camera);

        machine.begin_lookup().unwrap();
        let audit = machine
            .resolve(ValidationResult::Found(order("o-1", "K7Q2XZ")), today(), now)
            .unwrap();
        assert_eq!(audit.order_id.as_deref(), Some("o-1"));
        assert!(matches!(
            audit.outcome,
            Resolution::Success {
                eligibility: Eligibility::Ready,
                ..
            }
        ));

        assert!(!machine.poll_cooldown(now + Duration::from_millis(2499)));
        assert!(machine.poll_cooldown(now + Duration::from_millis(2500)));

        assert_eq!(
            kinds(&mut machine),
            vec![
                StateKind::Idle,
                StateKind::CandidateFound,
                StateKind::LookupPending,
                StateKind::Resolved,
                StateKind::Cooldown,
                StateKind::Idle,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_is_ignored_outside_idle() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        machine.on_decode(Some(RawCode::new("K7Q2XZ")), now).unwrap();
        machine.begin_lookup();
        assert_eq!(
            machine.on_decode(Some(RawCode::new("K7Q2XZ")), now),
            Ok(None)
        );

        machine.resolve(ValidationResult::NotFound(RawCode::new("K7Q2XZ")), today(), now);
        assert_eq!(machine.kind(), StateKind::Cooldown);
        assert_eq!(
            machine.on_decode(Some(RawCode::new("K7Q2XZ")), now),
            Ok(None)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_misses_and_rejects() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(machine.on_decode(None, now), Err(ScanError::DecodeMiss));
        }
        assert!(machine.ocr_ready());

        let reject = machine.on_decode(Some(RawCode::new("hello")), now);
        assert!(matches!(reject, Err(ScanError::ClassificationReject { .. })));
        assert!(machine.is_idle());
        assert_eq!(machine.decode_misses(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_goes_to_cooldown() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::OperatorContinue));
        let now = Instant::now();

        machine.submit_manual("K7Q2XZ", now).unwrap();
        machine.begin_lookup();
        let audit = machine
            .resolve(
                ValidationResult::TransientError {
                    details: "timeout".into(),
                },
                today(),
                now,
            )
            .unwrap();
        assert!(audit.operator_message.is_some());
        assert_eq!(machine.kind(), StateKind::Cooldown);

        // No hold for failures, even under operator_continue
        assert!(machine.poll_cooldown(now + Duration::from_secs(3)));
        assert!(machine.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_continue_holds_success() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::OperatorContinue));
        let now = Instant::now();

        machine.submit_manual("K7Q2XZ", now).unwrap();
        machine.begin_lookup();
        machine.resolve(ValidationResult::Found(order("o-1", "K7Q2XZ")), today(), now);

        assert!(machine.poll_cooldown(now + Duration::from_secs(3)));
        assert_eq!(machine.kind(), StateKind::AwaitingOperator);
        assert_eq!(machine.on_decode(Some(RawCode::new("A1B2C3")), now), Ok(None));

        machine.continue_scanning().unwrap();
        assert!(machine.is_idle());
        assert!(machine.continue_scanning().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_during_cooldown_releases_hold() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::OperatorContinue));
        let now = Instant::now();

        machine.submit_manual("K7Q2XZ", now).unwrap();
        machine.begin_lookup();
        machine.resolve(ValidationResult::Found(order("o-1", "K7Q2XZ")), today(), now);
        machine.continue_scanning().unwrap();

        assert!(machine.poll_cooldown(now + Duration::from_secs(3)));
        assert!(machine.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_input_validation() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        assert_eq!(
            machine.submit_manual("", now),
            Err(ScannerError::Scan(ScanError::InvalidManualInput(
                ManualInputError::Empty
            )))
        );
        assert!(matches!(
            machine.submit_manual("A1B2C3D", now),
            Err(ScannerError::Scan(ScanError::InvalidManualInput(
                ManualInputError::TooLong { .. }
            )))
        ));
        assert!(matches!(
            machine.submit_manual("ABC", now),
            Err(ScannerError::Scan(ScanError::ClassificationReject { .. }))
        ));
        assert!(machine.is_idle());
        assert!(machine.take_transitions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_during_cooldown() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        machine.submit_manual("000000", now).unwrap();
        machine.begin_lookup();
        machine.resolve(ValidationResult::NotFound(RawCode::new("000000")), today(), now);

        assert!(matches!(
            machine.submit_manual("000000", now),
            Err(ScannerError::CooldownActive { .. })
        ));

        let attempt = machine.submit_manual("A1B2C3", now).unwrap();
        assert_eq!(attempt.code, Code::ShortCode("A1B2C3".into()));
        assert_eq!(machine.kind(), StateKind::CandidateFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ocr_gating_and_extraction() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        assert_eq!(
            machine.request_ocr(),
            Err(ScannerError::OcrNotReady {
                required: 3,
                current: 0
            })
        );

        for _ in 0..3 {
            let _ = machine.on_decode(None, now);
        }
        machine.request_ocr().unwrap();
        assert_eq!(machine.kind(), StateKind::Recognizing);
        assert!(machine.request_ocr().is_err());

        let extraction = crate::code::extract_candidate("SEU PEDIDO\nQ9ZK1M");
        let attempt = machine.finish_ocr(&extraction).unwrap();
        assert_eq!(attempt.origin, Origin::Ocr);
        assert_eq!(attempt.code, Code::ShortCode("Q9ZK1M".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_ledger() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        assert_eq!(machine.serve_target(today()), Err(ScannerError::NoResolvedOrder));

        machine.submit_manual("K7Q2XZ", now).unwrap();
        machine.begin_lookup();
        machine.resolve(ValidationResult::Found(order("o-1", "K7Q2XZ")), today(), now);

        let target = machine.serve_target(today()).unwrap();
        assert!(matches!(
            machine.serve_target(today() + chrono::Duration::days(1)),
            Err(ScannerError::NotEligible { .. })
        ));

        machine.record_served(&target);
        assert!(machine.is_served("o-1"));
        assert!(matches!(
            machine.serve_target(today()),
            Err(ScannerError::AlreadyServed { .. })
        ));
        assert_eq!(machine.snapshot().served_orders, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_target_cleared_by_later_miss() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        machine.submit_manual("K7Q2XZ", now).unwrap();
        machine.begin_lookup();
        machine.resolve(ValidationResult::Found(order("o-1", "K7Q2XZ")), today(), now);
        assert!(machine.serve_target(today()).is_ok());

        // A different code ends the cooldown and resolves as unknown
        machine.submit_manual("000000", now).unwrap();
        machine.begin_lookup();
        machine.resolve(ValidationResult::NotFound(RawCode::new("000000")), today(), now);
        assert_eq!(machine.serve_target(today()), Err(ScannerError::NoResolvedOrder));

        machine.submit_manual("K7Q2XZ", now).unwrap();
        machine.begin_lookup();
        machine.resolve(
            ValidationResult::TransientError {
                details: "registry offline".to_string(),
            },
            today(),
            now,
        );
        assert_eq!(machine.serve_target(today()), Err(ScannerError::NoResolvedOrder));
        assert!(!machine.is_served("o-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_from_cooldown() {
        let mut machine = ScanMachine::new(&config(SuccessPolicy::AutoResume));
        let now = Instant::now();

        machine.submit_manual("K7Q2XZ", now).unwrap();
        machine.begin_lookup();
        machine.resolve(ValidationResult::NotFound(RawCode::new("K7Q2XZ")), today(), now);
        assert!(machine.snapshot().cooldown_key.is_some());

        machine.reset();
        assert!(machine.is_idle());
        assert!(machine.cooldown_deadline().is_none());
        assert!(machine.snapshot().cooldown_key.is_none());
    }
}
