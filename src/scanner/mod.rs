//! The validation orchestrator: one task per terminal that samples frames,
//! classifies candidates, checks them against the registry and cools down.

mod cooldown;
mod handle;
mod machine;
mod orchestrator;
mod state;

pub use cooldown::CooldownController;
pub use handle::{OcrReport, ScanHandle};
pub use machine::ScanMachine;
pub use orchestrator::{ScanOrchestrator, ScanOrchestratorBuilder};
pub use state::{
    DedupKey, Resolution, ScanAttempt, ScanState, StateKind, StateSnapshot, ValidationResult,
};
