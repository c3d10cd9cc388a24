pub mod app;
pub mod audit;
pub mod code;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod feedback;
pub mod frame;
pub mod keyboard_input;
pub mod ocr;
pub mod registry;
pub mod scanner;
pub mod source;

#[cfg(feature = "status")]
pub mod status;

pub use app::{ComponentState, CounterOrchestrator, ShutdownReason};
pub use audit::{AuditLog, AuditRecord};
pub use code::{classify, extract_candidate, parse_manual, Code, OcrExtraction, Origin, RawCode};
pub use config::CounterConfig;
pub use decoder::{CodeDecoder, DecodePolicy, QrDecoder};
pub use error::{CounterError, Result, ScanError, ScannerError};
pub use events::{EventBus, EventFilter, EventReceiver, ScanEvent};
pub use feedback::{Feedback, NoopFeedback, TerminalBell};
pub use frame::{FrameData, FrameFormat};
pub use ocr::{OcrService, TesseractOcr};
pub use registry::{Eligibility, InMemoryRegistry, OrderRecord, OrderRegistry, OrderStatus};
pub use scanner::{
    ScanHandle, ScanMachine, ScanOrchestrator, ScanOrchestratorBuilder, ScanState, StateKind,
    StateSnapshot,
};
pub use source::{FrameSource, LatestFrameSlot, ReplayFeed};

#[cfg(feature = "status")]
pub use status::{StatusServer, StatusServerBuilder};
