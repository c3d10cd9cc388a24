use thiserror::Error;

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Scanner error: {0}")]
    Scanner(#[from] ScannerError),

    #[error("Status server error: {0}")]
    Status(#[from] StatusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl CounterError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures talking to the order registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Registry unavailable: {details}")]
    Unavailable { details: String },

    #[error("Registry lookup timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Order {order_id} not found")]
    UnknownOrder { order_id: String },

    #[error("Order {order_id} cannot be served: {reason}")]
    ServeRefused { order_id: String, reason: String },

    #[error("Registry data error: {details}")]
    Data { details: String },
}

impl RegistryError {
    /// Whether the failure is connectivity-like and should resolve as a transient error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::Unavailable { .. } | RegistryError::Timeout { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    #[error("OCR service disabled")]
    Disabled,

    #[error("OCR service failed: {details}")]
    ServiceFailed { details: String },

    #[error("OCR timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("No frame available for OCR snapshot")]
    NoSnapshot,

    #[error("Snapshot encoding failed: {details}")]
    Snapshot { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Frame {frame_id} is malformed: {details}")]
    MalformedFrame { frame_id: u64, details: String },

    #[error("Frame source unavailable: {details}")]
    SourceUnavailable { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Status server failed: {details}")]
    ServerFailed { details: String },
}

/// Rejections raised by operator commands against the scan state machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScannerError {
    #[error("Command '{command}' not accepted while {state}")]
    InvalidTransition { command: String, state: String },

    #[error("OCR fallback needs {required} consecutive decode misses, have {current}")]
    OcrNotReady { required: u32, current: u32 },

    #[error("No resolved order to act on")]
    NoResolvedOrder,

    #[error("Order {order_id} was already served at this terminal")]
    AlreadyServed { order_id: String },

    #[error("'{key}' was just resolved; wait for the cooldown to end")]
    CooldownActive { key: String },

    #[error("Order {order_id} is not eligible for serving: {reason}")]
    NotEligible { order_id: String, reason: String },

    #[error("Serve confirmation failed: {details}")]
    ServeFailed { details: String },

    #[error("OCR fallback failed: {0}")]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Scanner is not running")]
    NotRunning,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManualInputError {
    #[error("Manual code is empty")]
    Empty,

    #[error("Manual code is too long ({length} > {max})")]
    TooLong { length: usize, max: usize },

    #[error("Manual code contains invalid character '{character}'")]
    InvalidCharacter { character: char },
}

/// Outcome taxonomy for one scan cycle, as seen by the operator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("No code in frame")]
    DecodeMiss,

    #[error("Input '{raw}' is not a recognised order code")]
    ClassificationReject { raw: String },

    #[error("No order matches '{raw}'")]
    RegistryNotFound { raw: String },

    #[error("Registry unreachable while checking '{raw}': {details}")]
    RegistryTransientError { raw: String, details: String },

    #[error("Invalid manual input: {0}")]
    InvalidManualInput(#[from] ManualInputError),
}

impl ScanError {
    /// Only registry outcomes are surfaced to the operator
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ScanError::RegistryNotFound { .. } | ScanError::RegistryTransientError { .. }
        )
    }

    /// Short, actionable operator message for user-visible errors
    pub fn operator_message(&self) -> Option<&'static str> {
        match self {
            ScanError::RegistryNotFound { .. } => {
                Some("Order not found. Check the code with the customer or type it manually.")
            }
            ScanError::RegistryTransientError { .. } => {
                Some("Could not reach the order system. Scanning resumes shortly; try again.")
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CounterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visible_taxonomy() {
        assert!(!ScanError::DecodeMiss.is_user_visible());
        assert!(!ScanError::ClassificationReject { raw: "x".into() }.is_user_visible());
        assert!(!ScanError::InvalidManualInput(ManualInputError::Empty).is_user_visible());

        let not_found = ScanError::RegistryNotFound { raw: "000000".into() };
        let transient = ScanError::RegistryTransientError {
            raw: "K7Q2XZ".into(),
            details: "timeout".into(),
        };
        assert!(not_found.is_user_visible());
        assert!(transient.is_user_visible());
        assert_ne!(not_found.operator_message(), transient.operator_message());
        assert!(ScanError::DecodeMiss.operator_message().is_none());
    }

    #[test]
    fn test_registry_transient_classification() {
        assert!(RegistryError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(RegistryError::Unavailable { details: "down".into() }.is_transient());
        assert!(!RegistryError::UnknownOrder { order_id: "x".into() }.is_transient());
    }

    #[test]
    fn test_component_error_message() {
        let err = CounterError::component("scanner", "boom");
        assert_eq!(err.to_string(), "Component error in scanner: boom");
    }
}
