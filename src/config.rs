use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CounterConfig {
    pub scanner: ScannerConfig,
    pub decoder: DecoderConfig,
    pub ocr: OcrConfig,
    pub registry: RegistryConfig,
    pub feed: FeedConfig,
    pub audit: AuditConfig,
    pub terminal: TerminalConfig,
    pub status: StatusConfig,
    pub system: SystemConfig,
}

/// What happens after a successful validation once the cooldown elapses
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Return to scanning as soon as the cooldown expires
    AutoResume,
    /// Hold the result until the operator explicitly continues
    OperatorContinue,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScannerConfig {
    /// Sampling tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Cooldown after every resolved attempt in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Registry lookup timeout in milliseconds
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Policy applied after a successful lookup
    #[serde(default = "default_success_policy")]
    pub success_policy: SuccessPolicy,

    /// Consecutive decode misses required before OCR fallback is offered
    #[serde(default = "default_ocr_min_decode_misses")]
    pub ocr_min_decode_misses: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DecoderConfig {
    /// Retry decoding on the luminance-inverted frame
    #[serde(default = "default_try_inverted")]
    pub try_inverted: bool,

    /// Retry decoding on a histogram-equalized frame
    #[serde(default = "default_try_equalized")]
    pub try_equalized: bool,

    /// Longest frame edge in pixels before downscaling
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OcrConfig {
    /// Enable the operator-triggered OCR fallback
    #[serde(default = "default_ocr_enabled")]
    pub enabled: bool,

    /// OCR executable (tesseract compatible: `<cmd> stdin stdout`)
    #[serde(default = "default_ocr_command")]
    pub command: String,

    /// OCR request timeout in milliseconds
    #[serde(default = "default_ocr_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistryConfig {
    /// JSON file with the order records served by this terminal
    #[serde(default = "default_orders_path")]
    pub orders_path: String,

    /// Write serve confirmations back to the orders file
    #[serde(default = "default_registry_persist")]
    pub persist: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedConfig {
    /// Directory of still images replayed as the camera feed
    pub replay_dir: Option<String>,

    /// Interval between replayed frames in milliseconds
    #[serde(default = "default_replay_interval_ms")]
    pub replay_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuditConfig {
    /// Write resolved attempts to the audit log
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,

    /// JSON-lines audit file
    #[serde(default = "default_audit_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TerminalConfig {
    /// IANA timezone used to decide which orders are for today
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Enable the keyboard operator surface
    #[serde(default = "default_manual_entry")]
    pub manual_entry: bool,

    /// Ring the terminal bell on successful validation
    #[serde(default = "default_bell")]
    pub bell: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatusConfig {
    /// Serve the HTTP status surface
    #[serde(default = "default_status_enabled")]
    pub enabled: bool,

    /// IP address to bind to
    #[serde(default = "default_status_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_status_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ScannerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl TerminalConfig {
    /// Parsed terminal timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|e| {
            ConfigError::Message(format!("Unknown timezone '{}': {}", self.timezone, e))
        })
    }
}

impl CounterConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("counterscan.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("scanner.tick_interval_ms", default_tick_interval_ms())?
            .set_default("scanner.cooldown_ms", default_cooldown_ms())?
            .set_default("scanner.lookup_timeout_ms", default_lookup_timeout_ms())?
            .set_default("scanner.success_policy", "auto_resume")?
            .set_default(
                "scanner.ocr_min_decode_misses",
                default_ocr_min_decode_misses(),
            )?
            .set_default("decoder.try_inverted", default_try_inverted())?
            .set_default("decoder.try_equalized", default_try_equalized())?
            .set_default("decoder.max_dimension", default_max_dimension())?
            .set_default("ocr.enabled", default_ocr_enabled())?
            .set_default("ocr.command", default_ocr_command())?
            .set_default("ocr.timeout_ms", default_ocr_timeout_ms())?
            .set_default("registry.orders_path", default_orders_path())?
            .set_default("registry.persist", default_registry_persist())?
            .set_default("feed.replay_interval_ms", default_replay_interval_ms())?
            .set_default("audit.enabled", default_audit_enabled())?
            .set_default("audit.path", default_audit_path())?
            .set_default("terminal.timezone", default_timezone())?
            .set_default("terminal.manual_entry", default_manual_entry())?
            .set_default("terminal.bell", default_bell())?
            .set_default("status.enabled", default_status_enabled())?
            .set_default("status.ip", default_status_ip())?
            .set_default("status.port", default_status_port())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // COUNTERSCAN_SCANNER__COOLDOWN_MS=3000
            .add_source(
                Environment::with_prefix("COUNTERSCAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: CounterConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Scanner tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.scanner.cooldown_ms < self.scanner.tick_interval_ms {
            return Err(ConfigError::Message(
                "Scanner cooldown_ms must be at least tick_interval_ms".to_string(),
            ));
        }

        if self.scanner.lookup_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Scanner lookup_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.decoder.max_dimension < 64 {
            return Err(ConfigError::Message(
                "Decoder max_dimension must be at least 64 pixels".to_string(),
            ));
        }

        if self.ocr.enabled && self.ocr.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "OCR timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.feed.replay_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Feed replay_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        self.terminal.tz()?;

        Ok(())
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig {
                tick_interval_ms: default_tick_interval_ms(),
                cooldown_ms: default_cooldown_ms(),
                lookup_timeout_ms: default_lookup_timeout_ms(),
                success_policy: default_success_policy(),
                ocr_min_decode_misses: default_ocr_min_decode_misses(),
            },
            decoder: DecoderConfig {
                try_inverted: default_try_inverted(),
                try_equalized: default_try_equalized(),
                max_dimension: default_max_dimension(),
            },
            ocr: OcrConfig {
                enabled: default_ocr_enabled(),
                command: default_ocr_command(),
                timeout_ms: default_ocr_timeout_ms(),
            },
            registry: RegistryConfig {
                orders_path: default_orders_path(),
                persist: default_registry_persist(),
            },
            feed: FeedConfig {
                replay_dir: None,
                replay_interval_ms: default_replay_interval_ms(),
            },
            audit: AuditConfig {
                enabled: default_audit_enabled(),
                path: default_audit_path(),
            },
            terminal: TerminalConfig {
                timezone: default_timezone(),
                manual_entry: default_manual_entry(),
                bell: default_bell(),
            },
            status: StatusConfig {
                enabled: default_status_enabled(),
                ip: default_status_ip(),
                port: default_status_port(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_tick_interval_ms() -> u64 {
    300
}
fn default_cooldown_ms() -> u64 {
    2500
}
fn default_lookup_timeout_ms() -> u64 {
    5000
}
fn default_success_policy() -> SuccessPolicy {
    SuccessPolicy::AutoResume
}
fn default_ocr_min_decode_misses() -> u32 {
    3
}

// Variants cost a full extra decode pass each, so they stay off by default
fn default_try_inverted() -> bool {
    false
}
fn default_try_equalized() -> bool {
    false
}
fn default_max_dimension() -> u32 {
    1280
}

fn default_ocr_enabled() -> bool {
    true
}
fn default_ocr_command() -> String {
    "tesseract".to_string()
}
fn default_ocr_timeout_ms() -> u64 {
    15_000
}

fn default_orders_path() -> String {
    "./orders.json".to_string()
}
fn default_registry_persist() -> bool {
    false
}

fn default_replay_interval_ms() -> u64 {
    100
}

fn default_audit_enabled() -> bool {
    true
}
fn default_audit_path() -> String {
    "./audit/scan-audit.jsonl".to_string()
}

fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}
fn default_manual_entry() -> bool {
    true
}
fn default_bell() -> bool {
    true
}

fn default_status_enabled() -> bool {
    true
}
fn default_status_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_status_port() -> u16 {
    8088
}

fn default_event_bus_capacity() -> usize {
    100
}
