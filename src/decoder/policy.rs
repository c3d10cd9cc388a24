use crate::config::DecoderConfig;

/// Which extra decode passes run after the plain one misses.
///
/// Each variant is a full additional decode of the frame, so all are off by
/// default and the sampling loop trades a little recall for throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodePolicy {
    pub try_inverted: bool,
    pub try_equalized: bool,
    pub max_dimension: u32,
}

impl DecodePolicy {
    pub fn with_variants(mut self) -> Self {
        self.try_inverted = true;
        self.try_equalized = true;
        self
    }

    /// Number of decode passes a miss costs under this policy
    pub fn passes(&self) -> usize {
        1 + self.try_inverted as usize + self.try_equalized as usize
    }
}

impl Default for DecodePolicy {
    fn default() -> Self {
        Self {
            try_inverted: false,
            try_equalized: false,
            max_dimension: 1280,
        }
    }
}

impl From<&DecoderConfig> for DecodePolicy {
    fn from(config: &DecoderConfig) -> Self {
        Self {
            try_inverted: config.try_inverted,
            try_equalized: config.try_equalized,
            max_dimension: config.max_dimension,
        }
    }
}
