use super::RawCode;
use crate::error::ManualInputError;

/// Longest code an operator can type
pub const MANUAL_MAX_LEN: usize = 6;

fn allowed(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Validate typed input before it may reach the classifier
pub fn parse_manual(input: &str) -> Result<RawCode, ManualInputError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(ManualInputError::Empty);
    }

    if let Some(character) = trimmed.chars().find(|c| !allowed(*c)) {
        return Err(ManualInputError::InvalidCharacter { character });
    }

    let length = trimmed.chars().count();
    if length > MANUAL_MAX_LEN {
        return Err(ManualInputError::TooLong {
            length,
            max: MANUAL_MAX_LEN,
        });
    }

    Ok(RawCode::new(trimmed.to_ascii_uppercase()))
}

/// Keystroke buffer behind the keyboard surface; refuses input it could never submit
#[derive(Debug, Default, Clone)]
pub struct ManualEntryBuffer {
    buffer: String,
}

impl ManualEntryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a character; returns false when it was refused
    pub fn push(&mut self, c: char) -> bool {
        if !allowed(c) || self.buffer.len() >= MANUAL_MAX_LEN {
            return false;
        }
        self.buffer.push(c.to_ascii_uppercase());
        true
    }

    pub fn backspace(&mut self) {
        self.buffer.pop();
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Validate and empty the buffer
    pub fn take(&mut self) -> Result<RawCode, ManualInputError> {
        let result = parse_manual(&self.buffer);
        self.buffer.clear();
        result
    }
}
