//! Leveled runtime messages attached to a node and shown by the host.

use std::fmt;

use crate::error::{ConfigurationError, GhostError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageLevel {
    Remark,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageLevel::Remark => "Remark",
            MessageLevel::Warning => "Warning",
            MessageLevel::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

/// A non-fatal message surfaced on the node after a solve pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl RuntimeMessage {
    pub fn new(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn remark(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Remark, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, text)
    }
}

impl fmt::Display for RuntimeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.text)
    }
}

impl From<&ConfigurationError> for RuntimeMessage {
    fn from(err: &ConfigurationError) -> Self {
        match err {
            ConfigurationError::NoTargetLinked => RuntimeMessage::remark(err.to_string()),
            _ => RuntimeMessage::warning(err.to_string()),
        }
    }
}

impl From<&GhostError> for RuntimeMessage {
    fn from(err: &GhostError) -> Self {
        match err {
            GhostError::Configuration(inner) => inner.into(),
            GhostError::UnsupportedParam(_) => RuntimeMessage::warning(err.to_string()),
            _ => RuntimeMessage::error(err.to_string()),
        }
    }
}
