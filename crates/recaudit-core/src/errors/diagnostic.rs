//! Structured diagnostics for config validation and CLI output.

use serde::{Deserialize, Serialize};

/// Stable diagnostic codes. Downstream tooling branches on these strings,
/// never on the human-readable message.
pub mod codes {
    pub const E_CFG_NOT_FOUND: &str = "E_CFG_NOT_FOUND";
    pub const E_CFG_PARSE: &str = "E_CFG_PARSE";
    pub const E_CFG_INVALID: &str = "E_CFG_INVALID";
    pub const W_CFG_UNKNOWN_KEY: &str = "W_CFG_UNKNOWN_KEY";
    pub const W_CFG_SUSPECT_VALUE: &str = "W_CFG_SUSPECT_VALUE";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_step: Option<String>,
}

impl Diagnostic {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity: Severity::Error,
            message: message.into(),
            context: None,
            fix_step: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity: Severity::Warning,
            message: message.into(),
            context: None,
            fix_step: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_fix_step(mut self, step: impl Into<String>) -> Self {
        self.fix_step = Some(step.into());
        self
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{sev}[{}]: {}", self.code, self.message)?;
        if let Some(step) = &self.fix_step {
            write!(f, "\n  fix: {step}")?;
        }
        Ok(())
    }
}
