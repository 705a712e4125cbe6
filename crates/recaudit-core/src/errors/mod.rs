//! Run-level error taxonomy. Orchestration seams return `anyhow::Result`;
//! this module classifies those errors into stable kinds so the CLI can map
//! them to reason codes without string matching at call sites.

pub mod diagnostic;

pub use diagnostic::Diagnostic;

use crate::driver::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    MissingConfig,
    ConfigParse,
    InvalidArgs,
    DriverSession,
    DriverTimeout,
    Network,
    Restricted,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
    pub path: Option<String>,
    pub detail: Option<String>,
}

impl RunError {
    pub fn new(kind: RunErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn missing_config(path: impl Into<String>, detail: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            RunErrorKind::MissingConfig,
            format!("config file not found: {path}"),
        )
        .with_path(path)
        .with_detail(detail)
    }

    pub fn config_parse(path: Option<String>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let mut err = Self::new(RunErrorKind::ConfigParse, detail.clone()).with_detail(detail);
        if let Some(path) = path {
            err = err.with_path(path);
        }
        err
    }

    pub fn invalid_args(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::new(RunErrorKind::InvalidArgs, detail.clone()).with_detail(detail)
    }

    /// Classify an `anyhow::Error` by walking its chain for known types.
    #[must_use]
    pub fn from_anyhow(e: &anyhow::Error) -> Self {
        if let Some(run) = e.downcast_ref::<RunError>() {
            return run.clone();
        }
        if let Some(drv) = e.downcast_ref::<DriverError>() {
            return Self::from_driver(drv);
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::NotFound {
                return Self::new(RunErrorKind::MissingConfig, e.to_string());
            }
        }
        Self::new(RunErrorKind::Other, e.to_string())
    }

    #[must_use]
    pub fn from_driver(e: &DriverError) -> Self {
        let kind = match e {
            DriverError::Session(_) | DriverError::Protocol { .. } => RunErrorKind::DriverSession,
            DriverError::Timeout(..) => RunErrorKind::DriverTimeout,
            DriverError::Http(_) => RunErrorKind::Network,
            DriverError::Restricted { .. } => RunErrorKind::Restricted,
            DriverError::ElementNotFound(_) => RunErrorKind::DriverSession,
        };
        Self::new(kind, e.to_string())
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_driver_errors_in_anyhow_chain() {
        let e = anyhow::Error::new(DriverError::Timeout(
            std::time::Duration::from_secs(10),
            "url change".into(),
        ));
        assert_eq!(RunError::from_anyhow(&e).kind, RunErrorKind::DriverTimeout);

        let e = anyhow::Error::new(DriverError::Restricted {
            reason: "Sign in to confirm your age".into(),
        });
        assert_eq!(RunError::from_anyhow(&e).kind, RunErrorKind::Restricted);
    }

    #[test]
    fn classifies_missing_files() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = anyhow::Error::new(io);
        assert_eq!(RunError::from_anyhow(&e).kind, RunErrorKind::MissingConfig);
    }

    #[test]
    fn run_error_passthrough() {
        let e = anyhow::Error::new(RunError::invalid_args("bad flag"));
        assert_eq!(RunError::from_anyhow(&e).kind, RunErrorKind::InvalidArgs);
    }
}
