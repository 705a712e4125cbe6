//! Unified exit codes and reason codes. These are part of the public
//! contract; CI consumers branch on the reason code in summary.json.

use recaudit_core::errors::{RunError, RunErrorKind};
use recaudit_core::model::{TaskResultRow, TaskStatus};

pub const SUCCESS: i32 = 0;
pub const TASK_FAILURES: i32 = 1; // One or more tasks failed or errored
pub const CONFIG_ERROR: i32 = 2; // Config missing/unparseable/invalid
pub const INFRA_ERROR: i32 = 3; // Driver/storage/network failure outside tasks

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    Ok,
    ETaskFailures,
    ECfgNotFound,
    ECfgParse,
    EInvalidArgs,
    EDriver,
    EInfra,
}

impl ReasonCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Ok => "OK",
            ReasonCode::ETaskFailures => "E_TASK_FAILURES",
            ReasonCode::ECfgNotFound => "E_CFG_NOT_FOUND",
            ReasonCode::ECfgParse => "E_CFG_PARSE",
            ReasonCode::EInvalidArgs => "E_INVALID_ARGS",
            ReasonCode::EDriver => "E_DRIVER",
            ReasonCode::EInfra => "E_INFRA",
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            ReasonCode::Ok => SUCCESS,
            ReasonCode::ETaskFailures => TASK_FAILURES,
            ReasonCode::ECfgNotFound | ReasonCode::ECfgParse | ReasonCode::EInvalidArgs => {
                CONFIG_ERROR
            }
            ReasonCode::EDriver | ReasonCode::EInfra => INFRA_ERROR,
        }
    }

    #[must_use]
    pub fn from_run_error(e: &RunError) -> ReasonCode {
        match e.kind {
            RunErrorKind::MissingConfig => ReasonCode::ECfgNotFound,
            RunErrorKind::ConfigParse => ReasonCode::ECfgParse,
            RunErrorKind::InvalidArgs => ReasonCode::EInvalidArgs,
            RunErrorKind::DriverSession
            | RunErrorKind::DriverTimeout
            | RunErrorKind::Restricted => ReasonCode::EDriver,
            RunErrorKind::Network | RunErrorKind::Other => ReasonCode::EInfra,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub reason: ReasonCode,
    pub message: Option<String>,
}

impl RunOutcome {
    #[must_use]
    pub fn from_reason(reason: ReasonCode, message: Option<String>) -> Self {
        Self {
            exit_code: reason.exit_code(),
            reason,
            message,
        }
    }
}

/// Decide the exit for a finished batch. `strict` promotes flaky tasks to
/// failures so CI can refuse unreliable data.
#[must_use]
pub fn decide_run_outcome(rows: &[TaskResultRow], strict: bool) -> RunOutcome {
    let blocking = rows.iter().filter(|r| r.status.is_blocking()).count();
    let flaky = rows
        .iter()
        .filter(|r| r.status == TaskStatus::Flaky)
        .count();

    if blocking > 0 || (strict && flaky > 0) {
        let mut parts = Vec::new();
        if blocking > 0 {
            parts.push(format!("{blocking} task(s) failed"));
        }
        if strict && flaky > 0 {
            parts.push(format!("{flaky} flaky task(s) (strict)"));
        }
        RunOutcome::from_reason(ReasonCode::ETaskFailures, Some(parts.join(", ")))
    } else {
        RunOutcome::from_reason(ReasonCode::Ok, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: TaskStatus) -> TaskResultRow {
        TaskResultRow {
            task_id: "t".into(),
            status,
            message: String::new(),
            duration_ms: None,
            fingerprint: None,
            skip_reason: None,
            attempts: None,
            details: serde_json::Value::Null,
        }
    }

    #[test]
    fn all_passing_is_ok() {
        let rows = vec![row(TaskStatus::Completed), row(TaskStatus::Skipped)];
        let o = decide_run_outcome(&rows, false);
        assert_eq!(o.exit_code, SUCCESS);
        assert_eq!(o.reason, ReasonCode::Ok);
    }

    #[test]
    fn blocking_rows_fail_the_run() {
        let rows = vec![row(TaskStatus::Completed), row(TaskStatus::Error)];
        let o = decide_run_outcome(&rows, false);
        assert_eq!(o.exit_code, TASK_FAILURES);
        assert_eq!(o.reason, ReasonCode::ETaskFailures);
    }

    #[test]
    fn strict_promotes_flaky() {
        let rows = vec![row(TaskStatus::Flaky)];
        assert_eq!(decide_run_outcome(&rows, false).exit_code, SUCCESS);
        assert_eq!(decide_run_outcome(&rows, true).exit_code, TASK_FAILURES);
    }

    #[test]
    fn reason_codes_map_to_exit_codes() {
        assert_eq!(ReasonCode::ECfgNotFound.exit_code(), CONFIG_ERROR);
        assert_eq!(ReasonCode::ECfgParse.exit_code(), CONFIG_ERROR);
        assert_eq!(ReasonCode::EDriver.exit_code(), INFRA_ERROR);
        assert_eq!(ReasonCode::Ok.exit_code(), SUCCESS);
    }

    #[test]
    fn run_errors_map_to_reason_codes() {
        let e = RunError::missing_config("x.yaml", "gone");
        assert_eq!(ReasonCode::from_run_error(&e), ReasonCode::ECfgNotFound);
        let e = RunError::invalid_args("bad");
        assert_eq!(ReasonCode::from_run_error(&e), ReasonCode::EInvalidArgs);
    }
}
