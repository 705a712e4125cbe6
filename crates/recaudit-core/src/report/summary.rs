//! `summary.json`: the machine-readable outcome of a run. Downstream
//! tooling branches on `reason_code`, never on exit codes or messages.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Current schema version for summary.json.
pub const SCHEMA_VERSION: u32 = 1;

/// Serde helpers: serialize Option<u64> as a JSON string or null to avoid
/// precision loss (u64 > 2^53 in JS consumers).
mod serde_seed {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match v {
            Some(n) => s.serialize_str(&n.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<serde_json::Value> = Option::deserialize(d)?;
        match opt {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => {
                let n = s.parse::<u64>().map_err(serde::de::Error::custom)?;
                Ok(Some(n))
            }
            Some(serde_json::Value::Number(num)) => num
                .as_u64()
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("seed number must be u64")),
            Some(other) => Err(serde::de::Error::custom(format!(
                "seed must be string or null, got: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Schema version for compatibility detection.
    pub schema_version: u32,

    /// Exit code: 0=pass, 1=task failures, 2=config error, 3=infra error.
    pub exit_code: i32,

    /// Stable machine-readable reason code (e.g. "E_CFG_PARSE").
    pub reason_code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsSummary>,

    /// Task order seed; string-or-null for JSON-number safety.
    #[serde(with = "serde_seed", default)]
    pub order_seed: Option<u64>,
}

impl Summary {
    #[must_use]
    pub fn new(exit_code: i32, reason_code: impl Into<String>, message: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            exit_code,
            reason_code: reason_code.into(),
            message,
            results: None,
            order_seed: None,
        }
    }

    #[must_use]
    pub fn with_results(mut self, passed: usize, failed: usize, total: usize) -> Self {
        self.results = Some(ResultsSummary {
            passed,
            failed,
            total,
        });
        self
    }

    #[must_use]
    pub fn with_order_seed(mut self, seed: Option<u64>) -> Self {
        self.order_seed = seed;
        self
    }
}

pub fn write_summary(summary: &Summary, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_serialize_as_strings() {
        let s = Summary::new(0, "OK", None).with_order_seed(Some(u64::MAX));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["order_seed"], serde_json::json!(u64::MAX.to_string()));

        let back: Summary = serde_json::from_value(json).unwrap();
        assert_eq!(back.order_seed, Some(u64::MAX));
    }

    #[test]
    fn null_seed_roundtrips() {
        let s = Summary::new(2, "E_CFG_PARSE", Some("bad yaml".into()));
        let json = serde_json::to_string(&s).unwrap();
        let back: Summary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.order_seed, None);
        assert_eq!(back.reason_code, "E_CFG_PARSE");
        assert_eq!(back.exit_code, 2);
    }

    #[test]
    fn legacy_numeric_seed_accepted() {
        let back: Summary = serde_json::from_str(
            r#"{"schema_version":1,"exit_code":0,"reason_code":"OK","order_seed":42}"#,
        )
        .unwrap();
        assert_eq!(back.order_seed, Some(42));
    }

    #[test]
    fn write_summary_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let s = Summary::new(0, "OK", None).with_results(3, 0, 3);
        write_summary(&s, &path).unwrap();
        let back: Summary = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.results.unwrap().passed, 3);
    }
}
