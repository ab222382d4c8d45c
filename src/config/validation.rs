//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// Returns the complete set of valid dotted key paths for `MonitorConfig`.
///
/// Maintained by hand; a new field in `monitor_config.rs` needs an entry here.
pub fn known_config_keys() -> HashSet<&'static str> {
    [
        "detection",
        "detection.confidence_threshold",
        "detection.suspected_threshold",
        "features",
        "features.min_data_points_for_ml",
        "features.time_window_hours",
        "features.dwell_speed_kmh",
        "oracle",
        "oracle.url",
        "oracle.timeout_ms",
        "oracle.retries",
        "oracle.backoff_base_ms",
        "oracle.backoff_max_ms",
        "oracle.backoff_jitter",
        "jobs",
        "jobs.batch_processing_interval_ms",
        "jobs.drift_prediction_interval_ms",
        "jobs.max_parallelism",
        "jobs.shutdown_grace_ms",
        "drift",
        "drift.horizons_hours",
        "drift.trajectory_points",
        "alerts",
        "alerts.email_enabled",
        "alerts.sms_enabled",
        "alerts.push_enabled",
        "alerts.close_mode",
        "storage",
        "storage.path",
    ]
    .into_iter()
    .collect()
}

/// Recursively collect dotted key paths from a TOML value.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

/// Warn about keys in `raw_toml` that `MonitorConfig` does not recognise.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        // parse errors are reported by serde later
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typo_gets_suggestion() {
        let warnings = validate_unknown_keys(
            r#"
[detection]
confidence_treshold = 0.8
"#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("detection.confidence_threshold")
        );
    }

    #[test]
    fn test_valid_config_has_no_warnings() {
        let warnings = validate_unknown_keys(
            r#"
[oracle]
url = "http://ml:5001"
retries = 2

[drift]
horizons_hours = [6, 12]

[alerts]
close_mode = "acknowledge"
"#,
        );
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_far_off_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("completely_unrelated_section = 1\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].suggestion.is_none());
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
