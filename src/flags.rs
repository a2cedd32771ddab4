use regex::Regex;

use crate::config::FlagConfig;
use crate::types::TaskRecord;

/// Strategy for locating the completion and validation flags on whatever
/// record shape the backend returns.
///
/// The backend does not fix the two flag field names, so keys are discovered
/// by matching key names against semantic patterns (completion-like,
/// validation/supervisor-like). `serde_json::Map` keeps keys sorted, so the
/// first match is deterministic regardless of wire order. When nothing
/// matches, or no record exists yet, the configured default key is used.
#[derive(Debug, Clone)]
pub struct FlagKeys {
    completion_patterns: Vec<Regex>,
    validation_patterns: Vec<Regex>,
    default_completion: String,
    default_validation: String,
    affirmative: String,
    negative: String,
}

impl FlagKeys {
    pub fn from_config(config: &FlagConfig) -> Result<Self, String> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, String> {
            patterns
                .iter()
                .map(|p| Regex::new(p).map_err(|e| format!("invalid flag pattern '{}': {}", p, e)))
                .collect()
        };

        Ok(FlagKeys {
            completion_patterns: compile(&config.completion_patterns)?,
            validation_patterns: compile(&config.validation_patterns)?,
            default_completion: config.default_completion_key.clone(),
            default_validation: config.default_validation_key.clone(),
            affirmative: config.affirmative.clone(),
            negative: config.negative.clone(),
        })
    }

    pub fn affirmative(&self) -> &str {
        &self.affirmative
    }

    pub fn negative(&self) -> &str {
        &self.negative
    }

    /// Key holding the completion flag on `record`.
    pub fn completion_key<'a>(&'a self, record: Option<&'a TaskRecord>) -> &'a str {
        self.resolve(record, &self.completion_patterns, &self.default_completion)
    }

    /// Key holding the supervisor-validation flag on `record`.
    pub fn validation_key<'a>(&'a self, record: Option<&'a TaskRecord>) -> &'a str {
        self.resolve(record, &self.validation_patterns, &self.default_validation)
    }

    /// True iff the record's completion flag equals the affirmative marker.
    /// Absent record or absent flag is "not completed".
    pub fn is_completed(&self, record: Option<&TaskRecord>) -> bool {
        match record {
            Some(r) => r.flag(self.completion_key(Some(r))) == Some(self.affirmative.as_str()),
            None => false,
        }
    }

    /// True iff the record's validation flag equals the affirmative marker.
    /// Absent record or absent flag is "not validated".
    pub fn is_validated(&self, record: Option<&TaskRecord>) -> bool {
        match record {
            Some(r) => r.flag(self.validation_key(Some(r))) == Some(self.affirmative.as_str()),
            None => false,
        }
    }

    fn resolve<'a>(
        &'a self,
        record: Option<&'a TaskRecord>,
        patterns: &[Regex],
        default: &'a str,
    ) -> &'a str {
        let Some(record) = record else {
            return default;
        };
        record
            .extra
            .keys()
            .find(|key| patterns.iter().any(|p| p.is_match(key)))
            .map(String::as_str)
            .unwrap_or(default)
    }
}
