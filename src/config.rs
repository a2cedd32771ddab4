use std::path::Path;

use serde::Deserialize;

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PhasegateConfig {
    pub backend: BackendConfig,
    pub notifications: NotificationConfig,
    pub flags: FlagConfig,
    pub roles: RoleConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Resource name used for permission checks on task records.
    pub record_resource: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Addresses eligible to receive the supervisor notification. One entry
    /// dispatches immediately; several require a recipient choice.
    pub supervisor_recipients: Vec<String>,
    pub subject_prefix: String,
}

/// Settings for discovering the completion/validation flag keys on whatever
/// record shape the backend returns, and for normalizing flag values.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FlagConfig {
    pub affirmative: String,
    pub negative: String,
    pub completion_patterns: Vec<String>,
    pub validation_patterns: Vec<String>,
    pub default_completion_key: String,
    pub default_validation_key: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RoleConfig {
    /// Case-insensitive substrings that classify a role as supervisor.
    pub supervisor_markers: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: 30,
            record_resource: "producto-tarea-fase".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            supervisor_recipients: vec!["supervision@localhost".to_string()],
            subject_prefix: "[Fases]".to_string(),
        }
    }
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            affirmative: "S".to_string(),
            negative: "N".to_string(),
            completion_patterns: vec!["(?i)complet".to_string()],
            validation_patterns: vec!["(?i)valid".to_string(), "(?i)supervis".to_string()],
            default_completion_key: "completada".to_string(),
            default_validation_key: "validadaSupervisor".to_string(),
        }
    }
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            supervisor_markers: vec!["supervisor".to_string()],
        }
    }
}

pub fn validate(config: &PhasegateConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if !config.backend.base_url.starts_with("http://")
        && !config.backend.base_url.starts_with("https://")
    {
        errors.push("backend.base_url must start with http:// or https://".to_string());
    }

    if config.backend.timeout_secs == 0 {
        errors.push("backend.timeout_secs must be >= 1".to_string());
    }

    if config.notifications.supervisor_recipients.is_empty() {
        errors.push("notifications.supervisor_recipients must not be empty".to_string());
    }

    if config.flags.affirmative == config.flags.negative {
        errors.push("flags.affirmative and flags.negative must differ".to_string());
    }

    for (section, patterns) in [
        ("flags.completion_patterns", &config.flags.completion_patterns),
        ("flags.validation_patterns", &config.flags.validation_patterns),
    ] {
        if patterns.is_empty() {
            errors.push(format!("{}: must have at least one pattern", section));
        }
        for pattern in patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("{}: invalid regex '{}': {}", section, pattern, e));
            }
        }
    }

    if config.roles.supervisor_markers.is_empty() {
        errors.push("roles.supervisor_markers must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn load_config(root: &Path) -> Result<PhasegateConfig, String> {
    let config_path = root.join("phasegate.toml");

    if !config_path.exists() {
        return Ok(PhasegateConfig::default());
    }

    load_config_file(&config_path)
}

/// Load from an explicit path (the `--config` flag); missing file is an
/// error here, unlike the default location.
pub fn load_config_file(config_path: &Path) -> Result<PhasegateConfig, String> {
    let contents = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read {}: {}", config_path.display(), e))?;

    let config: PhasegateConfig = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", config_path.display(), e))?;

    validate(&config).map_err(|errors| {
        format!(
            "Config validation failed:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    Ok(config)
}
