use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attainment::AttainmentTargets;
use crate::capability::{Role, SecondLineRole};
use crate::workflow::WorkflowPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub attainment: AttainmentConfig,
    pub roles: RolesConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub second_line_order: Vec<SecondLineRole>,
    pub allow_past_cancellation: bool,
}

#[derive(Clone, Debug)]
pub struct AttainmentConfig {
    pub passing_threshold_pct: f64,
    pub clo_target_pct: f64,
    pub plo_target_pct: f64,
    pub peo_target_pct: f64,
}

/// Role grants keyed by actor id. Only read from the config file.
#[derive(Clone, Debug, Default)]
pub struct RolesConfig {
    pub grants: BTreeMap<String, Vec<Role>>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub allow_past_cancellation: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let targets = AttainmentTargets::default();
        let policy = WorkflowPolicy::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://signoff.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            workflow: WorkflowConfig {
                second_line_order: policy.second_line_order,
                allow_past_cancellation: policy.allow_past_cancellation,
            },
            attainment: AttainmentConfig {
                passing_threshold_pct: targets.passing_threshold_pct,
                clo_target_pct: targets.clo_target_pct,
                plo_target_pct: targets.plo_target_pct,
                peo_target_pct: targets.peo_target_pct,
            },
            roles: RolesConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl WorkflowConfig {
    pub fn policy(&self) -> WorkflowPolicy {
        WorkflowPolicy {
            second_line_order: self.second_line_order.clone(),
            allow_past_cancellation: self.allow_past_cancellation,
        }
    }
}

impl AttainmentConfig {
    pub fn targets(&self) -> AttainmentTargets {
        AttainmentTargets {
            passing_threshold_pct: self.passing_threshold_pct,
            clo_target_pct: self.clo_target_pct,
            plo_target_pct: self.plo_target_pct,
            peo_target_pct: self.peo_target_pct,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("signoff.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(order) = workflow.second_line_order {
                self.workflow.second_line_order = order;
            }
            if let Some(allow) = workflow.allow_past_cancellation {
                self.workflow.allow_past_cancellation = allow;
            }
        }

        if let Some(attainment) = patch.attainment {
            if let Some(value) = attainment.passing_threshold_pct {
                self.attainment.passing_threshold_pct = value;
            }
            if let Some(value) = attainment.clo_target_pct {
                self.attainment.clo_target_pct = value;
            }
            if let Some(value) = attainment.plo_target_pct {
                self.attainment.plo_target_pct = value;
            }
            if let Some(value) = attainment.peo_target_pct {
                self.attainment.peo_target_pct = value;
            }
        }

        if let Some(roles) = patch.roles {
            for (actor, names) in roles {
                let parsed = names
                    .iter()
                    .map(|name| {
                        name.parse::<Role>().map_err(|error| {
                            ConfigError::Validation(format!("roles.{actor}: {error}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.roles.grants.insert(actor, parsed);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SIGNOFF_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SIGNOFF_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SIGNOFF_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SIGNOFF_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SIGNOFF_WORKFLOW_SECOND_LINE_ORDER") {
            self.workflow.second_line_order = value
                .split(',')
                .filter(|item| !item.trim().is_empty())
                .map(|item| {
                    item.parse::<SecondLineRole>().map_err(|_| ConfigError::InvalidEnvOverride {
                        key: "SIGNOFF_WORKFLOW_SECOND_LINE_ORDER".to_string(),
                        value: value.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
        }
        if let Some(value) = read_env("SIGNOFF_WORKFLOW_ALLOW_PAST_CANCELLATION") {
            self.workflow.allow_past_cancellation =
                parse_bool("SIGNOFF_WORKFLOW_ALLOW_PAST_CANCELLATION", &value)?;
        }

        if let Some(value) = read_env("SIGNOFF_ATTAINMENT_PASSING_THRESHOLD_PCT") {
            self.attainment.passing_threshold_pct =
                parse_f64("SIGNOFF_ATTAINMENT_PASSING_THRESHOLD_PCT", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_ATTAINMENT_CLO_TARGET_PCT") {
            self.attainment.clo_target_pct = parse_f64("SIGNOFF_ATTAINMENT_CLO_TARGET_PCT", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_ATTAINMENT_PLO_TARGET_PCT") {
            self.attainment.plo_target_pct = parse_f64("SIGNOFF_ATTAINMENT_PLO_TARGET_PCT", &value)?;
        }
        if let Some(value) = read_env("SIGNOFF_ATTAINMENT_PEO_TARGET_PCT") {
            self.attainment.peo_target_pct = parse_f64("SIGNOFF_ATTAINMENT_PEO_TARGET_PCT", &value)?;
        }

        let log_level =
            read_env("SIGNOFF_LOGGING_LEVEL").or_else(|| read_env("SIGNOFF_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SIGNOFF_LOGGING_FORMAT").or_else(|| read_env("SIGNOFF_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(allow) = overrides.allow_past_cancellation {
            self.workflow.allow_past_cancellation = allow;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_workflow(&self.workflow)?;
        validate_attainment(&self.attainment)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("signoff.toml"), PathBuf::from("config/signoff.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.second_line_order.is_empty() {
        return Err(ConfigError::Validation(
            "workflow.second_line_order must name at least one role".to_string(),
        ));
    }

    let mut seen = Vec::with_capacity(workflow.second_line_order.len());
    for role in &workflow.second_line_order {
        if seen.contains(role) {
            return Err(ConfigError::Validation(format!(
                "workflow.second_line_order lists `{role:?}` more than once"
            )));
        }
        seen.push(*role);
    }

    Ok(())
}

fn validate_attainment(attainment: &AttainmentConfig) -> Result<(), ConfigError> {
    let fields = [
        ("attainment.passing_threshold_pct", attainment.passing_threshold_pct),
        ("attainment.clo_target_pct", attainment.clo_target_pct),
        ("attainment.plo_target_pct", attainment.plo_target_pct),
        ("attainment.peo_target_pct", attainment.peo_target_pct),
    ];
    for (name, value) in fields {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{name} must be in range 0..=100")));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    workflow: Option<WorkflowPatch>,
    attainment: Option<AttainmentPatch>,
    roles: Option<BTreeMap<String, Vec<String>>>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    second_line_order: Option<Vec<SecondLineRole>>,
    allow_past_cancellation: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct AttainmentPatch {
    passing_threshold_pct: Option<f64>,
    clo_target_pct: Option<f64>,
    plo_target_pct: Option<f64>,
    peo_target_pct: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::capability::{Role, SecondLineRole};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "SIGNOFF_DATABASE_URL",
        "SIGNOFF_WORKFLOW_SECOND_LINE_ORDER",
        "SIGNOFF_WORKFLOW_ALLOW_PAST_CANCELLATION",
        "SIGNOFF_ATTAINMENT_CLO_TARGET_PCT",
        "SIGNOFF_LOG_LEVEL",
        "SIGNOFF_LOG_FORMAT",
        "TEST_SIGNOFF_DB_PATH",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url.starts_with("sqlite://"), "default db is sqlite")?;
        ensure(
            config.workflow.second_line_order
                == vec![SecondLineRole::HrManager, SecondLineRole::AdministrationManager],
            "default second-line order is hr then admin",
        )?;
        ensure(!config.workflow.allow_past_cancellation, "past cancellation off by default")?;
        ensure(
            (config.attainment.passing_threshold_pct - 60.0).abs() < f64::EPSILON,
            "default passing threshold is 60",
        )?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "compact logging default")
    }

    #[test]
    fn file_load_supports_env_interpolation_and_roles() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("TEST_SIGNOFF_DB_PATH", "from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("signoff.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_SIGNOFF_DB_PATH}"

[workflow]
second_line_order = ["administration_manager", "hr_manager"]

[roles]
"hr-1" = ["hr_manager"]
"root" = ["administrator", "admin_manager"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.database.url == "sqlite://from-env.db", "url interpolated from env")?;
            ensure(
                config.workflow.second_line_order[0] == SecondLineRole::AdministrationManager,
                "order read from file",
            )?;
            ensure(
                config.roles.grants.get("root")
                    == Some(&vec![Role::Administrator, Role::AdministrationManager]),
                "role aliases parsed",
            )?;
            ensure(
                config.roles.grants.get("hr-1") == Some(&vec![Role::HrManager]),
                "hr grant parsed",
            )
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn unknown_role_in_file_is_a_validation_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("signoff.toml");
        fs::write(&path, "[roles]\n\"emp-1\" = [\"team_lead\"]\n").map_err(|err| err.to_string())?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Ok(_) => Err("expected unknown role to fail".to_string()),
            Err(error) => ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("roles.emp-1")),
                "validation error names the actor",
            ),
        }
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("SIGNOFF_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SIGNOFF_LOG_LEVEL", "warn");
        env::set_var("SIGNOFF_WORKFLOW_ALLOW_PAST_CANCELLATION", "true");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("signoff.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "error"
format = "json"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "warn", "env log level should win over file")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "file format kept")?;
            ensure(config.workflow.allow_past_cancellation, "env flag applied")
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("SIGNOFF_ATTAINMENT_CLO_TARGET_PCT", "140");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("attainment.clo_target_pct")
                ),
                "validation failure should mention attainment.clo_target_pct",
            ),
        };

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn malformed_env_role_order_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("SIGNOFF_WORKFLOW_SECOND_LINE_ORDER", "hr_manager,janitor");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override".to_string()),
            Err(error) => ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. }
                    if key == "SIGNOFF_WORKFLOW_SECOND_LINE_ORDER"),
                "error names the env key",
            ),
        };

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn repeated_role_in_order_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("SIGNOFF_WORKFLOW_SECOND_LINE_ORDER", "hr_manager,hr_manager");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected a validation error".to_string()),
            Err(error) => ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("more than once")),
                "error names the repeated role",
            ),
        };

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("absent.toml");
        match AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => Err("expected missing file error".to_string()),
            Err(error) => {
                ensure(matches!(error, ConfigError::MissingConfigFile(_)), "missing file error")
            }
        }
    }
}
