//! Harness configuration.
//!
//! Every field has a default, so a JSON file only needs to name what it
//! changes. Environment variables (`SVCFLOW_*`) are applied on top of
//! either the defaults ([`HarnessConfig::from_env`]) or a file
//! ([`HarnessConfig::from_file`]).

use crate::auth::CognitoCredentials;
use crate::errors::ConfigError;
use crate::poll::PollPolicy;
use crate::transport::TokenScheme;
use crate::utils::SERVICE_NAME_PREFIX;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Prefix of every environment variable the harness reads.
pub const ENV_PREFIX: &str = "SVCFLOW_";

/// Default Cognito identity endpoint.
pub const DEFAULT_AUTH_URL: &str = "https://cognito-idp.us-east-1.amazonaws.com/";

/// Attempt budget and delay for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Maximum number of polls.
    pub max_attempts: u32,
    /// Delay between polls, in milliseconds.
    pub interval_ms: u64,
}

impl PollSettings {
    /// Creates poll settings.
    #[must_use]
    pub const fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
        }
    }

    /// Converts to a checked policy.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `max_attempts` is zero.
    pub fn policy(&self) -> Result<PollPolicy, ConfigError> {
        PollPolicy::new(self.max_attempts, Duration::from_millis(self.interval_ms))
    }
}

/// Poll settings per resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Feature-engineering report.
    pub report: PollSettings,
    /// Training experiment.
    pub experiment: PollSettings,
    /// Deployment.
    pub deployment: PollSettings,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            report: PollSettings::new(15, 4_000),
            experiment: PollSettings::new(20, 4_000),
            deployment: PollSettings::new(20, 4_000),
        }
    }
}

/// Fixed request values for the provisioning workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Prefix of the generated service name.
    pub service_name_prefix: String,
    /// Cloud the dataset lives in.
    pub cloud: String,
    /// Storage source of the dataset.
    pub source: String,
    /// Dataset bucket.
    pub bucket: String,
    /// Dataset key within the bucket.
    pub key: String,
    /// Dataset type.
    pub data_type: String,
    /// Target column for feature engineering.
    pub target_column: String,
    /// Problem type for feature engineering.
    pub problem_type: String,
    /// Feature-engineering engine.
    pub fe_engine: String,
    /// Training mode.
    pub training_mode: String,
    /// Training launch mode.
    pub launch_mode: String,
    /// IAM role the training job runs as.
    pub role_arn: String,
    /// Feature flags that must answer before the service is created.
    pub feature_flags: Vec<FeatureFlag>,
}

/// A `GET /featureFlags?flag=&feature=&count=1` lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// The flag name, e.g. `knowledge-graph`.
    pub flag: String,
    /// The feature the flag applies to, e.g. `FE`.
    pub feature: String,
}

impl FeatureFlag {
    /// Creates a flag lookup.
    #[must_use]
    pub fn new(flag: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            feature: feature.into(),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            service_name_prefix: SERVICE_NAME_PREFIX.to_string(),
            cloud: "AWS".to_string(),
            source: "S3".to_string(),
            bucket: "aiclub-projects".to_string(),
            key: "cats-dogs".to_string(),
            data_type: "image".to_string(),
            target_column: "category".to_string(),
            problem_type: "auto".to_string(),
            fe_engine: "aws-sklearn-serverless".to_string(),
            training_mode: "aws-tensorflow-serverless".to_string(),
            launch_mode: "automatic".to_string(),
            role_arn: String::new(),
            feature_flags: Vec::new(),
        }
    }
}

/// Harness configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root URL of the remote API.
    pub api_base_url: String,
    /// Identity endpoint URL.
    pub auth_url: String,
    /// Login user name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Identity app client id.
    pub client_id: String,
    /// How the token is attached to calls.
    pub token_scheme: TokenScheme,
    /// Per-request timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Directory produced ids are persisted to.
    pub store_dir: PathBuf,
    /// Poll budgets.
    pub polling: PollingSettings,
    /// Workflow request values.
    pub workflow: WorkflowSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            username: String::new(),
            password: String::new(),
            client_id: String::new(),
            token_scheme: TokenScheme::default(),
            request_timeout_secs: 30,
            store_dir: PathBuf::from(".svcflow"),
            polling: PollingSettings::default(),
            workflow: WorkflowSettings::default(),
        }
    }
}

impl fmt::Debug for HarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("api_base_url", &self.api_base_url)
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("token_scheme", &self.token_scheme)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("store_dir", &self.store_dir)
            .field("polling", &self.polling)
            .field("workflow", &self.workflow)
            .finish()
    }
}

impl HarnessConfig {
    /// Loads defaults overridden by `SVCFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Loads a JSON file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or a
    /// variable cannot be parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup.
    ///
    /// Unset and empty variables leave the current value alone.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a numeric or enum variable cannot
    /// be parsed.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|value| !value.trim().is_empty())
        };

        for (suffix, field) in [
            ("API_BASE_URL", &mut self.api_base_url),
            ("AUTH_URL", &mut self.auth_url),
            ("USERNAME", &mut self.username),
            ("PASSWORD", &mut self.password),
            ("CLIENT_ID", &mut self.client_id),
            ("ROLE_ARN", &mut self.workflow.role_arn),
            ("DATASET_BUCKET", &mut self.workflow.bucket),
            ("DATASET_KEY", &mut self.workflow.key),
        ] {
            if let Some(value) = var(suffix) {
                *field = value;
            }
        }

        if let Some(value) = var("STORE_DIR") {
            self.store_dir = PathBuf::from(value);
        }
        if let Some(value) = var("TOKEN_SCHEME") {
            self.token_scheme = parse_var("TOKEN_SCHEME", &value)?;
        }
        if let Some(value) = var("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", &value)?;
        }

        for (kind, settings) in [
            ("REPORT", &mut self.polling.report),
            ("EXPERIMENT", &mut self.polling.experiment),
            ("DEPLOYMENT", &mut self.polling.deployment),
        ] {
            let attempts = format!("{kind}_MAX_ATTEMPTS");
            if let Some(value) = var(&attempts) {
                settings.max_attempts = parse_var(&attempts, &value)?;
            }
            let interval = format!("{kind}_INTERVAL_MS");
            if let Some(value) = var(&interval) {
                settings.interval_ms = parse_var(&interval, &value)?;
            }
        }

        Ok(())
    }

    /// Checks that the configuration can drive a run.
    ///
    /// Credentials are not checked here; see
    /// [`cognito_credentials`](Self::cognito_credentials).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first unusable field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("api_base_url", &self.api_base_url)?;
        check_url("auth_url", &self.auth_url)?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("request_timeout_secs", "must be at least 1"));
        }
        for (field, settings) in [
            ("polling.report", &self.polling.report),
            ("polling.experiment", &self.polling.experiment),
            ("polling.deployment", &self.polling.deployment),
        ] {
            if settings.max_attempts == 0 {
                return Err(ConfigError::invalid(
                    format!("{field}.max_attempts"),
                    "must be at least 1",
                ));
            }
        }
        if self.workflow.role_arn.trim().is_empty() {
            return Err(ConfigError::invalid(
                "workflow.role_arn",
                format!("must be set (or {ENV_PREFIX}ROLE_ARN)"),
            ));
        }
        Ok(())
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the login details for the identity endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the user name, password or client
    /// id is empty.
    pub fn cognito_credentials(&self) -> Result<CognitoCredentials, ConfigError> {
        for (field, value) in [
            ("username", &self.username),
            ("password", &self.password),
            ("client_id", &self.client_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "required to log in"));
            }
        }
        Ok(CognitoCredentials {
            auth_url: self.auth_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            client_id: self.client_id.clone(),
        })
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(format!("{ENV_PREFIX}{name}"), e.to_string()))
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::invalid(field, "must be an http(s) URL"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn valid() -> HarnessConfig {
        HarnessConfig {
            api_base_url: "https://api.example.com".to_string(),
            workflow: WorkflowSettings {
                role_arn: "arn:aws:iam::123:role/train".to_string(),
                ..WorkflowSettings::default()
            },
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.polling.report, PollSettings::new(15, 4_000));
        assert_eq!(config.polling.experiment, PollSettings::new(20, 4_000));
        assert_eq!(config.polling.deployment, PollSettings::new(20, 4_000));
        assert_eq!(config.token_scheme, TokenScheme::Raw);
        assert_eq!(config.workflow.fe_engine, "aws-sklearn-serverless");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarnessConfig::default();
        config
            .apply_env(env(&[
                ("SVCFLOW_API_BASE_URL", "https://api.example.com"),
                ("SVCFLOW_TOKEN_SCHEME", "bearer"),
                ("SVCFLOW_REPORT_MAX_ATTEMPTS", "3"),
                ("SVCFLOW_DEPLOYMENT_INTERVAL_MS", "250"),
                ("SVCFLOW_USERNAME", ""),
            ]))
            .unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.token_scheme, TokenScheme::Bearer);
        assert_eq!(config.polling.report.max_attempts, 3);
        assert_eq!(config.polling.deployment.interval_ms, 250);
        assert_eq!(config.username, "");
    }

    #[test]
    fn test_env_parse_error_names_variable() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_env(env(&[("SVCFLOW_REQUEST_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("SVCFLOW_REQUEST_TIMEOUT_SECS"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HarnessConfig = serde_json::from_str(
            r#"{"api_base_url": "https://api.example.com", "polling": {"report": {"max_attempts": 2, "interval_ms": 10}}}"#,
        )
        .unwrap();

        assert_eq!(config.polling.report, PollSettings::new(2, 10));
        assert_eq!(config.polling.deployment, PollSettings::new(20, 4_000));
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svcflow.json");
        std::fs::write(&path, r#"{"api_base_url": "https://file.example.com", "request_timeout_secs": 5}"#)
            .unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(config.workflow.feature_flags.is_empty());
    }

    #[test]
    fn test_feature_flags_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svcflow.json");
        std::fs::write(
            &path,
            r#"{"workflow": {"feature_flags": [{"flag": "knowledge-graph", "feature": "FE"}]}}"#,
        )
        .unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.workflow.feature_flags, vec![FeatureFlag::new("knowledge-graph", "FE")]);
        assert_eq!(config.workflow.bucket, "aiclub-projects");
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.api_base_url = String::new();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.polling.experiment.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("polling.experiment.max_attempts"));

        let mut config = valid();
        config.workflow.role_arn = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policies_from_settings() {
        let policy = PollSettings::new(15, 4_000).policy().unwrap();
        assert_eq!(policy.ceiling(), Duration::from_secs(60));
        assert!(PollSettings::new(0, 4_000).policy().is_err());
    }

    #[test]
    fn test_cognito_credentials_required() {
        assert!(valid().cognito_credentials().is_err());

        let config = HarnessConfig {
            username: "u".to_string(),
            password: "p".to_string(),
            client_id: "c".to_string(),
            ..valid()
        };
        let creds = config.cognito_credentials().unwrap();
        assert_eq!(creds.auth_url, DEFAULT_AUTH_URL);
    }

    #[test]
    fn test_debug_hides_password() {
        let config = HarnessConfig {
            password: "hunter2".to_string(),
            ..valid()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
