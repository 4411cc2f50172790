//! Service settings loaded from the environment.

use crate::errors::ConfigError;
use crate::generation::{DEFAULT_ENGINE_COMMAND, DEFAULT_MAX_TURNS};
use crate::observability::LogFormat;
use crate::runner::CommandSpec;
use crate::stages::{BotIdentity, PublishTargets, DEFAULT_BUILD_COMMAND, DEFAULT_OUTPUT_DIR};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Settings for the HTTP service and the pipeline it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Project directory every run operates on.
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    /// Key prefix inside the artifact buckets.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Development artifact bucket.
    #[serde(default = "default_dev_bucket")]
    pub dev_bucket: String,
    /// Production artifact bucket.
    #[serde(default = "default_prod_bucket")]
    pub prod_bucket: String,
    /// Build command line.
    #[serde(default = "default_build_command")]
    pub build_command: String,
    /// Build output directory, relative to the project.
    #[serde(default = "default_output_dir")]
    pub build_output_dir: String,
    /// Configuration document, relative to the project.
    #[serde(default = "default_config_file")]
    pub config_file: String,
    /// Generation engine program.
    #[serde(default = "default_engine_command")]
    pub engine_command: String,
    /// Upper bound on engine turns per run.
    #[serde(default = "default_max_turns")]
    pub engine_max_turns: u32,
    /// Commit author name used when the repository has none.
    #[serde(default = "default_bot_name")]
    pub git_bot_name: String,
    /// Commit author email used when the repository has none.
    #[serde(default = "default_bot_email")]
    pub git_bot_email: String,
    /// Push remote; `None` pushes to the default remote.
    #[serde(default)]
    pub git_remote: Option<String>,
    /// Per-run event queue depth.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_project_dir() -> PathBuf {
    PathBuf::from("./project")
}

fn default_app_name() -> String {
    "default-app".to_string()
}

fn default_dev_bucket() -> String {
    PublishTargets::default().dev_bucket
}

fn default_prod_bucket() -> String {
    PublishTargets::default().prod_bucket
}

fn default_build_command() -> String {
    DEFAULT_BUILD_COMMAND.to_string()
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

fn default_config_file() -> String {
    "manifest.config.json".to_string()
}

fn default_engine_command() -> String {
    DEFAULT_ENGINE_COMMAND.to_string()
}

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

fn default_bot_name() -> String {
    BotIdentity::default().name
}

fn default_bot_email() -> String {
    BotIdentity::default().email
}

fn default_event_buffer() -> usize {
    64
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            project_dir: default_project_dir(),
            app_name: default_app_name(),
            dev_bucket: default_dev_bucket(),
            prod_bucket: default_prod_bucket(),
            build_command: default_build_command(),
            build_output_dir: default_output_dir(),
            config_file: default_config_file(),
            engine_command: default_engine_command(),
            engine_max_turns: default_max_turns(),
            git_bot_name: default_bot_name(),
            git_bot_email: default_bot_email(),
            git_remote: None,
            event_buffer: default_event_buffer(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServiceConfig {
    /// Loads settings from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        tracing::info!(
            project_dir = %config.project_dir.display(),
            app_name = %config.app_name,
            "Service configuration loaded"
        );
        Ok(config)
    }

    /// Loads settings through `lookup`; unset or blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get("PORT") {
            config.port = parse_value("PORT", &v)?;
        }
        if let Some(v) = get("HOST") {
            config.host = v;
        }
        if let Some(v) = get("PROJECT_DIR") {
            config.project_dir = PathBuf::from(v);
        }
        if let Some(v) = get("APP_NAME") {
            config.app_name = v;
        }
        if let Some(v) = get("DEV_BUCKET") {
            config.dev_bucket = v;
        }
        if let Some(v) = get("PROD_BUCKET") {
            config.prod_bucket = v;
        }
        if let Some(v) = get("BUILD_COMMAND") {
            config.build_command = v;
        }
        if let Some(v) = get("BUILD_OUTPUT_DIR") {
            config.build_output_dir = v;
        }
        if let Some(v) = get("CONFIG_FILE") {
            config.config_file = v;
        }
        if let Some(v) = get("ENGINE_COMMAND") {
            config.engine_command = v;
        }
        if let Some(v) = get("ENGINE_MAX_TURNS") {
            config.engine_max_turns = parse_value("ENGINE_MAX_TURNS", &v)?;
            if config.engine_max_turns == 0 {
                return Err(invalid("ENGINE_MAX_TURNS", &v, "must be at least 1"));
            }
        }
        if let Some(v) = get("GIT_BOT_NAME") {
            config.git_bot_name = v;
        }
        if let Some(v) = get("GIT_BOT_EMAIL") {
            config.git_bot_email = v;
        }
        config.git_remote = get("GIT_REMOTE");
        if let Some(v) = get("EVENT_BUFFER") {
            config.event_buffer = parse_value("EVENT_BUFFER", &v)?;
        }
        config.log_format = LogFormat::from_env_value(get("LOG_FORMAT").as_deref());

        Ok(config)
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the absolute-or-relative path of the configuration document.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.project_dir.join(&self.config_file)
    }

    /// Returns the build output path.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.project_dir.join(&self.build_output_dir)
    }

    /// Returns the publish targets.
    #[must_use]
    pub fn publish_targets(&self) -> PublishTargets {
        PublishTargets {
            dev_bucket: self.dev_bucket.clone(),
            prod_bucket: self.prod_bucket.clone(),
            app_name: self.app_name.clone(),
        }
    }

    /// Returns the bot identity.
    #[must_use]
    pub fn bot_identity(&self) -> BotIdentity {
        BotIdentity {
            name: self.git_bot_name.clone(),
            email: self.git_bot_email.clone(),
        }
    }

    /// Parses the build command line.
    pub fn build_command_spec(&self) -> Result<CommandSpec, ConfigError> {
        CommandSpec::parse(&self.build_command)
            .ok_or_else(|| invalid("BUILD_COMMAND", &self.build_command, "must not be blank"))
    }
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| invalid(key, value, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.config_path(), PathBuf::from("./project/manifest.config.json"));
        assert_eq!(config.build_command_spec().unwrap().to_string(), "npm run build");
        assert_eq!(config.engine_max_turns, 50);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("APP_NAME", "storefront"),
            ("PROJECT_DIR", "/srv/site"),
            ("GIT_REMOTE", "origin"),
            ("LOG_FORMAT", "json"),
            ("ENGINE_MAX_TURNS", "12"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.publish_targets().app_name, "storefront");
        assert_eq!(config.output_path(), PathBuf::from("/srv/site/dist"));
        assert_eq!(config.git_remote.as_deref(), Some("origin"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.engine_max_turns, 12);
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[("APP_NAME", "  "), ("GIT_REMOTE", "")])).unwrap();
        assert_eq!(config.app_name, "default-app");
        assert!(config.git_remote.is_none());
    }

    #[test]
    fn test_invalid_port() {
        let err = ServiceConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, "PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_max_turns_rejected() {
        assert!(ServiceConfig::from_lookup(lookup(&[("ENGINE_MAX_TURNS", "0")])).is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ServiceConfig = serde_json::from_str(r#"{"port": 4000}"#).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.build_output_dir, "dist");
    }
}
