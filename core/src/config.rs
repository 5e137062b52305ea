use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const ENGINE_VAR: &str = "HAZARD_ENGINE";
pub const RUNS_DIR_VAR: &str = "HAZARD_RUNS_DIR";
pub const ALLOW_NETWORK_VAR: &str = "HAZARD_ALLOW_NETWORK";
pub const ENGINE_ARGS_VAR: &str = "HAZARD_ENGINE_ARGS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerEngine {
    #[default]
    Docker,
    Podman,
    /// Runs the tool's command directly on the host, ignoring the image.
    Local,
}

impl ContainerEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerEngine::Docker => "docker",
            ContainerEngine::Podman => "podman",
            ContainerEngine::Local => "local",
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, ContainerEngine::Local)
    }
}

impl FromStr for ContainerEngine {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(ContainerEngine::Docker),
            "podman" => Ok(ContainerEngine::Podman),
            "local" => Ok(ContainerEngine::Local),
            other => Err(ConfigError::InvalidEngine(other.to_string())),
        }
    }
}

impl fmt::Display for ContainerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown container engine '{0}' (expected docker, podman or local)")]
    InvalidEngine(String),
    #[error("{key} must be true or false, got '{value}'")]
    InvalidFlag { key: &'static str, value: String },
    #[error("{key} is not a valid argument list: {reason}")]
    InvalidArgs { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub engine: ContainerEngine,
    /// Each run gets a fresh `<runs_dir>/<run-id>/` directory.
    pub runs_dir: PathBuf,
    /// When false, tools that declare `NetworkAccess` are refused.
    pub allow_network: bool,
    /// Extra arguments passed to `docker run` / `podman run` before the image.
    pub engine_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            engine: ContainerEngine::Docker,
            runs_dir: PathBuf::from("runs"),
            allow_network: true,
            engine_args: Vec::new(),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from defaults overridden by `lookup` (usually the environment).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(engine) = lookup(ENGINE_VAR).filter(|value| !value.trim().is_empty()) {
            config.engine = engine.parse()?;
        }
        if let Some(dir) = lookup(RUNS_DIR_VAR).filter(|value| !value.trim().is_empty()) {
            config.runs_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(ALLOW_NETWORK_VAR).filter(|value| !value.trim().is_empty()) {
            config.allow_network = parse_flag(ALLOW_NETWORK_VAR, &flag)?;
        }
        if let Some(args) = lookup(ENGINE_ARGS_VAR) {
            config.engine_args =
                shell_words::split(&args).map_err(|err| ConfigError::InvalidArgs {
                    key: ENGINE_ARGS_VAR,
                    reason: err.to_string(),
                })?;
        }

        Ok(config)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key,
            value: value.to_string(),
        }),
    }
}
