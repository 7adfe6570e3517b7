#![allow(clippy::multiple_crate_versions)]

use marketo::{ClientConfig, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const APP_NAME: &str = "marketo";

/// Where a credential comes from.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Secret {
    Literal(String),
    Env { env: String },
    Cmd { cmd: String },
}

impl Default for Secret {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("Literal(..)"),
            Self::Env { env } => f.debug_struct("Env").field("env", env).finish(),
            Self::Cmd { cmd } => f.debug_struct("Cmd").field("cmd", cmd).finish(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketoConfig {
    /// Instance root, e.g. `https://123-ABC-456.mktorest.com`
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub client_id: Secret,
    #[serde(default)]
    pub client_secret: Secret,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub debug: bool,
}

impl Default for MarketoConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            client_id: Secret::default(),
            client_secret: Secret::default(),
            timeout: default_timeout(),
            debug: false,
        }
    }
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Confy(#[from] confy::ConfyError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("missing `{field}` in config; set it in the marketo config file")]
    Missing { field: &'static str },
    #[error("environment variable '{env}' not found")]
    MissingEnv { env: String },
    #[error("secret command failed: {cmd}: {message}")]
    CommandFailed { cmd: String, message: String },
    #[error("failed to execute secret command '{cmd}': {source}")]
    CommandExec { cmd: String, source: io::Error },
    #[error("secret command returned empty output: {cmd}")]
    CommandEmpty { cmd: String },
    #[error(
        "credentials required but stdin is not interactive; set `endpoint`, `client_id` and `client_secret` in {path} (example: client_secret = {{ env = \"MARKETO_CLIENT_SECRET\" }})",
        path = .path.display()
    )]
    NonInteractive { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl MarketoConfig {
    /// Loads the config file from the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or deserialized.
    pub fn load() -> Result<Self> {
        Ok(confy::load(APP_NAME, None)?)
    }

    /// Loads the config file at `path`, creating it with defaults if absent.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or deserialized.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Ok(confy::load_path(path)?)
    }

    /// Loads config or walks the user through entering missing values.
    ///
    /// # Errors
    /// Returns an error if the config cannot be loaded, a secret cannot be
    /// resolved, or onboarding fails (including non-interactive stdin).
    pub fn load_or_onboard() -> Result<Self> {
        let config = Self::load()?;
        if config.is_complete() {
            config.client_config()?;
            return Ok(config);
        }
        config.onboard()
    }

    /// Stores the config to the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn store(&self) -> Result<()> {
        confy::store(APP_NAME, None, self)?;
        Ok(())
    }

    /// Resolves both secrets and builds the client settings.
    ///
    /// # Errors
    /// Returns an error if the endpoint is blank or a secret cannot be
    /// resolved or is empty.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::Missing { field: "endpoint" });
        }
        let client_id = self.client_id.resolve("client_id")?;
        let client_secret = self.client_secret.resolve("client_secret")?;
        Ok(ClientConfig::new(client_id, client_secret, endpoint)
            .with_timeout(self.timeout)
            .with_debug(self.debug))
    }

    fn is_complete(&self) -> bool {
        !self.endpoint.trim().is_empty()
            && !self.client_id.is_blank()
            && !self.client_secret.is_blank()
    }

    fn onboard(mut self) -> Result<Self> {
        let config_path = confy::get_configuration_file_path(APP_NAME, None)?;
        if !io::stdin().is_terminal() {
            return Err(ConfigError::NonInteractive { path: config_path });
        }

        if !config_path.as_os_str().is_empty() {
            eprintln!(
                "Marketo config not found or incomplete. It will be stored at: {}",
                config_path.display()
            );
        }

        if self.endpoint.trim().is_empty() {
            self.endpoint = prompt("REST endpoint (https://XXX-XXX-XXX.mktorest.com)", "endpoint")?;
        }
        if self.client_id.is_blank() {
            self.client_id = Secret::Literal(prompt("Client ID", "client_id")?);
        }
        if self.client_secret.is_blank() {
            self.client_secret = Secret::Literal(prompt("Client secret", "client_secret")?);
        }

        self.store()?;
        Ok(self)
    }
}

fn prompt(label: &str, field: &'static str) -> Result<String> {
    eprint!("{label}: ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing { field });
    }
    Ok(trimmed.to_string())
}

impl Secret {
    fn is_blank(&self) -> bool {
        matches!(self, Self::Literal(value) if value.trim().is_empty())
    }

    fn resolve(&self, field: &'static str) -> Result<String> {
        match self {
            Self::Literal(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ConfigError::Missing { field });
                }
                Ok(trimmed.to_string())
            }
            Self::Env { env } => {
                let value =
                    std::env::var(env).map_err(|_| ConfigError::MissingEnv { env: env.clone() })?;
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ConfigError::Missing { field });
                }
                Ok(trimmed.to_string())
            }
            Self::Cmd { cmd } => {
                let output = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .output()
                    .map_err(|e| ConfigError::CommandExec {
                        cmd: cmd.clone(),
                        source: e,
                    })?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(ConfigError::CommandFailed {
                        cmd: cmd.clone(),
                        message: stderr.trim().to_string(),
                    });
                }

                let stdout = String::from_utf8_lossy(&output.stdout);
                let trimmed = stdout.trim();
                if trimmed.is_empty() {
                    return Err(ConfigError::CommandEmpty { cmd: cmd.clone() });
                }
                Ok(trimmed.to_string())
            }
        }
    }
}
