//! # Run Configuration
//!
//! Reads `aws_config.json` from the working directory. The file names the
//! launch template to start the instance from and the private key used to
//! reach it:
//!
//! ```json
//! { "template_id": "lt-0123456789abcdef0", "ssh_file": "/home/me/.ssh/exoctk.pem" }
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::remote::HostKeyPolicy;

/// Default configuration file name, resolved against the working directory.
pub const CONFIG_FILE: &str = "aws_config.json";

/// Login user of the Amazon Linux images the launch templates are built on.
pub const DEFAULT_SSH_USER: &str = "ec2-user";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AwsConfig {
    /// Launch template the instance is created from.
    pub template_id: String,
    /// Path to the private key matching the template's key pair.
    pub ssh_file: PathBuf,
    /// Overrides the region picked up from the environment.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing AWS configuration file (\"{}\")", .0.display())]
    Missing(PathBuf),
    #[error("Failed to read AWS configuration file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid AWS configuration file {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads the configuration at `path`.
///
/// A missing file is reported as [`ConfigError::Missing`] before anything
/// else happens.
pub fn load(path: &Path) -> Result<AwsConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
