// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Run configuration.
//!
//! A run is described by one immutable [`RunConfig`], assembled from the
//! command line on top of an optional YAML defaults file and then shared by
//! every worker.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::cli::Cli;
use crate::target::{GatewaySpec, GatewayUserSeparator};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_PORT: u16 = 22;

/// Settings for one dispatch, fixed before the first worker starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub command: String,
    pub user: String,
    /// Accepted from the command line but never used to build a connection;
    /// the per-target port always comes from the address string.
    pub default_port: u16,
    pub key_path: Option<PathBuf>,
    pub gateway: Option<GatewaySpec>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl RunConfig {
    /// Configuration with built-in defaults for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            user: current_username(),
            default_port: DEFAULT_PORT,
            key_path: None,
            gateway: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Merge command-line flags over the defaults file.
    pub fn resolve(cli: &Cli, file: &FileConfig) -> Result<Self> {
        let command = cli.cmd.clone().unwrap_or_default();
        if command.is_empty() {
            anyhow::bail!("cmd not set");
        }

        let defaults = &file.defaults;
        let user = cli
            .user
            .clone()
            .or_else(|| defaults.user.clone())
            .unwrap_or_else(current_username);

        let key_path = cli
            .key
            .clone()
            .or_else(|| defaults.key.as_ref().map(PathBuf::from))
            .map(|path| expand_tilde(&path));

        let separator = if cli.gateway_user_at {
            GatewayUserSeparator::At
        } else {
            GatewayUserSeparator::Legacy
        };
        let gateway_raw = cli
            .gateway
            .clone()
            .or_else(|| defaults.gateway.clone())
            .unwrap_or_default();
        let gateway = GatewaySpec::parse(&gateway_raw, &user, separator);

        let connect_timeout = match cli.timeout {
            Some(timeout) => timeout,
            None => parse_duration_field("timeout", defaults.timeout.as_deref())?
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        };
        let read_timeout = match cli.rtimeout {
            Some(timeout) => timeout,
            None => parse_duration_field("rtimeout", defaults.rtimeout.as_deref())?
                .unwrap_or(DEFAULT_READ_TIMEOUT),
        };

        if cli.port != DEFAULT_PORT {
            tracing::debug!(
                "--port {} is ignored; target ports come from each address",
                cli.port
            );
        }

        Ok(Self {
            command,
            user,
            default_port: cli.port,
            key_path,
            gateway,
            connect_timeout,
            read_timeout,
        })
    }
}

/// Optional YAML defaults file.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct FileConfig {
    #[serde(default)]
    pub defaults: FileDefaults,
}

/// Values used when the matching flag is absent.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct FileDefaults {
    pub user: Option<String>,
    pub key: Option<String>,
    pub gateway: Option<String>,
    /// Connect timeout, humantime syntax (`2s`, `500ms`).
    pub timeout: Option<String>,
    /// Stream read timeout, humantime syntax (`5m`).
    pub rtimeout: Option<String>,
}

impl FileConfig {
    /// Load the defaults file. A missing file yields empty defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path).await.with_context(|| {
            format!(
                "Failed to read configuration file at {}",
                expanded_path.display()
            )
        })?;

        let config: FileConfig = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}",
                expanded_path.display()
            )
        })?;

        Ok(config)
    }
}

fn parse_duration_field(name: &str, value: Option<&str>) -> Result<Option<Duration>> {
    value
        .map(|raw| {
            humantime::parse_duration(raw)
                .with_context(|| format!("Invalid duration for '{name}' in config file: '{raw}'"))
        })
        .transpose()
}

/// Name of the local user, used when no remote user is given.
pub fn current_username() -> String {
    whoami::fallible::username()
        .ok()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "root".to_string())
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if path_str.starts_with("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(path_str.replacen('~', &home, 1));
            }
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["sshcast"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_missing_command_is_rejected() {
        let err = RunConfig::resolve(&cli(&["-a", "h1"]), &FileConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "cmd not set");

        let err =
            RunConfig::resolve(&cli(&["-a", "h1", "-c", ""]), &FileConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "cmd not set");
    }

    #[test]
    fn test_builtin_defaults() {
        let config =
            RunConfig::resolve(&cli(&["-a", "h1", "-c", "uptime"]), &FileConfig::default())
                .unwrap();
        assert_eq!(config.command, "uptime");
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Duration::from_secs(600));
        assert_eq!(config.default_port, 22);
        assert!(config.gateway.is_none());
        assert!(config.key_path.is_none());
        assert!(!config.user.is_empty());
    }

    #[test]
    fn test_file_defaults_apply_when_flags_absent() {
        let file = FileConfig {
            defaults: FileDefaults {
                user: Some("deploy".to_string()),
                key: Some("/etc/keys/id".to_string()),
                gateway: Some("bastion:2222".to_string()),
                timeout: Some("3s".to_string()),
                rtimeout: Some("5m".to_string()),
            },
        };

        let config = RunConfig::resolve(&cli(&["-c", "uptime"]), &file).unwrap();
        assert_eq!(config.user, "deploy");
        assert_eq!(config.key_path, Some(PathBuf::from("/etc/keys/id")));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.read_timeout, Duration::from_secs(300));

        let gw = config.gateway.unwrap();
        assert_eq!(gw.host, "bastion");
        assert_eq!(gw.port, "2222");
        assert_eq!(gw.user, "deploy");
    }

    #[test]
    fn test_cli_overrides_file_defaults() {
        let file = FileConfig {
            defaults: FileDefaults {
                user: Some("deploy".to_string()),
                gateway: Some("bastion".to_string()),
                timeout: Some("3s".to_string()),
                ..FileDefaults::default()
            },
        };

        let config = RunConfig::resolve(
            &cli(&[
                "-c",
                "uptime",
                "-u",
                "ops",
                "-G",
                "ops@jump:22",
                "--gateway-user-at",
                "--timeout",
                "250ms",
            ]),
            &file,
        )
        .unwrap();
        assert_eq!(config.user, "ops");
        assert_eq!(config.connect_timeout, Duration::from_millis(250));

        let gw = config.gateway.unwrap();
        assert_eq!(gw.user, "ops");
        assert_eq!(gw.host, "jump");
    }

    #[test]
    fn test_invalid_duration_in_file() {
        let file = FileConfig {
            defaults: FileDefaults {
                rtimeout: Some("forever".to_string()),
                ..FileDefaults::default()
            },
        };
        let err = RunConfig::resolve(&cli(&["-c", "uptime"]), &file).unwrap_err();
        assert!(err.to_string().contains("rtimeout"));
    }

    #[test]
    fn test_port_flag_does_not_change_targets() {
        let config =
            RunConfig::resolve(&cli(&["-c", "id", "-P", "2200"]), &FileConfig::default()).unwrap();
        assert_eq!(config.default_port, 2200);

        let session = crate::target::SessionConfig::build("node1", &config);
        assert_eq!(session.target.port, "22");
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig::load(&dir.path().join("absent.yaml")).await.unwrap();
        assert!(config.defaults.user.is_none());
    }

    #[tokio::test]
    async fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "defaults:\n  user: deploy\n  gateway: jump:2022\n  rtimeout: 30s\n",
        )
        .unwrap();

        let config = FileConfig::load(&path).await.unwrap();
        assert_eq!(config.defaults.user.as_deref(), Some("deploy"));
        assert_eq!(config.defaults.gateway.as_deref(), Some("jump:2022"));
        assert_eq!(config.defaults.rtimeout.as_deref(), Some("30s"));
    }

    #[tokio::test]
    async fn test_load_invalid_yaml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "defaults: [not, a, map\n").unwrap();
        assert!(FileConfig::load(&path).await.is_err());
    }

    #[test]
    #[serial]
    fn test_expand_tilde() {
        let original_home = std::env::var("HOME").ok();
        std::env::set_var("HOME", "/home/tester");

        let expanded = expand_tilde(Path::new("~/.ssh/id_ed25519"));

        if let Some(home) = original_home {
            std::env::set_var("HOME", home);
        } else {
            std::env::remove_var("HOME");
        }

        assert_eq!(expanded, PathBuf::from("/home/tester/.ssh/id_ed25519"));
        assert_eq!(expand_tilde(Path::new("/abs/key")), PathBuf::from("/abs/key"));
    }
}
