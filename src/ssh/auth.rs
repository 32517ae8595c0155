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

//! SSH authentication.
//!
//! Secrets are prompted for once per run, before any connection is opened, so
//! that concurrent workers never fight over the terminal. Each connection then
//! tries the planned methods in order until the server accepts one.

use anyhow::{Context, Result};
use russh::client::{Handle, Handler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::error::SessionError;

/// Authentication hints collected from the command line.
#[derive(Clone, Default)]
pub struct AuthOptions {
    password: Option<Zeroizing<String>>,
    passphrase: Option<Zeroizing<String>>,
    disable_agent: bool,
}

impl std::fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOptions")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("disable_agent", &self.disable_agent)
            .finish()
    }
}

impl AuthOptions {
    /// Prompt for whatever secrets the flags ask for.
    pub fn collect(ask_password: bool, ask_passphrase: bool, disable_agent: bool) -> Result<Self> {
        let password = if ask_password {
            Some(Zeroizing::new(
                rpassword::prompt_password("SSH password: ").context("Failed to read password")?,
            ))
        } else {
            None
        };

        let passphrase = if ask_passphrase {
            Some(Zeroizing::new(
                rpassword::prompt_password("Private key passphrase: ")
                    .context("Failed to read passphrase")?,
            ))
        } else {
            None
        };

        Ok(Self {
            password,
            passphrase,
            disable_agent,
        })
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Zeroizing::new(password.to_string()));
        self
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.to_string()));
        self
    }

    pub fn with_agent_disabled(mut self, disable_agent: bool) -> Self {
        self.disable_agent = disable_agent;
        self
    }

    /// Methods to try, in order, for a connection using `key_path`.
    ///
    /// 1. password, when one was entered
    /// 2. the SSH agent, unless disabled or `SSH_AUTH_SOCK` is unset
    /// 3. the given key file, or the default keys under `~/.ssh` without one
    pub fn plan(&self, key_path: Option<&Path>) -> Vec<AuthMethod> {
        let mut methods = Vec::new();

        if let Some(password) = &self.password {
            methods.push(AuthMethod::Password(password.clone()));
        }

        #[cfg(not(target_os = "windows"))]
        if !self.disable_agent && std::env::var("SSH_AUTH_SOCK").is_ok() {
            methods.push(AuthMethod::Agent);
        }

        match key_path {
            Some(path) => methods.push(AuthMethod::PrivateKeyFile {
                key_file_path: path.to_path_buf(),
                key_pass: self.passphrase.clone(),
                explicit: true,
            }),
            None => methods.extend(default_key_files().into_iter().map(|path| {
                AuthMethod::PrivateKeyFile {
                    key_file_path: path,
                    key_pass: self.passphrase.clone(),
                    explicit: false,
                }
            })),
        }

        methods
    }
}

fn default_key_files() -> Vec<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let ssh_dir = Path::new(&home).join(".ssh");
    ["id_ed25519", "id_rsa", "id_ecdsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .filter(|path| path.exists())
        .collect()
}

/// One way of proving identity to a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKeyFile {
        key_file_path: PathBuf,
        key_pass: Option<Zeroizing<String>>,
        /// Given with `-k` rather than found under `~/.ssh`.
        explicit: bool,
    },
    #[cfg(not(target_os = "windows"))]
    Agent,
}

/// Load a private key for authentication.
///
/// A key given with `-k` that fails to load is an error. A discovered key that
/// fails to load (wrong passphrase, unsupported format) is skipped.
fn load_key(
    key_file_path: &Path,
    key_pass: Option<&str>,
    explicit: bool,
) -> Result<Option<russh::keys::PrivateKey>, SessionError> {
    match russh::keys::load_secret_key(key_file_path, key_pass) {
        Ok(key) => Ok(Some(key)),
        Err(source) if explicit => Err(SessionError::KeyInvalid {
            path: key_file_path.to_path_buf(),
            source,
        }),
        Err(e) => {
            tracing::debug!("Skipping key {:?}: {}", key_file_path, e);
            Ok(None)
        }
    }
}

/// Try each method until one succeeds.
///
/// A rejected method moves on to the next.
pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    addr: &str,
    methods: Vec<AuthMethod>,
) -> Result<(), SessionError> {
    for method in methods {
        let accepted = match method {
            AuthMethod::Password(password) => {
                tracing::debug!("Trying password authentication for {}@{}", username, addr);
                handle
                    .authenticate_password(username, &**password)
                    .await?
                    .success()
            }
            AuthMethod::PrivateKeyFile {
                key_file_path,
                key_pass,
                explicit,
            } => {
                tracing::debug!("Trying key {:?} for {}@{}", key_file_path, username, addr);
                let Some(private_key) = load_key(
                    &key_file_path,
                    key_pass.as_ref().map(|p| p.as_str()),
                    explicit,
                )?
                else {
                    continue;
                };
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(
                        username,
                        russh::keys::PrivateKeyWithHashAlg::new(Arc::new(private_key), hash_alg),
                    )
                    .await?
                    .success()
            }
            #[cfg(not(target_os = "windows"))]
            AuthMethod::Agent => agent_authenticate(handle, username).await,
        };

        if accepted {
            tracing::debug!("Authenticated {}@{}", username, addr);
            return Ok(());
        }
    }

    Err(SessionError::AuthenticationFailed {
        user: username.to_string(),
        addr: addr.to_string(),
    })
}

#[cfg(not(target_os = "windows"))]
async fn agent_authenticate<H: Handler>(handle: &mut Handle<H>, username: &str) -> bool {
    let mut agent = match russh::keys::agent::client::AgentClient::connect_env().await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::warn!("Failed to connect to SSH agent: {e}");
            return false;
        }
    };

    let identities = match agent.request_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            tracing::warn!("Failed to request identities from SSH agent: {e}");
            return false;
        }
    };

    for identity in identities {
        let hash_alg = match handle.best_supported_rsa_hash().await {
            Ok(hash_alg) => hash_alg.flatten(),
            Err(_) => None,
        };
        let result = handle
            .authenticate_publickey_with(username, identity, hash_alg, &mut agent)
            .await;
        if let Ok(auth_result) = result {
            if auth_result.success() {
                return true;
            }
        }
    }

    false
}
