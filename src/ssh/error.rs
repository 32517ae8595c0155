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

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Everything a session can fail with, from dialing to the remote exit status.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Box<SessionError>,
    },

    #[error("invalid port '{port}' for {host}")]
    InvalidPort { host: String, port: String },

    #[error("failed to open tunnel to {target} through gateway {gateway}: {source}")]
    GatewayTunnel {
        gateway: String,
        target: String,
        #[source]
        source: russh::Error,
    },

    #[error("ssh: unable to authenticate {user}@{addr}, no supported methods remain")]
    AuthenticationFailed { user: String, addr: String },

    #[error("failed to load private key {path:?}: {source}")]
    KeyInvalid {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    #[error("remote rejected the command request")]
    CommandRejected,

    #[error("Process exited with status {0}")]
    ExitStatus(u32),

    #[error("Process exited with signal {0}")]
    ExitSignal(String),

    #[error("session closed before the command reported an exit status")]
    ClosedWithoutStatus,

    #[error("ssh: {0}")]
    Ssh(#[from] russh::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure reported by a provider that is not backed by russh.
    #[error("{0}")]
    Provider(String),
}

impl SessionError {
    pub fn provider(message: impl Into<String>) -> Self {
        SessionError::Provider(message.into())
    }
}
