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

//! Connection descriptors for targets and the optional gateway.
//!
//! Nothing here validates its input. A malformed address is carried through
//! unchanged and surfaces later as a connection error from the session provider.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::RunConfig;

/// Port used when an address carries none.
pub const DEFAULT_SSH_PORT: &str = "22";

/// Split `host[:port]` on colons, keeping only the first two segments.
fn split_host_port(raw: &str) -> (String, String) {
    let mut parts = raw.split(':');
    let host = parts.next().unwrap_or_default().to_string();
    let port = parts
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_SSH_PORT.to_string());
    (host, port)
}

/// A single dispatched endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    /// The address exactly as the user (or inventory) supplied it.
    pub raw: String,
    pub host: String,
    pub port: String,
}

impl TargetAddress {
    pub fn parse(raw: &str) -> Self {
        let (host, port) = split_host_port(raw);
        Self {
            raw: raw.to_string(),
            host,
            port,
        }
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// How the user part is cut out of a raw gateway address.
///
/// `Legacy` splits on the two-character marker `"@s"`, which is what existing
/// invocations depend on: `alice@shost` means user `alice` on host `host`, while
/// `alice@host` is taken as a host literally named `alice@host`. `At` splits on
/// a plain `@`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayUserSeparator {
    #[default]
    Legacy,
    At,
}

impl GatewayUserSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayUserSeparator::Legacy => "@s",
            GatewayUserSeparator::At => "@",
        }
    }
}

/// Jump host every session is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySpec {
    pub user: String,
    pub host: String,
    pub port: String,
}

impl GatewaySpec {
    /// Parse a raw gateway address. Returns `None` for an empty string.
    pub fn parse(raw: &str, default_user: &str, separator: GatewayUserSeparator) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }

        let (host_part, port) = split_host_port(raw);
        let segments: Vec<&str> = host_part.split(separator.as_str()).collect();
        let (user, host) = match segments.as_slice() {
            [user, host, ..] => (user.to_string(), host.to_string()),
            _ => (default_user.to_string(), host_part.clone()),
        };

        Some(Self { user, host, port })
    }
}

impl fmt::Display for GatewaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Everything a session provider needs to reach one target.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user: String,
    pub target: TargetAddress,
    pub key_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub gateway: Option<GatewaySpec>,
}

impl SessionConfig {
    /// Build the descriptor for one raw target address.
    pub fn build(raw_addr: &str, config: &RunConfig) -> Self {
        Self {
            user: config.user.clone(),
            target: TargetAddress::parse(raw_addr),
            key_path: config.key_path.clone(),
            connect_timeout: config.connect_timeout,
            gateway: config.gateway.clone(),
        }
    }

    /// Label used to prefix every line produced for this target.
    pub fn label(&self) -> &str {
        &self.target.raw
    }
}
