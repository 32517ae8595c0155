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

use russh::client::Handler;

use super::error::SessionError;

/// russh client handler for one hop (gateway or target).
///
/// Host keys are not verified: every presented key is accepted and its
/// fingerprint logged at debug level.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
}

impl ClientHandler {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }
}

impl Handler for ClientHandler {
    type Error = SessionError;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "Accepting host key for {}: {}",
            self.hostname,
            server_public_key.fingerprint(Default::default())
        );
        Ok(true)
    }
}
