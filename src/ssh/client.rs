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

//! Connection establishment, directly or through the gateway.
//!
//! The connect timeout bounds each network step (TCP connect plus key
//! exchange, and the tunnel through the gateway). Authentication is not
//! bounded by it.

use russh::client::{Config, Handle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::auth::{authenticate, AuthOptions};
use super::error::SessionError;
use super::handler::ClientHandler;
use crate::target::{GatewaySpec, SessionConfig};

/// An authenticated session to a target.
///
/// When routed through a gateway the gateway session is kept alongside, since
/// the target session is tunnelled inside it.
pub struct Connection {
    pub handle: Handle<ClientHandler>,
    gateway: Option<Handle<ClientHandler>>,
}

impl Connection {
    /// Close the target session, then the gateway session.
    pub async fn disconnect(self) {
        if let Err(e) = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
        {
            debug!("Error while disconnecting: {e}");
        }
        if let Some(gateway) = self.gateway {
            if let Err(e) = gateway
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await
            {
                debug!("Error while disconnecting from gateway: {e}");
            }
        }
    }
}

async fn with_connect_timeout<T, F>(
    addr: &str,
    timeout: Duration,
    step: F,
) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    tokio::time::timeout(timeout, step)
        .await
        .map_err(|_| SessionError::ConnectTimeout {
            addr: addr.to_string(),
            timeout,
        })?
        .map_err(|source| SessionError::Connect {
            addr: addr.to_string(),
            source: Box::new(source),
        })
}

/// Open and authenticate a session for `config`.
pub async fn connect(
    config: &SessionConfig,
    auth: &AuthOptions,
) -> Result<Connection, SessionError> {
    let ssh_config = Arc::new(Config::default());
    let target = &config.target;
    let target_addr = format!("{}:{}", target.host, target.port);

    match &config.gateway {
        None => {
            debug!("Connecting to {}", target_addr);
            let mut handle = with_connect_timeout(
                &target_addr,
                config.connect_timeout,
                russh::client::connect(
                    ssh_config,
                    target_addr.clone(),
                    ClientHandler::new(target.host.clone()),
                ),
            )
            .await?;

            authenticate(
                &mut handle,
                &config.user,
                &target_addr,
                auth.plan(config.key_path.as_deref()),
            )
            .await?;

            Ok(Connection {
                handle,
                gateway: None,
            })
        }
        Some(gateway) => {
            let gateway_handle = connect_gateway(gateway, config, auth, ssh_config.clone()).await?;

            let port: u32 = target
                .port
                .parse()
                .map_err(|_| SessionError::InvalidPort {
                    host: target.host.clone(),
                    port: target.port.clone(),
                })?;

            debug!("Opening tunnel to {} through gateway {}", target_addr, gateway);
            let channel = tokio::time::timeout(
                config.connect_timeout,
                gateway_handle.channel_open_direct_tcpip(target.host.clone(), port, "127.0.0.1", 0),
            )
            .await
            .map_err(|_| SessionError::ConnectTimeout {
                addr: target_addr.clone(),
                timeout: config.connect_timeout,
            })?
            .map_err(|source| SessionError::GatewayTunnel {
                gateway: gateway.to_string(),
                target: target_addr.clone(),
                source,
            })?;

            let mut handle = with_connect_timeout(
                &target_addr,
                config.connect_timeout,
                russh::client::connect_stream(
                    ssh_config,
                    channel.into_stream(),
                    ClientHandler::new(target.host.clone()),
                ),
            )
            .await?;

            authenticate(
                &mut handle,
                &config.user,
                &target_addr,
                auth.plan(config.key_path.as_deref()),
            )
            .await?;

            Ok(Connection {
                handle,
                gateway: Some(gateway_handle),
            })
        }
    }
}

async fn connect_gateway(
    gateway: &GatewaySpec,
    config: &SessionConfig,
    auth: &AuthOptions,
    ssh_config: Arc<Config>,
) -> Result<Handle<ClientHandler>, SessionError> {
    let gateway_addr = format!("{}:{}", gateway.host, gateway.port);
    debug!("Connecting to gateway {}", gateway);

    let mut handle = with_connect_timeout(
        &gateway_addr,
        config.connect_timeout,
        russh::client::connect(
            ssh_config,
            gateway_addr.clone(),
            ClientHandler::new(gateway.host.clone()),
        ),
    )
    .await?;

    authenticate(
        &mut handle,
        &gateway.user,
        &gateway_addr,
        auth.plan(config.key_path.as_deref()),
    )
    .await?;

    Ok(handle)
}
