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

//! The russh-backed session provider.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Sig};
use std::sync::Arc;
use tracing::debug;

use super::auth::AuthOptions;
use super::client::{connect, Connection};
use super::error::SessionError;
use super::lines::LineBuffer;
use super::provider::{
    session_channels, Completion, SessionProvider, SessionStreams, StreamClosed, StreamSender,
};
use crate::target::SessionConfig;

/// Runs commands over SSH, one session per target.
#[derive(Debug, Clone, Default)]
pub struct SshSessionProvider {
    auth: Arc<AuthOptions>,
}

impl SshSessionProvider {
    pub fn new(auth: AuthOptions) -> Self {
        Self {
            auth: Arc::new(auth),
        }
    }
}

#[async_trait]
impl SessionProvider for SshSessionProvider {
    async fn open(
        &self,
        config: &SessionConfig,
        command: &str,
    ) -> Result<SessionStreams, SessionError> {
        let connection = connect(config, &self.auth).await?;

        let channel = match open_exec(&connection, command).await {
            Ok(channel) => channel,
            Err(e) => {
                connection.disconnect().await;
                return Err(e);
            }
        };

        let (sender, streams) = session_channels();
        let label = config.label().to_string();
        tokio::spawn(async move {
            pump(connection, channel, sender, &label).await;
        });

        Ok(streams)
    }
}

async fn open_exec(
    connection: &Connection,
    command: &str,
) -> Result<Channel<Msg>, SessionError> {
    let channel = connection.handle.channel_open_session().await?;
    channel.exec(true, command).await?;
    Ok(channel)
}

/// How the remote side ended the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteExit {
    Status(u32),
    Signal(String),
    Rejected,
}

/// The error a finished channel reports, if any.
fn exit_error(exit: Option<RemoteExit>) -> Option<SessionError> {
    match exit {
        Some(RemoteExit::Status(0)) => None,
        Some(RemoteExit::Status(code)) => Some(SessionError::ExitStatus(code)),
        Some(RemoteExit::Signal(name)) => Some(SessionError::ExitSignal(name)),
        Some(RemoteExit::Rejected) => Some(SessionError::CommandRejected),
        None => Some(SessionError::ClosedWithoutStatus),
    }
}

fn signal_name(signal: &Sig) -> String {
    match signal {
        Sig::Custom(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

async fn pump(
    connection: Connection,
    mut channel: Channel<Msg>,
    mut sender: StreamSender,
    label: &str,
) {
    match forward(&mut channel, &mut sender).await {
        Ok(exit) => {
            if let Some(error) = exit_error(exit) {
                // The runner may already be gone; nothing left to tell it then.
                let _ = sender.error(error).await;
            }
            let _ = sender.finish(Completion::Finished);
        }
        Err(StreamClosed) => {
            debug!("[{}] output no longer consumed, closing channel", label);
            if let Err(e) = channel.close().await {
                debug!("[{}] failed to close channel: {}", label, e);
            }
        }
    }

    connection.disconnect().await;
}

/// Forward channel data as lines until the channel closes.
async fn forward(
    channel: &mut Channel<Msg>,
    sender: &mut StreamSender,
) -> Result<Option<RemoteExit>, StreamClosed> {
    let mut stdout = LineBuffer::new();
    let mut stderr = LineBuffer::new();
    let mut exit = None;

    loop {
        let msg = tokio::select! {
            msg = channel.wait() => msg,
            _ = sender.closed() => return Err(StreamClosed),
        };
        let Some(msg) = msg else {
            break;
        };

        match msg {
            ChannelMsg::Data { ref data } => {
                for line in stdout.push(data) {
                    sender.stdout(line).await?;
                }
            }
            ChannelMsg::ExtendedData { ref data, ext } => {
                if ext == 1 {
                    for line in stderr.push(data) {
                        sender.stderr(line).await?;
                    }
                }
            }
            // Data may still follow the exit status.
            ChannelMsg::ExitStatus { exit_status } => {
                exit = Some(RemoteExit::Status(exit_status))
            }
            ChannelMsg::ExitSignal { signal_name: sig, .. } => {
                exit = Some(RemoteExit::Signal(signal_name(&sig)))
            }
            ChannelMsg::Failure => {
                exit = Some(RemoteExit::Rejected);
                break;
            }
            _ => {}
        }
    }

    if let Some(line) = stdout.finish() {
        sender.stdout(line).await?;
    }
    if let Some(line) = stderr.finish() {
        sender.stderr(line).await?;
    }

    Ok(exit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_status_is_clean() {
        assert!(exit_error(Some(RemoteExit::Status(0))).is_none());
    }

    #[test]
    fn test_nonzero_status_is_reported() {
        let error = exit_error(Some(RemoteExit::Status(3))).unwrap();
        assert_eq!(error.to_string(), "Process exited with status 3");
    }

    #[test]
    fn test_missing_status_is_reported() {
        assert!(matches!(
            exit_error(None),
            Some(SessionError::ClosedWithoutStatus)
        ));
        assert!(matches!(
            exit_error(Some(RemoteExit::Rejected)),
            Some(SessionError::CommandRejected)
        ));
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(&Sig::TERM), "TERM");
        assert_eq!(signal_name(&Sig::Custom("USR9".to_string())), "USR9");
        assert_eq!(
            exit_error(Some(RemoteExit::Signal("KILL".to_string())))
                .unwrap()
                .to_string(),
            "Process exited with signal KILL"
        );
    }
}
