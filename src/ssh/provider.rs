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

//! The streaming contract between the executor and a session provider.
//!
//! A provider opens one session per target and hands back four independent
//! sources: stdout lines, stderr lines, a one-shot completion signal and
//! asynchronous errors. The executor never sees transport details beyond that.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::error::SessionError;
use crate::target::SessionConfig;

/// Lines buffered per source before the producer waits for the consumer.
pub const STREAM_CHANNEL_CAPACITY: usize = 256;

/// How a session's streaming phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The remote command finished and its output was fully delivered.
    Finished,
    /// The read timeout elapsed before the command finished.
    TimedOut,
}

impl Completion {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Completion::TimedOut)
    }
}

/// The consuming half of a session: the four event sources.
#[derive(Debug)]
pub struct SessionStreams {
    pub stdout: mpsc::Receiver<String>,
    pub stderr: mpsc::Receiver<String>,
    pub done: oneshot::Receiver<Completion>,
    pub errors: mpsc::Receiver<SessionError>,
}

/// Returned when the executor has stopped listening to a session.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("session output is no longer being consumed")]
pub struct StreamClosed;

/// The producing half of a session.
///
/// Everything sent before [`StreamSender::finish`] is observed by the consumer
/// before it acts on the completion signal.
#[derive(Debug)]
pub struct StreamSender {
    stdout: mpsc::Sender<String>,
    stderr: mpsc::Sender<String>,
    done: oneshot::Sender<Completion>,
    errors: mpsc::Sender<SessionError>,
}

impl StreamSender {
    pub async fn stdout(&self, line: String) -> Result<(), StreamClosed> {
        self.stdout.send(line).await.map_err(|_| StreamClosed)
    }

    pub async fn stderr(&self, line: String) -> Result<(), StreamClosed> {
        self.stderr.send(line).await.map_err(|_| StreamClosed)
    }

    pub async fn error(&self, error: SessionError) -> Result<(), StreamClosed> {
        self.errors.send(error).await.map_err(|_| StreamClosed)
    }

    /// Signal completion. No further events can be sent afterwards.
    pub fn finish(self, completion: Completion) -> Result<(), StreamClosed> {
        self.done.send(completion).map_err(|_| StreamClosed)
    }

    /// True once the consumer has dropped its receivers.
    pub fn is_closed(&self) -> bool {
        self.done.is_closed()
    }

    /// Resolves once the consumer has dropped its receivers.
    pub async fn closed(&mut self) {
        self.done.closed().await
    }
}

/// Create a connected sender/streams pair.
pub fn session_channels() -> (StreamSender, SessionStreams) {
    let (stdout_tx, stdout_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let (stderr_tx, stderr_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let (errors_tx, errors_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel();

    (
        StreamSender {
            stdout: stdout_tx,
            stderr: stderr_tx,
            done: done_tx,
            errors: errors_tx,
        },
        SessionStreams {
            stdout: stdout_rx,
            stderr: stderr_rx,
            done: done_rx,
            errors: errors_rx,
        },
    )
}

/// Opens a remote session for one target and starts the command.
///
/// An `Err` means the session could not be established or the command could
/// not be submitted; nothing was streamed. Once `Ok` is returned, every later
/// failure travels through [`SessionStreams::errors`].
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(
        &self,
        config: &SessionConfig,
        command: &str,
    ) -> Result<SessionStreams, SessionError>;
}
