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

//! Drives one target's session from open to terminal report.

use std::sync::Arc;
use std::time::Duration;

use super::aggregator::{FailureReport, FailureSender};
use super::output::OutputSink;
use crate::ssh::{Completion, SessionError, SessionProvider, SessionStreams};
use crate::target::SessionConfig;

/// Runs the command on one target and forwards its output.
///
/// The runner never fails: every problem becomes a [`FailureReport`] on the
/// shared channel.
pub struct SessionRunner {
    provider: Arc<dyn SessionProvider>,
    output: Arc<dyn OutputSink>,
    failures: FailureSender,
}

impl SessionRunner {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        output: Arc<dyn OutputSink>,
        failures: FailureSender,
    ) -> Self {
        Self {
            provider,
            output,
            failures,
        }
    }

    pub async fn run(&self, session: &SessionConfig, command: &str, read_timeout: Duration) {
        let label = session.label();
        tracing::debug!("[{}] opening session", label);

        let streams = match self.provider.open(session, command).await {
            Ok(streams) => streams,
            Err(e) => {
                tracing::debug!("[{}] session failed to open: {}", label, e);
                self.report(FailureReport::error(label, e));
                return;
            }
        };

        let (completion, pending) = self.stream(label, streams, read_timeout).await;

        if let Some(error) = pending {
            self.report(FailureReport::error(label, error));
        }
        if completion.is_timed_out() {
            self.report(FailureReport::timeout(label));
        }
        tracing::debug!("[{}] session done: {:?}", label, completion);
    }

    /// Forward lines until completion or the read deadline, whichever is first.
    ///
    /// Returns how streaming ended and the last asynchronous error seen.
    async fn stream(
        &self,
        label: &str,
        streams: SessionStreams,
        read_timeout: Duration,
    ) -> (Completion, Option<SessionError>) {
        let SessionStreams {
            mut stdout,
            mut stderr,
            mut done,
            mut errors,
        } = streams;

        let mut pending = None;
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut errors_open = true;

        let deadline = tokio::time::sleep(read_timeout);
        tokio::pin!(deadline);

        let completion = loop {
            tokio::select! {
                line = stdout.recv(), if stdout_open => match line {
                    Some(line) => self.emit_stdout(label, &line),
                    None => stdout_open = false,
                },
                line = stderr.recv(), if stderr_open => match line {
                    Some(line) => self.emit_stderr(label, &line),
                    None => stderr_open = false,
                },
                error = errors.recv(), if errors_open => match error {
                    Some(error) => pending = Some(error),
                    None => errors_open = false,
                },
                completion = &mut done => match completion {
                    Ok(completion) => break completion,
                    Err(_) => {
                        if pending.is_none() {
                            pending = Some(SessionError::ClosedWithoutStatus);
                        }
                        break Completion::Finished;
                    }
                },
                _ = &mut deadline => break Completion::TimedOut,
            }
        };

        // Everything the provider queued before signalling completion is
        // delivered before the terminal report.
        if !completion.is_timed_out() {
            while let Ok(line) = stdout.try_recv() {
                self.emit_stdout(label, &line);
            }
            while let Ok(line) = stderr.try_recv() {
                self.emit_stderr(label, &line);
            }
            while let Ok(error) = errors.try_recv() {
                pending = Some(error);
            }
        }

        (completion, pending)
    }

    fn emit_stdout(&self, label: &str, line: &str) {
        if !line.is_empty() {
            self.output.stdout_line(label, line);
        }
    }

    fn emit_stderr(&self, label: &str, line: &str) {
        if !line.is_empty() {
            self.output.stderr_line(label, line);
        }
    }

    fn report(&self, report: FailureReport) {
        if self.failures.send(report).is_err() {
            tracing::error!("Failure channel closed before the run finished");
        }
    }
}
