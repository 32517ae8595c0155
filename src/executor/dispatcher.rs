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

use futures::future::join_all;
use std::sync::Arc;

use super::aggregator::{ErrorAggregator, FailureReport, RunOutcome};
use super::output::{ConsoleSink, OutputSink};
use super::runner::SessionRunner;
use crate::config::RunConfig;
use crate::ssh::SessionProvider;
use crate::target::SessionConfig;

/// Fans the command out to every target at once.
pub struct Dispatcher {
    config: Arc<RunConfig>,
    provider: Arc<dyn SessionProvider>,
    output: Arc<dyn OutputSink>,
}

impl Dispatcher {
    pub fn new(config: RunConfig, provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            output: Arc::new(ConsoleSink),
        }
    }

    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    /// Run the command on every address and wait for all of them.
    ///
    /// There is no limit on concurrency: one task is spawned per address.
    pub async fn dispatch(&self, addrs: &[String]) -> RunOutcome {
        if addrs.is_empty() {
            tracing::info!("No targets given, nothing to do");
            return RunOutcome::default();
        }

        let (aggregator, failures) = ErrorAggregator::spawn(Arc::clone(&self.output));
        tracing::info!("Dispatching to {} target(s)", addrs.len());

        let tasks: Vec<_> = addrs
            .iter()
            .map(|addr| {
                let session = SessionConfig::build(addr, &self.config);
                let runner = SessionRunner::new(
                    Arc::clone(&self.provider),
                    Arc::clone(&self.output),
                    failures.clone(),
                );
                let command = self.config.command.clone();
                let read_timeout = self.config.read_timeout;

                tokio::spawn(async move {
                    runner.run(&session, &command, read_timeout).await;
                })
            })
            .collect();

        let results = join_all(tasks).await;

        for (addr, result) in addrs.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!("Task failed: {}", e);
                let report =
                    FailureReport::error(addr.as_str(), format!("worker task failed: {e}"));
                if failures.send(report).is_err() {
                    tracing::error!("Failure channel closed before the run finished");
                }
            }
        }

        // Every worker is done; only our own sender remains.
        drop(failures);
        aggregator.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::output::BufferedSink;
    use crate::ssh::{SessionError, SessionStreams};
    use async_trait::async_trait;

    struct RefusingProvider;

    #[async_trait]
    impl SessionProvider for RefusingProvider {
        async fn open(
            &self,
            config: &SessionConfig,
            _command: &str,
        ) -> Result<SessionStreams, SessionError> {
            Err(SessionError::provider(format!(
                "dial tcp {}: connection refused",
                config.label()
            )))
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl SessionProvider for PanickingProvider {
        async fn open(
            &self,
            _config: &SessionConfig,
            _command: &str,
        ) -> Result<SessionStreams, SessionError> {
            panic!("provider bug");
        }
    }

    #[tokio::test]
    async fn test_empty_target_list_succeeds() {
        let sink = Arc::new(BufferedSink::new());
        let dispatcher = Dispatcher::new(RunConfig::new("uptime"), Arc::new(RefusingProvider))
            .with_output(sink.clone());

        let outcome = dispatcher.dispatch(&[]).await;
        assert!(!outcome.failed);
        assert!(sink.stderr_lines().is_empty());
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        let sink = Arc::new(BufferedSink::new());
        let dispatcher = Dispatcher::new(RunConfig::new("uptime"), Arc::new(RefusingProvider))
            .with_output(sink.clone());

        let addrs: Vec<String> = (0..50).map(|i| format!("10.0.0.{i}:22")).collect();
        let outcome = dispatcher.dispatch(&addrs).await;

        assert!(outcome.failed);
        assert_eq!(outcome.failures, 50);
        let lines = sink.stderr_lines();
        assert_eq!(lines.len(), 50);
        assert!(lines.contains(
            &"[10.0.0.7:22] error: dial tcp 10.0.0.7:22: connection refused".to_string()
        ));
    }

    #[tokio::test]
    async fn test_panicking_worker_becomes_a_failure() {
        let sink = Arc::new(BufferedSink::new());
        let dispatcher = Dispatcher::new(RunConfig::new("uptime"), Arc::new(PanickingProvider))
            .with_output(sink.clone());

        let outcome = dispatcher.dispatch(&["web1".to_string()]).await;
        assert!(outcome.failed);
        assert_eq!(outcome.failures, 1);
        let lines = sink.stderr_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[web1] error: worker task failed"));
    }
}
