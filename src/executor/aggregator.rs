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

//! Run-wide failure collection.
//!
//! Workers push [`FailureReport`]s into an unbounded channel so they never
//! block on reporting. A single task prints each report and records that the
//! run failed. When stopped it drains whatever is still queued first.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::output::OutputSink;

/// What went wrong for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Error(String),
    ReadTimeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Error(message) => write!(f, "error: {message}"),
            FailureKind::ReadTimeout => f.write_str("timeout while read from stream"),
        }
    }
}

/// A single failure attributable to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub target: String,
    pub kind: FailureKind,
}

impl FailureReport {
    pub fn error(target: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            target: target.into(),
            kind: FailureKind::Error(message.to_string()),
        }
    }

    pub fn timeout(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: FailureKind::ReadTimeout,
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.target, self.kind)
    }
}

pub type FailureSender = mpsc::UnboundedSender<FailureReport>;

/// Whether any target failed during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Set on the first report, or when the aggregator itself died and the
    /// count may be incomplete.
    pub failed: bool,
    /// Number of reports observed.
    pub failures: usize,
}

pub struct ErrorAggregator {
    cancel: CancellationToken,
    handle: JoinHandle<RunOutcome>,
}

impl ErrorAggregator {
    /// Start the aggregator task. Reports are written to `output`'s
    /// diagnostic stream as they arrive.
    pub fn spawn(output: Arc<dyn OutputSink>) -> (Self, FailureSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(collect(rx, cancel.clone(), output));
        (Self { cancel, handle }, tx)
    }

    /// Stop the aggregator and return what it saw.
    ///
    /// Must be called only after every worker holding a sender has finished;
    /// reports queued by then are still recorded.
    pub async fn stop(self) -> RunOutcome {
        self.cancel.cancel();
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Failure aggregator task failed: {}", e);
                RunOutcome {
                    failed: true,
                    failures: 0,
                }
            }
        }
    }
}

async fn collect(
    mut rx: mpsc::UnboundedReceiver<FailureReport>,
    cancel: CancellationToken,
    output: Arc<dyn OutputSink>,
) -> RunOutcome {
    let mut outcome = RunOutcome::default();
    let mut record = |report: FailureReport| {
        output.stderr_line(&report.target, &report.kind.to_string());
        outcome.failed = true;
        outcome.failures += 1;
    };

    loop {
        tokio::select! {
            report = rx.recv() => match report {
                Some(report) => record(report),
                None => break,
            },
            _ = cancel.cancelled() => {
                while let Ok(report) = rx.try_recv() {
                    record(report);
                }
                break;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::output::BufferedSink;

    #[test]
    fn test_report_wording() {
        assert_eq!(
            FailureReport::error("10.0.0.1:22", "connection refused").to_string(),
            "[10.0.0.1:22] error: connection refused"
        );
        assert_eq!(
            FailureReport::timeout("web").to_string(),
            "[web] timeout while read from stream"
        );
    }

    #[tokio::test]
    async fn test_no_reports_is_success() {
        let sink = Arc::new(BufferedSink::new());
        let (aggregator, tx) = ErrorAggregator::spawn(sink.clone());
        drop(tx);
        let outcome = aggregator.stop().await;
        assert_eq!(outcome, RunOutcome::default());
        assert!(sink.stderr_lines().is_empty());
    }

    #[tokio::test]
    async fn test_reports_queued_before_stop_are_kept() {
        let sink = Arc::new(BufferedSink::new());
        let (aggregator, tx) = ErrorAggregator::spawn(sink.clone());
        for i in 0..500 {
            tx.send(FailureReport::error(format!("host{i}"), "boom"))
                .unwrap();
        }
        tx.send(FailureReport::timeout("slow")).unwrap();

        let outcome = aggregator.stop().await;
        assert!(outcome.failed);
        assert_eq!(outcome.failures, 501);
        assert_eq!(sink.stderr_lines().len(), 501);
        assert!(sink
            .stderr_lines()
            .contains(&"[slow] timeout while read from stream".to_string()));
    }

    #[tokio::test]
    async fn test_reports_after_all_senders_dropped_are_counted() {
        let sink = Arc::new(BufferedSink::new());
        let (aggregator, tx) = ErrorAggregator::spawn(sink.clone());
        tx.send(FailureReport::error("web", "boom")).unwrap();
        drop(tx);
        tokio::task::yield_now().await;

        let outcome = aggregator.stop().await;
        assert_eq!(
            outcome,
            RunOutcome {
                failed: true,
                failures: 1
            }
        );
        assert_eq!(sink.stderr_lines(), vec!["[web] error: boom"]);
    }
}
