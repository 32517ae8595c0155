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

//! Line-atomic output for tagged remote lines.
//!
//! Every worker writes through an [`OutputSink`]. The console sink holds a
//! process-wide lock per stream while writing one line, so lines coming from
//! different targets never interleave partially.

use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

static STDOUT_MUTEX: Lazy<Mutex<io::Stdout>> = Lazy::new(|| Mutex::new(io::stdout()));

static STDERR_MUTEX: Lazy<Mutex<io::Stderr>> = Lazy::new(|| Mutex::new(io::stderr()));

/// Prefix `line` with the target label: `"[label] line"`.
pub fn tag_line(label: &str, line: &str) -> String {
    format!("[{label}] {line}")
}

/// Destination for tagged lines.
pub trait OutputSink: Send + Sync {
    /// Write one line to the success stream.
    fn stdout_line(&self, label: &str, line: &str);

    /// Write one line to the diagnostic stream.
    fn stderr_line(&self, label: &str, line: &str);
}

/// Writes to the process stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

// A panic while holding the lock leaves the handle itself intact.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn write_line<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
    writeln!(writer, "{text}")?;
    writer.flush()
}

impl OutputSink for ConsoleSink {
    fn stdout_line(&self, label: &str, line: &str) {
        let text = tag_line(label, line);
        if let Err(e) = write_line(&mut *lock(&STDOUT_MUTEX), &text) {
            tracing::debug!("Failed to write to stdout: {}", e);
        }
    }

    fn stderr_line(&self, label: &str, line: &str) {
        let text = tag_line(label, line);
        if let Err(e) = write_line(&mut *lock(&STDERR_MUTEX), &text) {
            tracing::debug!("Failed to write to stderr: {}", e);
        }
    }
}

/// Collects tagged lines in memory.
#[derive(Debug, Default)]
pub struct BufferedSink {
    stdout: Mutex<Vec<String>>,
    stderr: Mutex<Vec<String>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout_lines(&self) -> Vec<String> {
        lock(&self.stdout).clone()
    }

    pub fn stderr_lines(&self) -> Vec<String> {
        lock(&self.stderr).clone()
    }
}

impl OutputSink for BufferedSink {
    fn stdout_line(&self, label: &str, line: &str) {
        lock(&self.stdout).push(tag_line(label, line));
    }

    fn stderr_line(&self, label: &str, line: &str) {
        lock(&self.stderr).push(tag_line(label, line));
    }
}
