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

//! Parallel command dispatch and run-wide failure accounting.

mod aggregator;
mod dispatcher;
mod runner;

pub mod exit_status;
pub mod output;

pub use aggregator::{ErrorAggregator, FailureKind, FailureReport, FailureSender, RunOutcome};
pub use dispatcher::Dispatcher;
pub use exit_status::ExitStatus;
pub use output::{tag_line, BufferedSink, ConsoleSink, OutputSink};
pub use runner::SessionRunner;
