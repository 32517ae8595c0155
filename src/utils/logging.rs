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

use tracing_subscriber::EnvFilter;

/// Create an environment filter based on verbosity level
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG wins, so russh internals can be inspected directly
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new("sshcast=warn"),
            1 => EnvFilter::new("sshcast=info"),
            // -vv: include russh debug logs for handshake troubleshooting
            2 => EnvFilter::new("sshcast=debug,russh=debug"),
            _ => EnvFilter::new("sshcast=trace,russh=trace"),
        }
    }
}

/// Initialize console logging.
///
/// Logs go to stderr; stdout carries only tagged remote output.
pub fn init_logging(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(create_env_filter(verbosity))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_create_env_filter_levels() {
        let saved = std::env::var("RUST_LOG").ok();
        std::env::remove_var("RUST_LOG");

        let filter = |v: u8| create_env_filter(v).to_string().to_lowercase();
        assert_eq!(filter(0), "sshcast=warn");
        assert_eq!(filter(1), "sshcast=info");
        assert!(filter(2).contains("russh=debug"));
        assert!(filter(7).contains("sshcast=trace"));

        if let Some(value) = saved {
            std::env::set_var("RUST_LOG", value);
        }
    }
}
