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

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use sshcast::{
    cli::Cli,
    config::{FileConfig, RunConfig},
    executor::{Dispatcher, ExitStatus},
    inventory::Inventory,
    ssh::{AuthOptions, SshSessionProvider},
    utils::init_logging,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("{e:#}");
            ExitStatus::Failure.into()
        }
    }
}

async fn run(cli: Cli) -> Result<ExitStatus> {
    let file_config = FileConfig::load(&cli.config).await?;
    let config = RunConfig::resolve(&cli, &file_config)?;

    let addrs = match &cli.inventory {
        Some(path) => Inventory::load(path).await?.resolve(&cli.addrs),
        None => cli.addrs.clone(),
    };
    tracing::debug!("Resolved targets: {:?}", addrs);

    let auth = AuthOptions::collect(cli.pass, cli.passphrase, cli.disable_agent)?;
    let provider = Arc::new(SshSessionProvider::new(auth));

    let outcome = Dispatcher::new(config, provider).dispatch(&addrs).await;
    Ok(ExitStatus::from(&outcome))
}
