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

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "sshcast",
    version,
    about = "Run one command on many hosts over SSH in parallel",
    long_about = "sshcast runs a single shell command on every given host at the same time.\nEach line of remote output is printed as it arrives, prefixed with the host address.\nRemote stdout goes to stdout, remote stderr and all failures go to stderr.\n\nExit codes: 0 (no failures), 1 (any connection, command or timeout failure)",
    after_help = "EXAMPLES:\n  Run on two hosts:            sshcast -a web1 -a web2:2222 -c uptime\n  Through a jump host:         sshcast -G bastion:22 -a 10.0.0.5 -c 'df -h'\n  Hosts from an inventory:     sshcast -i hosts.ini -a webservers -c 'systemctl is-active nginx'"
)]
pub struct Cli {
    #[arg(
        short = 'a',
        long = "addr",
        value_delimiter = ',',
        help = "Machine address as host[:port] (or host/group name from the inventory)\nRepeat the flag or separate with commas"
    )]
    pub addrs: Vec<String>,

    #[arg(short = 'u', long, help = "SSH user [default: current user]")]
    pub user: Option<String>,

    #[arg(
        short = 'P',
        long,
        default_value_t = 22,
        help = "SSH port number (per-host ports come from each address)"
    )]
    pub port: u16,

    #[arg(
        short = 'G',
        long,
        help = "SSH gateway address as [user@s]host[:port]"
    )]
    pub gateway: Option<String>,

    #[arg(
        long,
        help = "Split the gateway user on '@' instead of the legacy '@s' marker"
    )]
    pub gateway_user_at: bool,

    #[arg(short = 'k', long, help = "Private key path")]
    pub key: Option<PathBuf>,

    #[arg(short = 'c', long, help = "Command to run")]
    pub cmd: Option<String>,

    #[arg(
        short = 'p',
        long,
        help = "Ask for the SSH password instead of using a private key"
    )]
    pub pass: bool,

    #[arg(
        short = 'A',
        long = "disable-agent",
        help = "Don't use the SSH agent for authentication"
    )]
    pub disable_agent: bool,

    #[arg(long, help = "Ask for the private key passphrase")]
    pub passphrase: bool,

    #[arg(
        long,
        value_parser = humantime::parse_duration,
        help = "SSH connect timeout, e.g. 1s or 500ms [default: 1s]"
    )]
    pub timeout: Option<Duration>,

    #[arg(
        long,
        value_parser = humantime::parse_duration,
        help = "SSH stream read timeout, e.g. 10m [default: 10m]"
    )]
    pub rtimeout: Option<Duration>,

    #[arg(short = 'i', long, help = "Ansible inventory file (INI format)")]
    pub inventory: Option<PathBuf>,

    #[arg(
        long,
        default_value = "~/.config/sshcast/config.yaml",
        help = "Defaults file (YAML)"
    )]
    pub config: PathBuf,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}
