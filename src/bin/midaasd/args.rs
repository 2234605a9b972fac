// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements command-line argument parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use midaas::name::{self, Name};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The midaas zone record web service
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server
    Run(RunArgs),
}

/// Arguments of the `run` command. Everything except the bind address
/// can also come from the environment; values given here (or in the
/// environment) take precedence over the configuration file.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Set the configuration file to use
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Set the server bind IP address and port
    #[arg(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,

    /// Set the server bind IP address
    #[arg(long, conflicts_with = "bind", value_name = "IP")]
    pub ip: Option<IpAddr>,

    /// Set the server port
    #[arg(long, conflicts_with = "bind", value_name = "PORT")]
    pub port: Option<u16>,

    /// Set the directory holding the zone files
    #[arg(long, env = "MIDAAS_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Set the key name that clients must present
    #[arg(long, env = "MIDAAS_KEYNAME", value_name = "NAME")]
    pub keyname: Option<String>,

    /// Set the key value that clients must present
    #[arg(long, env = "MIDAAS_KEYVALUE", hide_env_values = true, value_name = "SECRET")]
    pub keyvalue: Option<String>,

    /// Set the zones to serve
    #[arg(
        long,
        env = "MIDAAS_ZONE",
        value_delimiter = ',',
        value_name = "ZONE,...",
        value_parser = parse_zone_name
    )]
    pub zones: Vec<Name>,
}

/// Parses a zone name, ignoring surrounding whitespace (so that
/// `MIDAAS_ZONE="a.local, b.local"` works).
fn parse_zone_name(s: &str) -> Result<Name, name::Error> {
    s.trim().parse()
}
