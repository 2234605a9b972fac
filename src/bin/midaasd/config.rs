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

//! Implements the server configuration.
//!
//! The configuration is assembled once at startup from up to three
//! sources, in decreasing order of precedence: the command line, the
//! environment (through `clap`), and an optional TOML configuration
//! file. The result is the immutable [`Config`].

use std::fmt::{self, Write};
use std::fs;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, info, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use midaas::auth::Credentials;
use midaas::name::Name;

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// The complete server configuration.
#[derive(Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub credentials: Credentials,
    pub zones: Vec<Name>,
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V6(Ipv6Addr::LOCALHOST);
const DEFAULT_BIND_PORT: u16 = 8000;
const DEFAULT_DATA_DIR: &str = "/tmp";

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}

/// Loads the server configuration from the parsed command line
/// arguments given by `args` and, if they name one, the configuration
/// file.
pub fn load(args: RunArgs) -> Result<Config> {
    let file_config = match args.config {
        Some(ref path) => {
            info!("Loading the configuration from {}.", path.display());
            load_file(path)?
        }
        None => {
            info!("Loading the configuration from the command line and environment.");
            FileConfig::default()
        }
    };
    let config = merge(args, file_config)?;
    log_config_summary(&config);
    Ok(config)
}

/// Reads and parses the configuration file at `path`. A relative data
/// directory is interpreted relative to the file's directory.
fn load_file(path: &Path) -> Result<FileConfig> {
    let dir = match path.parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path).context("failed to read the configuration file")?;
    let mut config: FileConfig =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;
    if let Some(ref mut data_dir) = config.data_dir {
        if data_dir.is_relative() {
            *data_dir = dir.join(&*data_dir);
        }
    }
    Ok(config)
}

/// Combines the arguments and the file configuration, with the
/// arguments taking precedence, and validates the result.
fn merge(args: RunArgs, file_config: FileConfig) -> Result<Config> {
    let base = file_config.bind.unwrap_or_else(default_bind);
    let bind = args.bind.unwrap_or_else(|| {
        let ip = args.ip.unwrap_or_else(|| base.ip());
        let port = args.port.unwrap_or_else(|| base.port());
        SocketAddr::new(ip, port)
    });

    let data_dir = args
        .data_dir
        .or(file_config.data_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let keyname = args
        .keyname
        .or(file_config.keyname)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("no key name is configured (use --keyname or MIDAAS_KEYNAME)"))?;
    let keyvalue = args
        .keyvalue
        .or(file_config.keyvalue)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("no key value is configured (use --keyvalue or MIDAAS_KEYVALUE)"))?;

    let zones = if args.zones.is_empty() {
        file_config.zones.into_iter().map(|z| z.0).collect()
    } else {
        args.zones
    };
    if zones.is_empty() {
        return Err(anyhow!("no zones are configured (use --zones or MIDAAS_ZONE)"));
    }

    Ok(Config {
        bind,
        data_dir,
        credentials: Credentials::new(keyname, keyvalue),
        zones,
    })
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled. The key value is never logged.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Bind address:   {}\n\
         Data directory: {}\n\
         Key name:       {}\n\
         Zones:          {}",
        config.bind,
        config.data_dir.display(),
        config.credentials.keyname,
        config.zones.len(),
    );
    for zone in &config.zones {
        write!(message, "\n  {}", zone).unwrap();
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The configuration file. Every setting is optional here, since it
/// may instead come from the command line or the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind: Option<SocketAddr>,
    data_dir: Option<PathBuf>,
    keyname: Option<String>,
    keyvalue: Option<String>,
    #[serde(default)]
    zones: Vec<ConfigName>,
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER MIDAAS TYPES FOR SERDE                               //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`midaas`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over a [`midaas`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "zone name");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::args::{Args, Command};

    fn run_args(argv: &[&str]) -> RunArgs {
        let argv = ["midaasd", "run"].into_iter().chain(argv.iter().copied());
        let Command::Run(run_args) = Args::try_parse_from(argv).unwrap().command;
        run_args
    }

    fn parse_file(toml: &str) -> FileConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn file_settings_are_used() {
        let file_config = parse_file(
            r#"
            bind = "127.0.0.1:6666"
            data_dir = "/var/lib/midaas"
            keyname = "ddns-key.d1"
            keyvalue = "s3cret"
            zones = ["d1.dev.local", "Test.Local."]
            "#,
        );
        let config = merge(run_args(&[]), file_config).unwrap();
        assert_eq!(config.bind, "127.0.0.1:6666".parse().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/midaas"));
        assert_eq!(config.credentials, Credentials::new("ddns-key.d1", "s3cret"));
        let zones: Vec<_> = config.zones.iter().map(Name::as_str).collect();
        assert_eq!(zones, ["d1.dev.local", "test.local"]);
    }

    #[test]
    fn arguments_override_the_file() {
        let file_config = parse_file(
            r#"
            bind = "127.0.0.1:6666"
            keyname = "file"
            keyvalue = "file"
            zones = ["file.local"]
            "#,
        );
        let config = merge(
            run_args(&[
                "--port",
                "7777",
                "--keyname",
                "cli",
                "--keyvalue",
                "cli",
                "--zones",
                "cli.local",
            ]),
            file_config,
        )
        .unwrap();
        assert_eq!(config.bind, "127.0.0.1:7777".parse().unwrap());
        assert_eq!(config.credentials, Credentials::new("cli", "cli"));
        assert_eq!(config.zones, ["cli.local".parse::<Name>().unwrap()]);
    }

    #[test]
    fn defaults_apply() {
        let config = merge(
            run_args(&["--keyname", "k", "--keyvalue", "v", "--zones", "dev.local"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(config.bind, default_bind());
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn missing_settings_are_errors() {
        let merge_args = |argv: &[&str]| merge(run_args(argv), FileConfig::default());
        assert!(merge_args(&["--keyvalue", "v", "--zones", "a.local"]).is_err());
        assert!(merge_args(&["--keyname", "k", "--zones", "a.local"]).is_err());
        assert!(merge_args(&["--keyname", "k", "--keyvalue", "v"]).is_err());
        assert!(merge_args(&["--keyname", "", "--keyvalue", "v", "--zones", "a.local"]).is_err());
    }

    #[test]
    fn unknown_and_invalid_file_settings_are_rejected() {
        assert!(toml::from_str::<FileConfig>("frobnicate = true").is_err());
        assert!(toml::from_str::<FileConfig>(r#"zones = ["a/b"]"#).is_err());
    }

    #[test]
    fn relative_data_dir_is_resolved_against_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("midaas.toml");
        fs::write(&path, "data_dir = \"zones\"\n").unwrap();
        let file_config = load_file(&path).unwrap();
        assert_eq!(file_config.data_dir, Some(dir.path().join("zones")));
    }
}
