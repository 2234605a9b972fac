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

//! Implements the `run` command (i.e., running the server).

use std::fmt::Write;
use std::net::SocketAddr;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use midaas::catalog::Catalog;
use midaas::name::Name;
use midaas::service::Service;
use midaas::store::Store;

use crate::args::RunArgs;
use crate::config;

/// Runs the server.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("info"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(args: RunArgs) -> Result<()> {
    info!(
        "midaas daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    let config = config::load(args).context("failed to load the configuration")?;

    let store = Store::open(&config.data_dir).context("failed to open the zone store")?;
    let catalog = make_catalog(config.zones);
    let mut zones: Vec<_> = catalog.zones().map(Name::as_str).collect();
    zones.sort_unstable();
    let count = if zones.len() == 1 {
        "1 zone".to_owned()
    } else {
        format!("{} zones", zones.len())
    };
    info!(
        "Serving {} from {}: {}.",
        count,
        store.dir().display(),
        zones.join(", "),
    );
    let service = Arc::new(Service::new(&config.credentials, catalog, store));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the Tokio runtime")?;
    runtime.block_on(serve(config.bind, service))
}

/// Builds the catalog of served zones, warning about duplicates.
fn make_catalog(zones: Vec<Name>) -> Catalog {
    let mut catalog = Catalog::new();
    for zone in zones {
        if !catalog.insert(zone.clone()) {
            warn!("The zone {} is configured more than once.", zone);
        }
    }
    catalog
}

/// Binds `bind` and serves HTTP requests until a termination signal
/// arrives. In-flight requests are allowed to finish.
async fn serve(bind: SocketAddr, service: Arc<Service>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    let shutdown = set_up_signal_handling().context("failed to set up signal handling")?;

    info!("Set-up is complete; listening on {}.", bind);
    let app = midaas::api::router(service).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            // An error means the signal thread is gone; shut down then
            // too.
            let _ = shutdown.await;
        })
        .await
        .context("the HTTP server failed")?;

    info!("Shutdown complete.");
    Ok(())
}

/// Starts a thread that waits for SIGINT or SIGTERM. The returned
/// receiver completes when one arrives.
fn set_up_signal_handling() -> Result<oneshot::Receiver<()>> {
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    let mut signals = Signals::new(term_signals)?;
    let (sender, receiver) = oneshot::channel();
    thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                let name = match signal {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => unreachable!(),
                };
                info!("Received {}; shutting down.", name);
                let _ = sender.send(());
            }
        })?;
    Ok(receiver)
}
