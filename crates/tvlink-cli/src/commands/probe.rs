//! Probe command implementation.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use tvlink_core::connection::probe;

use super::ProbeArgs;

/// Run the probe command.
pub async fn run(args: ProbeArgs, config: Option<PathBuf>) -> Result<()> {
    let address = super::parse_address(&args.address)?;
    let remote = super::load_store(config)?.read(|c| c.remote.clone());
    let limit = args
        .timeout
        .map_or(remote.probe_timeout, Duration::from_secs);

    println!();
    println!("  Probing {} (timeout {:?})", address, limit);
    println!("{}", "─".repeat(40));

    let mut remote_open = false;
    for (label, port) in [("remote", remote.port), ("pairing", remote.pairing_port)] {
        let started = Instant::now();
        let open = probe(address, port, limit).await;
        println!(
            "  {:8} {:5}  {:6}  {:?}",
            label,
            port,
            if open { "open" } else { "closed" },
            started.elapsed()
        );
        if port == remote.port {
            remote_open = open;
        }
    }
    println!("{}", "─".repeat(40));
    println!();

    if !remote_open {
        bail!(tvlink_core::Error::PortUnreachable {
            address,
            port: remote.port,
        });
    }
    Ok(())
}
