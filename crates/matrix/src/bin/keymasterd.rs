// SPDX-License-Identifier: Apache-2.0

//! The Keymaster host process: reads a YAML configuration document
//! (spec.md §6) and serves it as a Keymaster, binding the control and
//! publish sockets named under `Keymaster.URLS` /
//! `KeymasterServer.PUBURLS` and writing back whatever ephemeral
//! addresses got assigned.
//!
//! This is the minimal "host process" of spec.md §2 — it does not play
//! the `Architect` orchestrator role of driving components through their
//! lifecycle; components connect to it as any other Keymaster client
//! would.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use matrix_keymaster::KeymasterServer;
use matrix_keystore::Node;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "keymasterd", about = "Serve a YAML document as a Matrix Keymaster")]
struct Args {
    /// Path to the YAML configuration document to load at start-up.
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let text = match fs::read_to_string(&args.config) {
        Ok(text) => text,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "failed to read configuration file");
            std::process::exit(1);
        }
    };

    let document: Node = match serde_yaml::from_str(&text) {
        Ok(document) => document,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "failed to parse configuration as YAML");
            std::process::exit(1);
        }
    };

    let server = match KeymasterServer::start(document) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to start keymaster server");
            std::process::exit(1);
        }
    };

    info!(
        control = ?server.control_urns(),
        publish = ?server.publish_urns(),
        "keymasterd ready"
    );

    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
